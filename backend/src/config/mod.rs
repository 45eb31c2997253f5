//! Global configuration — the layer-1 defaults of §4.3's resolution
//! order. Grounded on `app/models/preferences.py::Preferences` and the
//! teacher's `config/mod.rs::Config::from_env`; unlike the teacher,
//! loading a user-facing config *file* is explicitly out of scope
//! (§1), so `from_env` only exists to bootstrap `main.rs` for local
//! runs — the core itself just holds an already-resolved `Config`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::assets::source_image::PriorityEntry;
use crate::model::{ConnectionKind, Recipe};

#[derive(Debug, Clone)]
pub struct Config {
    pub asset_directory: PathBuf,
    pub card_directory: PathBuf,
    pub source_directory: PathBuf,

    pub card_filename_format: String,
    pub card_extension: String,

    pub default_watched_style: String,
    pub default_unwatched_style: String,
    pub default_card_type: String,

    pub episode_data_source: ConnectionKind,
    pub image_source_priority: Vec<(ConnectionKind, PriorityEntry)>,

    pub request_timeout: Duration,
    pub full_sync_timeout: Duration,
    pub max_retry_attempts: u32,

    pub backup_directory: PathBuf,
    pub backup_retention_days: u32,

    /// Consecutive absent syncs before an Episode soft-deletes (§3).
    pub missing_sync_threshold: u32,

    /// Layer-1 defaults of the Settings Resolver's merge order (§4.3).
    /// Process-wide rather than per-Series/Template, since a global
    /// settings-editing surface is out of scope (§1) — this is the
    /// equivalent of `Preferences`' card-default fields.
    pub global_recipe: Recipe,

    /// Window a rejected "generic" translation is skipped for before
    /// Sync retries it (§4.3).
    pub translation_backoff: Duration,

    /// SQLite file backing the reference store; also what `backup`
    /// copies verbatim each firing.
    pub database_path: PathBuf,

    pub http_host: String,
    pub http_port: u16,
}

pub const DEFAULT_CARD_FILENAME_FORMAT: &str = "{series_full_name} - S{season_number:02}E{episode_number:02}";

impl Default for Config {
    fn default() -> Self {
        Self {
            asset_directory: PathBuf::from("./assets"),
            card_directory: PathBuf::from("./cards"),
            source_directory: PathBuf::from("./source"),
            card_filename_format: DEFAULT_CARD_FILENAME_FORMAT.to_string(),
            card_extension: ".jpg".to_string(),
            default_watched_style: "unique".to_string(),
            default_unwatched_style: "unique".to_string(),
            default_card_type: "standard".to_string(),
            episode_data_source: ConnectionKind::Sonarr,
            image_source_priority: vec![
                (ConnectionKind::Tmdb, PriorityEntry { interface_id: 0 }),
                (ConnectionKind::Plex, PriorityEntry { interface_id: 0 }),
                (ConnectionKind::Emby, PriorityEntry { interface_id: 0 }),
                (ConnectionKind::Jellyfin, PriorityEntry { interface_id: 0 }),
            ],
            request_timeout: Duration::from_secs(30),
            full_sync_timeout: Duration::from_secs(240),
            max_retry_attempts: 5,
            backup_directory: PathBuf::from("./config/backups"),
            backup_retention_days: 21,
            missing_sync_threshold: crate::model::episode::MISSING_SYNC_THRESHOLD,
            global_recipe: Recipe {
                watched_style: Some("unique".to_string()),
                unwatched_style: Some("unique".to_string()),
                card_type: Some("standard".to_string()),
                ..Recipe::new()
            },
            translation_backoff: Duration::from_secs(7 * 24 * 3600),
            database_path: PathBuf::from("./tcm.db"),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

impl Config {
    /// Bootstrap convenience for `main.rs`; not part of the core's own
    /// contract (see module doc comment).
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = env::var("TCM_ASSET_DIRECTORY") {
            config.asset_directory = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("TCM_CARD_DIRECTORY") {
            config.card_directory = PathBuf::from(dir);
        }
        if let Ok(dir) = env::var("TCM_SOURCE_DIRECTORY") {
            config.source_directory = PathBuf::from(dir);
        }
        if let Ok(format) = env::var("TCM_CARD_FILENAME_FORMAT") {
            config.card_filename_format = format;
        }
        if let Ok(days) = env::var("TCM_BACKUP_RETENTION_DAYS") {
            config.backup_retention_days = days.parse().context("invalid TCM_BACKUP_RETENTION_DAYS")?;
        }
        if let Ok(path) = env::var("TCM_DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(host) = env::var("TCM_HTTP_HOST") {
            config.http_host = host;
        }
        if let Ok(port) = env::var("TCM_HTTP_PORT") {
            config.http_port = port.parse().context("invalid TCM_HTTP_PORT")?;
        }

        Ok(config)
    }
}
