//! The ten default jobs (§4.8).
//!
//! Every handler follows the same shape: outer loop over Series (or
//! Connections), inner loop over Episodes, checking `cancel` between
//! each (§5 suspension points), and swallowing retryable connector
//! errors itself so only a terminal failure reaches the Scheduler
//! (§7 propagation policy).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cardtype::RenderBackend;
use crate::context::AppContext;
use crate::error::Result;
use crate::model::{Episode, Series};
use crate::scheduler::JobHandler;

macro_rules! checkpoint {
    ($cancel:expr) => {
        if $cancel.is_cancelled() {
            return Ok(());
        }
    };
}

pub struct SyncJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for SyncJob {
    fn name(&self) -> &'static str {
        "sync"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let connections = self.ctx.connections.list().await?;
        for connection in connections.into_iter().filter(|c| c.enabled && c.kind.is_sync_source()) {
            checkpoint!(cancel);
            let Some(source) = self.ctx.connectors.sync_sources.get(connection.interface_id) else {
                continue;
            };

            let results = match source.sync_series(&connection.sync_filter).await {
                Ok(results) => results,
                Err(err) if err.is_retryable() => {
                    warn!(interface_id = connection.interface_id, error = %err, "sync_series failed transiently, skipping this connection this firing");
                    continue;
                }
                Err(err) => return Err(err),
            };

            for result in results {
                checkpoint!(cancel);
                match self.ctx.series.find_matching(&result.info).await? {
                    Some(mut existing) => {
                        existing.info.merge_ids(&result.info)?;
                        self.ctx.series.upsert(&existing).await?;
                    }
                    None => {
                        self.ctx.series.upsert(&Series::new(0, result.info)).await?;
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct RefreshEpisodesJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for RefreshEpisodesJob {
    fn name(&self) -> &'static str {
        "refresh_episodes"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for binding in &series.libraries {
                checkpoint!(cancel);
                let Some(source) = self.ctx.connectors.episode_sources.get(binding.interface_id) else {
                    continue;
                };

                let remote_episodes = match source.get_all_episodes(&binding.library_name, &series.info).await {
                    Ok(episodes) => episodes,
                    Err(err) if err.is_retryable() => {
                        warn!(series_id = series.id, interface_id = binding.interface_id, error = %err, "get_all_episodes failed transiently");
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                let mut existing = self.ctx.episodes.list_for_series(series.id).await?;

                for (info, watched_status) in &remote_episodes {
                    checkpoint!(cancel);
                    let matching = self.ctx.episodes.find_matching(series.id, info, series.info.match_titles).await?;
                    let mut episode = matching.unwrap_or_else(|| Episode::new(0, series.id, info.clone()));
                    episode.info.merge_ids(info)?;
                    episode.watched.insert(binding.library_name.clone(), *watched_status);
                    episode.mark_seen();
                    self.ctx.episodes.upsert(&episode).await?;
                }

                existing.retain(|e| !remote_episodes.iter().any(|(info, _)| e.info.identifies_same_episode(info, &series.info)));
                for mut missing in existing {
                    missing.mark_missing();
                    self.ctx.episodes.upsert(&missing).await?;
                }
            }
        }
        Ok(())
    }
}

pub struct SetIdsJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for SetIdsJob {
    fn name(&self) -> &'static str {
        "set_ids"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for mut series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for binding in series.libraries.clone() {
                checkpoint!(cancel);
                let Some(source) = self.ctx.connectors.episode_sources.get(binding.interface_id) else {
                    continue;
                };
                if let Err(err) = source.set_series_ids(&binding.library_name, &mut series.info).await {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(series_id = series.id, interface_id = binding.interface_id, error = %err, "set_series_ids failed transiently");
                }
            }
            self.ctx.series.upsert(&series).await?;

            let mut episodes = self.ctx.episodes.list_for_series(series.id).await?;
            for binding in &series.libraries {
                checkpoint!(cancel);
                let Some(source) = self.ctx.connectors.episode_sources.get(binding.interface_id) else {
                    continue;
                };
                let mut infos: Vec<_> = episodes.iter().map(|e| e.info.clone()).collect();
                if let Err(err) = source.set_episode_ids(&binding.library_name, &series.info, &mut infos).await {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(series_id = series.id, interface_id = binding.interface_id, error = %err, "set_episode_ids failed transiently");
                    continue;
                }
                for (episode, info) in episodes.iter_mut().zip(infos) {
                    episode.info.merge_ids(&info)?;
                }
            }
            for episode in &episodes {
                self.ctx.episodes.upsert(episode).await?;
            }
        }
        Ok(())
    }
}

pub struct TranslateJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for TranslateJob {
    fn name(&self) -> &'static str {
        "translate"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let Some(image_source) = self.ctx.connectors.image_sources.all().into_iter().next() else {
            return Ok(());
        };

        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for mut episode in self.ctx.episodes.list_for_series(series.id).await? {
                checkpoint!(cancel);
                let recipe = self.ctx.resolver.resolve_recipe(&series, &episode, false).await?;
                if recipe.translations.as_ref().map(|t| t.is_empty()).unwrap_or(true) {
                    continue;
                }

                let resolved = self.ctx.resolver.resolve_translations(&recipe, &episode, &series, image_source.as_ref()).await?;
                if resolved.is_empty() {
                    continue;
                }

                for (data_key, value) in resolved {
                    episode.overrides.extras.insert(data_key, serde_json::Value::String(value));
                }
                self.ctx.episodes.upsert(&episode).await?;
            }
        }
        Ok(())
    }
}

pub struct FetchSourcesJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for FetchSourcesJob {
    fn name(&self) -> &'static str {
        "fetch_sources"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for mut episode in self.ctx.episodes.list_for_series(series.id).await? {
                checkpoint!(cancel);
                if episode.source_image.is_some() {
                    continue;
                }

                let Some(bytes) = self.fetch_for_episode(&series, &episode).await? else {
                    continue;
                };

                let path = crate::assets::source_image::episode_source_path(&self.ctx.config.source_directory, &series, &episode, "jpg");
                crate::assets::source_image::write_idempotent(&path, &bytes).await?;
                episode.source_image = Some(path.display().to_string());
                self.ctx.episodes.upsert(&episode).await?;
            }
        }
        Ok(())
    }
}

impl FetchSourcesJob {
    async fn fetch_for_episode(&self, series: &Series, episode: &Episode) -> Result<Option<Vec<u8>>> {
        for binding in &series.libraries {
            if let Some(media_server) = self.ctx.connectors.media_servers.get(binding.interface_id) {
                match media_server.get_source_image(&binding.library_name, &series.info, &episode.info).await {
                    Ok(Some(bytes)) => return Ok(Some(bytes)),
                    Ok(None) => continue,
                    Err(err) if err.is_retryable() => continue,
                    Err(err) => return Err(err),
                }
            }
        }

        for image_source in self.ctx.connectors.image_sources.all() {
            match image_source.get_source_image(&series.info, &episode.info).await {
                Ok(Some(bytes)) => return Ok(Some(bytes)),
                Ok(None) => continue,
                Err(err) if err.is_retryable() => continue,
                Err(err) => return Err(err),
            }
        }

        Ok(None)
    }
}

/// Resolves recipes and ensures every Episode has an up-to-date Card.
/// `backend` is the injected pixel-composition kernel (§1 Non-goal) —
/// not part of `AppContext`, supplied by whatever embeds this crate.
pub struct BuildCardsJob {
    pub ctx: Arc<AppContext>,
    pub backend: Arc<dyn RenderBackend>,
}

#[async_trait]
impl JobHandler for BuildCardsJob {
    fn name(&self) -> &'static str {
        "build_cards"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            let mut episodes = self.ctx.episodes.list_for_series(series.id).await?;
            episodes.sort_by_key(|e| e.sort_key());

            for episode in episodes {
                checkpoint!(cancel);
                for binding in &series.libraries {
                    checkpoint!(cancel);
                    let watched = episode.watched.get(&binding.library_name).map(|s| s.as_bool()).unwrap_or(false);
                    let recipe = self.ctx.resolver.resolve_recipe(&series, &episode, watched).await?;
                    let card_type_id = recipe.card_type.clone().unwrap_or_else(|| self.ctx.config.default_card_type.clone());
                    let recipe = self.ctx.card_types.validate(&card_type_id, &recipe).await?;
                    let card_type = self.ctx.card_types.get(&card_type_id).await?.expect("validated above");
                    let font = self.ctx.resolver.resolve_effective_font(&recipe).await?;

                    let source_bytes = match &episode.source_image {
                        Some(path) => tokio::fs::read(path).await.ok(),
                        None => None,
                    };

                    let fingerprint = crate::render::fingerprint(&recipe, watched, source_bytes.as_deref(), None);
                    let file_name = crate::assets::sanitize::sanitize_name(&format!(
                        "{} - S{:02}E{:02}{}",
                        series.info.full_name(),
                        episode.info.season_number,
                        episode.info.episode_number,
                        self.ctx.config.card_extension
                    ));
                    let file_path = self.ctx.config.card_directory.join(&binding.library_name).join(file_name);

                    let backend = self.backend.clone();
                    let card_type = card_type.clone();
                    let recipe_for_render = recipe.clone();
                    let font_for_render = font.clone();
                    self.ctx
                        .render
                        .ensure_built(episode.id, &binding.library_name, &recipe, fingerprint, &file_path, move || {
                            card_type.render(&recipe_for_render, &font_for_render, source_bytes, None, watched, backend.as_ref())
                        })
                        .await?;
                }
            }
        }
        Ok(())
    }
}

pub struct LoadCardsJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for LoadCardsJob {
    fn name(&self) -> &'static str {
        "load_cards"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for binding in &series.libraries {
                checkpoint!(cancel);
                let Some(media_server) = self.ctx.connectors.media_servers.get(binding.interface_id) else {
                    continue;
                };
                let Some(connection) = self.ctx.connections.get(binding.interface_id).await? else {
                    continue;
                };

                let mut episodes = self.ctx.episodes.list_for_series(series.id).await?;
                episodes.sort_by_key(|e| e.sort_key());

                let mut batch = Vec::new();
                for episode in &episodes {
                    if let Some(card) = self.ctx.cards.get_active(episode.id, &binding.library_name).await? {
                        batch.push((episode.info.clone(), card));
                    }
                }
                if batch.is_empty() {
                    continue;
                }

                let results = self.ctx.uploader.upload_title_cards(media_server.as_ref(), &connection, series.id, &binding.library_name, &series.info, &batch).await;
                for (episode_id, outcome) in results {
                    if let Err(err) = outcome {
                        if !err.is_retryable() {
                            return Err(err);
                        }
                        warn!(series_id = series.id, episode_id, error = %err, "title card upload failed transiently");
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct WatchedSyncJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for WatchedSyncJob {
    fn name(&self) -> &'static str {
        "watched_sync"
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        for series in self.ctx.series.list_active().await? {
            checkpoint!(cancel);
            for binding in &series.libraries {
                checkpoint!(cancel);
                let Some(media_server) = self.ctx.connectors.media_servers.get(binding.interface_id) else {
                    continue;
                };

                let mut episodes = self.ctx.episodes.list_for_series(series.id).await?;
                let infos: Vec<_> = episodes.iter().map(|e| e.info.clone()).collect();

                let statuses = match self.ctx.uploader.fetch_watched_statuses(media_server.as_ref(), &binding.library_name, &series.info, &infos).await {
                    Ok(statuses) => statuses,
                    Err(err) if err.is_retryable() => {
                        warn!(series_id = series.id, interface_id = binding.interface_id, error = %err, "watched status fetch failed transiently");
                        continue;
                    }
                    Err(err) => return Err(err),
                };

                for (info, status) in statuses {
                    checkpoint!(cancel);
                    let Some(episode) = episodes.iter_mut().find(|e| e.info.identifies_same_episode(&info, &series.info)) else {
                        continue;
                    };
                    let previous = episode.watched.get(&binding.library_name).copied();
                    if previous == Some(status) {
                        continue;
                    }
                    episode.watched.insert(binding.library_name.clone(), status);
                    self.ctx.episodes.upsert(episode).await?;
                    self.ctx.render.invalidate(episode.id).await?;
                }
            }
        }
        Ok(())
    }
}

pub struct SnapshotJob {
    pub ctx: Arc<AppContext>,
}

#[async_trait]
impl JobHandler for SnapshotJob {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    async fn run(&self, _cancel: CancellationToken) -> Result<()> {
        crate::snapshot::take(&self.ctx).await
    }
}

/// Directory-name timestamp format for a backup snapshot (§6):
/// `config/backups/YYYY-MM-DD_HH-MM-SS/{config.*,db.*}`.
const BACKUP_STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub struct BackupJob {
    pub ctx: Arc<AppContext>,
    pub database_path: std::path::PathBuf,
    /// No user-facing config *file* exists in this core (§1), so this is
    /// always `None` for now; kept optional so a future config-file
    /// surface can populate it without changing the backup layout.
    pub config_path: Option<std::path::PathBuf>,
}

#[async_trait]
impl JobHandler for BackupJob {
    fn name(&self) -> &'static str {
        "backup"
    }

    async fn run(&self, _cancel: CancellationToken) -> Result<()> {
        use crate::error::TcmError;

        let backups_root = &self.ctx.config.backup_directory;
        tokio::fs::create_dir_all(backups_root)
            .await
            .map_err(|e| TcmError::transient(format!("creating {}: {e}", backups_root.display())))?;

        let stamp = chrono::Utc::now().format(BACKUP_STAMP_FORMAT).to_string();
        let snapshot_dir = backups_root.join(&stamp);
        tokio::fs::create_dir_all(&snapshot_dir)
            .await
            .map_err(|e| TcmError::transient(format!("creating {}: {e}", snapshot_dir.display())))?;

        let db_extension = self.database_path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_else(|| "db".to_string());
        let db_destination = snapshot_dir.join(format!("db.{db_extension}"));
        tokio::fs::copy(&self.database_path, &db_destination)
            .await
            .map_err(|e| TcmError::transient(format!("copying {} to {}: {e}", self.database_path.display(), db_destination.display())))?;

        if let Some(config_path) = &self.config_path {
            let config_extension = config_path.extension().map(|e| e.to_string_lossy().to_string()).unwrap_or_else(|| "cfg".to_string());
            let config_destination = snapshot_dir.join(format!("config.{config_extension}"));
            tokio::fs::copy(config_path, &config_destination)
                .await
                .map_err(|e| TcmError::transient(format!("copying {} to {}: {e}", config_path.display(), config_destination.display())))?;
        }

        self.prune(backups_root).await
    }
}

impl BackupJob {
    /// Sort surviving snapshot directories by the timestamp embedded in
    /// their own name — not filesystem mtime, which a restore or a copy
    /// onto different storage can reorder — and drop everything older
    /// than `backup_retention_days` (SPEC_FULL §B).
    async fn prune(&self, backups_root: &std::path::Path) -> Result<()> {
        use crate::error::TcmError;

        let retention = chrono::Duration::days(self.ctx.config.backup_retention_days as i64);
        let cutoff = chrono::Utc::now() - retention;

        let mut entries = tokio::fs::read_dir(backups_root)
            .await
            .map_err(|e| TcmError::transient(format!("reading {}: {e}", backups_root.display())))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| TcmError::transient(e.to_string()))? {
            let Ok(file_type) = entry.file_type().await else { continue };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(naive) = chrono::NaiveDateTime::parse_from_str(&name, BACKUP_STAMP_FORMAT) else {
                continue;
            };
            let timestamp = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc);
            if timestamp < cutoff {
                let _ = tokio::fs::remove_dir_all(entry.path()).await;
            }
        }

        Ok(())
    }
}
