//! SQLite reference implementation of the `store::traits` contracts.
//!
//! Schema and migrations are outside this crate's scope (SPEC_FULL
//! §A.4) — there is no externally assumed DDL to match, so this store
//! bootstraps its own tables at connect time and keeps each entity as a
//! JSON blob plus the handful of columns its queries actually filter
//! or sort on. Swapping this for a real production store means
//! reimplementing the traits in `store::traits`, not touching callers.

mod card;
mod connection;
mod episode;
mod font;
mod jobs;
mod series;
mod snapshot;
mod template;
mod translation_backoff;
mod upload_record;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::security::CredentialCipher;

pub use card::SqliteCardStore;
pub use connection::SqliteConnectionStore;
pub use episode::SqliteEpisodeStore;
pub use font::SqliteFontStore;
pub use jobs::SqliteJobRunStore;
pub use series::SqliteSeriesStore;
pub use snapshot::SqliteSnapshotStore;
pub use template::SqliteTemplateStore;
pub use translation_backoff::SqliteTranslationBackoffStore;
pub use upload_record::SqliteUploadRecordStore;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    credential_cipher: CredentialCipher,
}

impl Store {
    pub async fn connect(url: &str, credential_cipher: CredentialCipher) -> Result<Self> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(url).await?;
        let store = Self { pool, credential_cipher };
        store.bootstrap_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bootstrap_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS series (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS episodes (
                id INTEGER PRIMARY KEY,
                series_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS episodes_series_id ON episodes(series_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cards (
                episode_id INTEGER NOT NULL,
                library TEXT NOT NULL,
                data TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                PRIMARY KEY (episode_id, library)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS connections (
                interface_id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                data TEXT NOT NULL,
                credential_ciphertext TEXT NOT NULL,
                credential_nonce TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS fonts (
                id INTEGER PRIMARY KEY,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS job_runs (
                job_name TEXT PRIMARY KEY,
                started_at TEXT,
                ended_at TEXT,
                outcome TEXT,
                next_fire_at TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                taken_at TEXT PRIMARY KEY,
                data TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS translation_backoffs (
                episode_id INTEGER NOT NULL,
                language_code TEXT NOT NULL,
                until TEXT NOT NULL,
                PRIMARY KEY (episode_id, language_code)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS upload_records (
                interface_id INTEGER NOT NULL,
                library TEXT NOT NULL,
                series_id INTEGER NOT NULL,
                episode_id INTEGER NOT NULL,
                season_number INTEGER NOT NULL,
                artifact_kind TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                fingerprint TEXT,
                uploaded_at TEXT NOT NULL,
                PRIMARY KEY (interface_id, library, series_id, episode_id, season_number, artifact_kind)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn series(&self) -> SqliteSeriesStore {
        SqliteSeriesStore::new(self.pool.clone())
    }

    pub fn episodes(&self) -> SqliteEpisodeStore {
        SqliteEpisodeStore::new(self.pool.clone())
    }

    pub fn cards(&self) -> SqliteCardStore {
        SqliteCardStore::new(self.pool.clone())
    }

    pub fn connections(&self) -> SqliteConnectionStore {
        SqliteConnectionStore::new(self.pool.clone(), self.credential_cipher.clone())
    }

    pub fn templates(&self) -> SqliteTemplateStore {
        SqliteTemplateStore::new(self.pool.clone())
    }

    pub fn fonts(&self) -> SqliteFontStore {
        SqliteFontStore::new(self.pool.clone())
    }

    pub fn job_runs(&self) -> SqliteJobRunStore {
        SqliteJobRunStore::new(self.pool.clone())
    }

    pub fn snapshots(&self) -> SqliteSnapshotStore {
        SqliteSnapshotStore::new(self.pool.clone())
    }

    pub fn translation_backoffs(&self) -> SqliteTranslationBackoffStore {
        SqliteTranslationBackoffStore::new(self.pool.clone())
    }

    pub fn upload_records(&self) -> SqliteUploadRecordStore {
        SqliteUploadRecordStore::new(self.pool.clone())
    }
}
