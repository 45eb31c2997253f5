//! Upload-acceptance bookkeeping (§4.7): what the Uploader last pushed
//! for one `(interface_id, library, series[, episode|season])` key, so
//! the next firing only re-sends what actually changed.
//!
//! SQLite's `UNIQUE` treats two `NULL`s as distinct, which would defeat
//! `ON CONFLICT` upserts for poster/backdrop records (no `episode_id`)
//! and title-card records (no `season_number`). Both absent fields are
//! stored as the sentinel `-1` instead, kept private to this module —
//! the public `UploadRecord`/`UploadRecordStore` contract still speaks
//! in `Option<i64>`/`Option<i32>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::store::traits::{UploadArtifactKind, UploadRecord, UploadRecordStore};

const ABSENT: i64 = -1;

fn kind_to_str(kind: UploadArtifactKind) -> &'static str {
    match kind {
        UploadArtifactKind::TitleCard => "title_card",
        UploadArtifactKind::SeriesPoster => "series_poster",
        UploadArtifactKind::SeriesBackground => "series_background",
        UploadArtifactKind::SeasonPoster => "season_poster",
    }
}

fn kind_from_str(s: &str) -> Option<UploadArtifactKind> {
    match s {
        "title_card" => Some(UploadArtifactKind::TitleCard),
        "series_poster" => Some(UploadArtifactKind::SeriesPoster),
        "series_background" => Some(UploadArtifactKind::SeriesBackground),
        "season_poster" => Some(UploadArtifactKind::SeasonPoster),
        _ => None,
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    interface_id: i64,
    library: String,
    series_id: i64,
    episode_id: i64,
    season_number: i64,
    artifact_kind: String,
    file_size: i64,
    fingerprint: Option<String>,
    uploaded_at: String,
}

#[derive(Clone)]
pub struct SqliteUploadRecordStore {
    pool: SqlitePool,
}

impl SqliteUploadRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn decode(row: Row) -> Result<UploadRecord> {
        Ok(UploadRecord {
            interface_id: row.interface_id,
            library: row.library,
            series_id: row.series_id,
            episode_id: (row.episode_id != ABSENT).then_some(row.episode_id),
            season_number: (row.season_number != ABSENT).then_some(row.season_number as i32),
            artifact_kind: kind_from_str(&row.artifact_kind)
                .ok_or_else(|| TcmError::Other(anyhow::anyhow!("unknown artifact_kind {}", row.artifact_kind)))?,
            file_size: row.file_size as u64,
            fingerprint: row.fingerprint,
            uploaded_at: DateTime::parse_from_rfc3339(&row.uploaded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| TcmError::Other(e.into()))?,
        })
    }
}

#[async_trait]
impl UploadRecordStore for SqliteUploadRecordStore {
    async fn get(
        &self,
        interface_id: i64,
        library: &str,
        series_id: i64,
        episode_id: Option<i64>,
        season_number: Option<i32>,
        artifact_kind: UploadArtifactKind,
    ) -> Result<Option<UploadRecord>> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT interface_id, library, series_id, episode_id, season_number, artifact_kind, file_size, fingerprint, uploaded_at
             FROM upload_records
             WHERE interface_id = ? AND library = ? AND series_id = ?
               AND episode_id = ? AND season_number = ? AND artifact_kind = ?",
        )
        .bind(interface_id)
        .bind(library)
        .bind(series_id)
        .bind(episode_id.unwrap_or(ABSENT))
        .bind(season_number.map(|n| n as i64).unwrap_or(ABSENT))
        .bind(kind_to_str(artifact_kind))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::decode).transpose()
    }

    async fn record(&self, record: &UploadRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO upload_records
                (interface_id, library, series_id, episode_id, season_number, artifact_kind, file_size, fingerprint, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(interface_id, library, series_id, episode_id, season_number, artifact_kind) DO UPDATE SET
                file_size = excluded.file_size,
                fingerprint = excluded.fingerprint,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(record.interface_id)
        .bind(&record.library)
        .bind(record.series_id)
        .bind(record.episode_id.unwrap_or(ABSENT))
        .bind(record.season_number.map(|n| n as i64).unwrap_or(ABSENT))
        .bind(kind_to_str(record.artifact_kind))
        .bind(record.file_size as i64)
        .bind(&record.fingerprint)
        .bind(record.uploaded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count(&self, artifact_kind: UploadArtifactKind) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM upload_records WHERE artifact_kind = ?")
            .bind(kind_to_str(artifact_kind))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteUploadRecordStore {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE upload_records (
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
        .execute(&pool)
        .await
        .unwrap();
        SqliteUploadRecordStore::new(pool)
    }

    fn record(file_size: u64) -> UploadRecord {
        UploadRecord {
            interface_id: 1,
            library: "Shows".into(),
            series_id: 1,
            episode_id: Some(10),
            season_number: None,
            artifact_kind: UploadArtifactKind::TitleCard,
            file_size,
            fingerprint: Some("v1:abc".into()),
            uploaded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn round_trips_a_title_card_record() {
        let store = store().await;
        store.record(&record(1000)).await.unwrap();
        let found = store.get(1, "Shows", 1, Some(10), None, UploadArtifactKind::TitleCard).await.unwrap().unwrap();
        assert_eq!(found.file_size, 1000);
    }

    #[tokio::test]
    async fn re_recording_the_same_key_updates_in_place() {
        let store = store().await;
        store.record(&record(1000)).await.unwrap();
        store.record(&record(2000)).await.unwrap();
        let found = store.get(1, "Shows", 1, Some(10), None, UploadArtifactKind::TitleCard).await.unwrap().unwrap();
        assert_eq!(found.file_size, 2000);
    }

    #[tokio::test]
    async fn poster_record_has_no_episode_id() {
        let store = store().await;
        let mut poster = record(500);
        poster.episode_id = None;
        poster.season_number = None;
        poster.artifact_kind = UploadArtifactKind::SeriesPoster;
        store.record(&poster).await.unwrap();
        let found = store.get(1, "Shows", 1, None, None, UploadArtifactKind::SeriesPoster).await.unwrap().unwrap();
        assert_eq!(found.episode_id, None);
    }

    #[tokio::test]
    async fn count_reflects_only_the_requested_kind() {
        let store = store().await;
        store.record(&record(1000)).await.unwrap();
        let mut poster = record(500);
        poster.artifact_kind = UploadArtifactKind::SeriesPoster;
        store.record(&poster).await.unwrap();

        assert_eq!(store.count(UploadArtifactKind::TitleCard).await.unwrap(), 1);
        assert_eq!(store.count(UploadArtifactKind::SeriesPoster).await.unwrap(), 1);
        assert_eq!(store.count(UploadArtifactKind::SeasonPoster).await.unwrap(), 0);
    }
}
