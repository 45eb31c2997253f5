use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::store::traits::TranslationBackoffStore;

#[derive(sqlx::FromRow)]
struct Row {
    until: String,
}

#[derive(Clone)]
pub struct SqliteTranslationBackoffStore {
    pool: SqlitePool,
}

impl SqliteTranslationBackoffStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranslationBackoffStore for SqliteTranslationBackoffStore {
    async fn is_backed_off(&self, episode_id: i64, language_code: &str) -> Result<bool> {
        let row = sqlx::query_as::<_, Row>(
            "SELECT until FROM translation_backoffs WHERE episode_id = ? AND language_code = ?",
        )
        .bind(episode_id)
        .bind(language_code)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(false) };
        let until: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.until)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| TcmError::Other(e.into()))?;
        Ok(until > Utc::now())
    }

    async fn record_rejection(&self, episode_id: i64, language_code: &str, until: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO translation_backoffs (episode_id, language_code, until) VALUES (?, ?, ?)
             ON CONFLICT(episode_id, language_code) DO UPDATE SET until = excluded.until",
        )
        .bind(episode_id)
        .bind(language_code)
        .bind(until.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
