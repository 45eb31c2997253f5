use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::Card;
use crate::store::traits::CardStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteCardStore {
    pool: SqlitePool,
}

impl SqliteCardStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardStore for SqliteCardStore {
    async fn get_active(&self, episode_id: i64, library: &str) -> Result<Option<Card>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM cards WHERE episode_id = ? AND library = ?")
            .bind(episode_id)
            .bind(library)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .transpose()
    }

    async fn put_active(&self, card: &Card) -> Result<()> {
        let data = serde_json::to_string(card).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO cards (episode_id, library, data, file_size) VALUES (?, ?, ?, ?)
             ON CONFLICT(episode_id, library) DO UPDATE SET data = excluded.data, file_size = excluded.file_size",
        )
        .bind(card.episode_id)
        .bind(&card.library)
        .bind(&data)
        .bind(card.file_size as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn invalidate(&self, episode_id: i64, library: &str) -> Result<()> {
        sqlx::query("DELETE FROM cards WHERE episode_id = ? AND library = ?")
            .bind(episode_id)
            .bind(library)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<Card>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data FROM cards WHERE episode_id = ?")
            .bind(episode_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .collect()
    }

    async fn count_active(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cards").fetch_one(&self.pool).await?;
        Ok(count.0)
    }

    async fn total_bytes(&self) -> Result<i64> {
        let total: (Option<i64>,) = sqlx::query_as("SELECT SUM(file_size) FROM cards").fetch_one(&self.pool).await?;
        Ok(total.0.unwrap_or(0))
    }
}
