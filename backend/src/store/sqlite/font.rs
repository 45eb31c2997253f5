use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::Font;
use crate::store::traits::FontStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteFontStore {
    pool: SqlitePool,
}

impl SqliteFontStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FontStore for SqliteFontStore {
    async fn get(&self, id: i64) -> Result<Option<Font>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM fonts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Font>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data FROM fonts").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .collect()
    }

    async fn upsert(&self, font: &Font) -> Result<Font> {
        let data = serde_json::to_string(font).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO fonts (id, data) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(font.id)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(font.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM fonts WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
