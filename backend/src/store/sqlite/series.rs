use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::{Series, SeriesInfo};
use crate::store::traits::SeriesStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteSeriesStore {
    pool: SqlitePool,
}

impl SqliteSeriesStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn deserialize(row: Row) -> Result<Series> {
        serde_json::from_str(&row.data).map_err(|e| TcmError::Other(e.into()))
    }
}

#[async_trait]
impl SeriesStore for SqliteSeriesStore {
    async fn get(&self, id: i64) -> Result<Option<Series>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM series WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::deserialize).transpose()
    }

    async fn find_matching(&self, info: &SeriesInfo) -> Result<Option<Series>> {
        for series in self.list_active().await? {
            if series.info.identifies_same_series(info) {
                return Ok(Some(series));
            }
        }
        Ok(None)
    }

    async fn list_active(&self) -> Result<Vec<Series>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data FROM series WHERE deleted = 0")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::deserialize).collect()
    }

    async fn upsert(&self, series: &Series) -> Result<Series> {
        let data = serde_json::to_string(series).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO series (id, data, deleted) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, deleted = excluded.deleted",
        )
        .bind(series.id)
        .bind(&data)
        .bind(series.deleted as i64)
        .execute(&self.pool)
        .await?;
        Ok(series.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE series SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
