use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::{Episode, EpisodeInfo, SeriesInfo};
use crate::store::traits::EpisodeStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteEpisodeStore {
    pool: SqlitePool,
}

impl SqliteEpisodeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn deserialize(row: Row) -> Result<Episode> {
        serde_json::from_str(&row.data).map_err(|e| TcmError::Other(e.into()))
    }
}

#[async_trait]
impl EpisodeStore for SqliteEpisodeStore {
    async fn get(&self, id: i64) -> Result<Option<Episode>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM episodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::deserialize).transpose()
    }

    async fn find_matching(&self, series_id: i64, info: &EpisodeInfo, match_titles: bool) -> Result<Option<Episode>> {
        let mut series_info = SeriesInfo::new("", 0);
        series_info.match_titles = match_titles;

        for episode in self.list_for_series(series_id).await? {
            if episode.info.identifies_same_episode(info, &series_info) {
                return Ok(Some(episode));
            }
        }
        Ok(None)
    }

    async fn list_for_series(&self, series_id: i64) -> Result<Vec<Episode>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data FROM episodes WHERE series_id = ? AND deleted = 0")
            .bind(series_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::deserialize).collect()
    }

    async fn upsert(&self, episode: &Episode) -> Result<Episode> {
        let data = serde_json::to_string(episode).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO episodes (id, series_id, data, deleted) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET series_id = excluded.series_id, data = excluded.data, deleted = excluded.deleted",
        )
        .bind(episode.id)
        .bind(episode.series_id)
        .bind(&data)
        .bind(episode.deleted as i64)
        .execute(&self.pool)
        .await?;
        Ok(episode.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE episodes SET deleted = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
