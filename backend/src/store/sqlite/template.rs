use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::model::Template;
use crate::store::traits::TemplateStore;

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteTemplateStore {
    pool: SqlitePool,
}

impl SqliteTemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TemplateStore for SqliteTemplateStore {
    async fn get(&self, id: i64) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM templates WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<Template>> {
        let rows = sqlx::query_as::<_, Row>("SELECT data FROM templates").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into())))
            .collect()
    }

    async fn upsert(&self, template: &Template) -> Result<Template> {
        let data = serde_json::to_string(template).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query(
            "INSERT INTO templates (id, data) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        )
        .bind(template.id)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(template.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM templates WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
