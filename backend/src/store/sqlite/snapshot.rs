use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, TcmError};
use crate::store::traits::{SnapshotCounts, SnapshotStore};

#[derive(sqlx::FromRow)]
struct Row {
    data: String,
}

#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn record(&self, counts: &SnapshotCounts) -> Result<()> {
        let data = serde_json::to_string(&SerializedCounts::from(counts)).map_err(|e| TcmError::Other(e.into()))?;
        sqlx::query("INSERT INTO snapshots (taken_at, data) VALUES (?, ?)")
            .bind(counts.taken_at.to_rfc3339())
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<SnapshotCounts>> {
        let row = sqlx::query_as::<_, Row>("SELECT data FROM snapshots ORDER BY taken_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let serialized: SerializedCounts = serde_json::from_str(&r.data).map_err(|e| TcmError::Other(e.into()))?;
            serialized.try_into()
        })
        .transpose()
    }
}

/// On-disk shape for `SnapshotCounts` — kept separate from the trait's
/// struct so `chrono::DateTime` doesn't need its own `Serialize` impl
/// assumptions baked into the store boundary.
#[derive(serde::Serialize, serde::Deserialize)]
struct SerializedCounts {
    series_count: i64,
    episode_count: i64,
    card_count: i64,
    font_count: i64,
    template_count: i64,
    loaded_count: i64,
    user_count: i64,
    sync_count: i64,
    blueprint_count: i64,
    total_card_bytes: i64,
    taken_at: String,
}

impl From<&SnapshotCounts> for SerializedCounts {
    fn from(c: &SnapshotCounts) -> Self {
        Self {
            series_count: c.series_count,
            episode_count: c.episode_count,
            card_count: c.card_count,
            font_count: c.font_count,
            template_count: c.template_count,
            loaded_count: c.loaded_count,
            user_count: c.user_count,
            sync_count: c.sync_count,
            blueprint_count: c.blueprint_count,
            total_card_bytes: c.total_card_bytes,
            taken_at: c.taken_at.to_rfc3339(),
        }
    }
}

impl TryFrom<SerializedCounts> for SnapshotCounts {
    type Error = TcmError;

    fn try_from(s: SerializedCounts) -> std::result::Result<Self, Self::Error> {
        let taken_at = chrono::DateTime::parse_from_rfc3339(&s.taken_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| TcmError::Other(e.into()))?;
        Ok(SnapshotCounts {
            series_count: s.series_count,
            episode_count: s.episode_count,
            card_count: s.card_count,
            font_count: s.font_count,
            template_count: s.template_count,
            loaded_count: s.loaded_count,
            user_count: s.user_count,
            sync_count: s.sync_count,
            blueprint_count: s.blueprint_count,
            total_card_bytes: s.total_card_bytes,
            taken_at,
        })
    }
}
