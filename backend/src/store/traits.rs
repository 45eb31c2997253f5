//! Repository contracts the core depends on. Per SPEC_FULL §A.4 these
//! stand in for "a transactional store supporting the entity graph of
//! §3" — the schema and migrations behind any implementation are out
//! of this crate's scope. Coordination code (`resolver`, `render`,
//! `uploader`, `scheduler`, `blueprint`) depends only on these traits,
//! never on `store::sqlite` directly, so tests can substitute an
//! in-memory fake.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Card, Connection, Episode, Font, Series, Template};

#[async_trait]
pub trait SeriesStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Series>>;
    async fn find_matching(&self, info: &crate::model::SeriesInfo) -> Result<Option<Series>>;
    async fn list_active(&self) -> Result<Vec<Series>>;
    async fn upsert(&self, series: &Series) -> Result<Series>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Episode>>;
    async fn find_matching(
        &self,
        series_id: i64,
        info: &crate::model::EpisodeInfo,
        match_titles: bool,
    ) -> Result<Option<Episode>>;
    async fn list_for_series(&self, series_id: i64) -> Result<Vec<Episode>>;
    async fn upsert(&self, episode: &Episode) -> Result<Episode>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait CardStore: Send + Sync {
    async fn get_active(&self, episode_id: i64, library: &str) -> Result<Option<Card>>;
    async fn put_active(&self, card: &Card) -> Result<()>;
    async fn invalidate(&self, episode_id: i64, library: &str) -> Result<()>;
    /// Every library's active Card for one Episode — used by
    /// `render::invalidate` (§4.5), which is keyed on the Episode alone.
    async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<Card>>;
    async fn count_active(&self) -> Result<i64>;
    async fn total_bytes(&self) -> Result<i64>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn list(&self) -> Result<Vec<Connection>>;
    async fn get(&self, interface_id: i64) -> Result<Option<Connection>>;
    async fn upsert(&self, connection: &Connection) -> Result<Connection>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Template>>;
    async fn list(&self) -> Result<Vec<Template>>;
    async fn upsert(&self, template: &Template) -> Result<Template>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[async_trait]
pub trait FontStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Font>>;
    async fn list(&self) -> Result<Vec<Font>>;
    async fn upsert(&self, font: &Font) -> Result<Font>;
    async fn delete(&self, id: i64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Ok,
    Error,
    Cancelled,
    Overlap,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct JobRun {
    pub job_name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub outcome: Option<JobOutcome>,
    pub next_fire_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[async_trait]
pub trait JobRunStore: Send + Sync {
    async fn last_run(&self, job_name: &str) -> Result<Option<JobRun>>;
    async fn record_start(&self, job_name: &str, started_at: chrono::DateTime<chrono::Utc>) -> Result<()>;
    async fn record_end(
        &self,
        job_name: &str,
        started_at: chrono::DateTime<chrono::Utc>,
        ended_at: chrono::DateTime<chrono::Utc>,
        outcome: JobOutcome,
    ) -> Result<()>;
    async fn set_next_fire(&self, job_name: &str, next_fire_at: chrono::DateTime<chrono::Utc>) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SnapshotCounts {
    pub series_count: i64,
    pub episode_count: i64,
    pub card_count: i64,
    pub font_count: i64,
    pub template_count: i64,
    pub loaded_count: i64,
    pub user_count: i64,
    pub sync_count: i64,
    pub blueprint_count: i64,
    pub total_card_bytes: i64,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn record(&self, counts: &SnapshotCounts) -> Result<()>;
    async fn latest(&self) -> Result<Option<SnapshotCounts>>;
}

/// Back-off bookkeeping for rejected ("generic") translations, so
/// `translate` doesn't retry the same `(episode, language)` pair on
/// every firing (§4.3).
#[async_trait]
pub trait TranslationBackoffStore: Send + Sync {
    async fn is_backed_off(&self, episode_id: i64, language_code: &str) -> Result<bool>;
    async fn record_rejection(&self, episode_id: i64, language_code: &str, until: chrono::DateTime<chrono::Utc>) -> Result<()>;
}

/// What the Uploader last pushed for one `(interface_id, library,
/// series, episode)` key — or `(interface_id, library, series, season)`
/// for posters/backdrops, with `episode_id` absent (§4.7). Used to
/// decide whether a Card needs re-uploading without re-sending bytes
/// the server already accepted.
#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub interface_id: i64,
    pub library: String,
    pub series_id: i64,
    pub episode_id: Option<i64>,
    pub season_number: Option<i32>,
    pub artifact_kind: UploadArtifactKind,
    pub file_size: u64,
    pub fingerprint: Option<String>,
    pub uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadArtifactKind {
    TitleCard,
    SeriesPoster,
    SeriesBackground,
    SeasonPoster,
}

#[async_trait]
pub trait UploadRecordStore: Send + Sync {
    async fn get(
        &self,
        interface_id: i64,
        library: &str,
        series_id: i64,
        episode_id: Option<i64>,
        season_number: Option<i32>,
        artifact_kind: UploadArtifactKind,
    ) -> Result<Option<UploadRecord>>;
    async fn record(&self, record: &UploadRecord) -> Result<()>;
    /// Total rows of a given kind, used by `snapshot`'s `loaded` count.
    async fn count(&self, artifact_kind: UploadArtifactKind) -> Result<i64>;
}
