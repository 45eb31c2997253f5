//! Connection Registry (§4.2): pluggable, per-instance connectors to
//! media servers and metadata providers.
//!
//! A Connection is polymorphic over a capability set. Rather than
//! duck-typing ("does this object happen to have a `get_libraries`
//! method?"), each capability is an explicit trait a connector may or
//! may not implement, grounded on the indexer manager's `Arc<dyn
//! Indexer>` registry pattern — just generalized to five capability
//! traits instead of one.

pub mod emby;
pub mod jellyfin;
pub mod plex;
pub mod registry;
pub mod retry;
pub mod sonarr;
pub mod tautulli;
pub mod tmdb;
pub mod tvdb;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Connection, EpisodeInfo, SeriesInfo, WatchedStatus};

pub use registry::{ActivationError, ConnectorRegistry, InterfaceGroup};

/// Result of a search against a metadata provider or media server's
/// own search endpoint.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub info: SeriesInfo,
}

/// Outcome of pushing an artifact (title card, poster, backdrop) to a
/// media server. `Unsupported` covers e.g. season-poster loading on
/// connectors that never implemented it (SPEC_FULL §C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Loaded,
    Unchanged,
    Unsupported,
}

/// Base identity every connector exposes regardless of capability.
pub trait Connector: Send + Sync {
    fn interface_id(&self) -> i64;
    fn kind(&self) -> crate::model::ConnectionKind;
    /// Whether the last activation probe (or a subsequent failure)
    /// leaves this connector usable. A group is "truthy" only when
    /// every member reports `true` (§4.2).
    fn is_active(&self) -> bool;
}

#[async_trait]
pub trait EpisodeSource: Connector {
    async fn set_series_ids(&self, library: &str, series: &mut SeriesInfo) -> Result<()>;
    async fn set_episode_ids(&self, library: &str, series: &SeriesInfo, episodes: &mut [EpisodeInfo]) -> Result<()>;
    async fn get_all_episodes(&self, library: &str, series: &SeriesInfo) -> Result<Vec<(EpisodeInfo, WatchedStatus)>>;
    async fn query_series(&self, text: &str) -> Result<Vec<SearchResult>>;
}

#[async_trait]
pub trait MediaServer: EpisodeSource {
    async fn get_libraries(&self) -> Result<Vec<String>>;
    async fn get_source_image(&self, library: &str, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<Vec<u8>>>;
    async fn load_title_cards(&self, library: &str, series: &SeriesInfo, cards: &[(EpisodeInfo, Vec<u8>)]) -> Result<u32>;
    async fn load_series_poster(&self, library: &str, series: &SeriesInfo, bytes: &[u8]) -> Result<UploadOutcome>;
    async fn load_series_background(&self, library: &str, series: &SeriesInfo, bytes: &[u8]) -> Result<UploadOutcome>;
    async fn update_watched_statuses(&self, library: &str, series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>>;
    async fn get_series_poster(&self, library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>>;
    async fn get_series_logo(&self, library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait ImageSource: Connector {
    async fn get_all_source_images(&self, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Vec<crate::assets::source_image::ImageCandidate>>;
    async fn get_all_backdrops(&self, series: &SeriesInfo) -> Result<Vec<crate::assets::source_image::ImageCandidate>>;
    async fn get_all_logos(&self, series: &SeriesInfo) -> Result<Vec<crate::assets::source_image::ImageCandidate>>;
    async fn get_source_image(&self, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<Vec<u8>>>;
    async fn get_series_backdrop(&self, series: &SeriesInfo) -> Result<Option<Vec<u8>>>;
    async fn get_series_logo(&self, series: &SeriesInfo) -> Result<Option<Vec<u8>>>;
    async fn get_episode_title(&self, series: &SeriesInfo, episode: &EpisodeInfo, language_code: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait SyncSource: Connector {
    async fn sync_series(&self, filter: &crate::model::SyncFilter) -> Result<Vec<SearchResult>>;
}

/// Tautulli reports watched state derived from Plex playback history
/// rather than serving episodes, artwork, or a library listing itself —
/// it supplements a `MediaServer` connection's own watched-state query
/// rather than replacing it, so it gets its own narrow capability
/// instead of being shoehorned into `MediaServer`.
#[async_trait]
pub trait WatchStateSource: Connector {
    async fn get_watched_statuses(&self, library: &str, series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>>;
}

/// Build a bare `reqwest::Client` with the §4.2 default timeout and
/// optional SSL verification bypass. Individual connectors add their
/// own auth headers per-request since each uses a different scheme.
pub fn build_http_client(connection: &Connection) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(connection.request_timeout())
        .danger_accept_invalid_certs(!connection.verify_ssl)
        .build()
}
