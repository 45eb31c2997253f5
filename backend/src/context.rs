//! Injected application context (SPEC_FULL §A.3, Design Note 9):
//! every store handle, connector registry, and coordination service a
//! job or HTTP handler needs, bundled once at startup and passed down
//! explicitly rather than reached for through global state.

use std::sync::Arc;

use crate::assets::compression::JpegCompressor;
use crate::cardtype::CardTypeLoader;
use crate::config::Config;
use crate::connectors::ConnectorRegistry;
use crate::render::RenderCoordinator;
use crate::resolver::Resolver;
use crate::store::sqlite::Store;
use crate::store::{
    CardStore, ConnectionStore, EpisodeStore, FontStore, JobRunStore, SeriesStore, SnapshotStore, TemplateStore,
    TranslationBackoffStore, UploadRecordStore,
};
use crate::uploader::Uploader;

pub struct AppContext {
    pub config: Config,

    pub series: Arc<dyn SeriesStore>,
    pub episodes: Arc<dyn EpisodeStore>,
    pub cards: Arc<dyn CardStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub fonts: Arc<dyn FontStore>,
    pub job_runs: Arc<dyn JobRunStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub translation_backoff: Arc<dyn TranslationBackoffStore>,
    pub upload_records: Arc<dyn UploadRecordStore>,

    pub connectors: Arc<ConnectorRegistry>,
    pub resolver: Arc<Resolver>,
    pub render: Arc<RenderCoordinator>,
    pub card_types: Arc<CardTypeLoader>,
    pub uploader: Arc<Uploader>,
}

impl AppContext {
    /// `compressor` is the injected re-encode kernel behind
    /// `assets::compression::JpegCompressor` (§4.4) — out of this
    /// crate's scope to implement (§1), supplied by whatever embeds it.
    pub fn new(config: Config, store: &Store, connectors: Arc<ConnectorRegistry>, card_types: Arc<CardTypeLoader>, compressor: Arc<dyn JpegCompressor>) -> Self {
        let templates: Arc<dyn TemplateStore> = Arc::new(store.templates());
        let fonts: Arc<dyn FontStore> = Arc::new(store.fonts());
        let translation_backoff: Arc<dyn TranslationBackoffStore> = Arc::new(store.translation_backoffs());
        let cards: Arc<dyn CardStore> = Arc::new(store.cards());
        let upload_records: Arc<dyn UploadRecordStore> = Arc::new(store.upload_records());

        let resolver = Arc::new(Resolver::new(
            templates.clone(),
            fonts.clone(),
            translation_backoff.clone(),
            config.global_recipe.clone(),
            config.translation_backoff,
        ));
        let render = Arc::new(RenderCoordinator::new(cards.clone()));
        let uploader = Arc::new(Uploader::new(upload_records.clone(), compressor));

        Self {
            config,
            series: Arc::new(store.series()),
            episodes: Arc::new(store.episodes()),
            cards,
            connections: Arc::new(store.connections()),
            templates,
            fonts,
            job_runs: Arc::new(store.job_runs()),
            snapshots: Arc::new(store.snapshots()),
            translation_backoff,
            upload_records,
            connectors,
            resolver,
            render,
            card_types,
            uploader,
        }
    }
}
