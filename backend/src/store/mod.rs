//! Persistence boundary (§A.4): trait contracts plus one concrete
//! SQLite-backed implementation. Everything outside this module reaches
//! the store only through `traits`.

pub mod sqlite;
pub mod traits;

pub use traits::{
    CardStore, ConnectionStore, EpisodeStore, FontStore, JobOutcome, JobRun, JobRunStore, SeriesStore,
    SnapshotCounts, SnapshotStore, TemplateStore, TranslationBackoffStore, UploadArtifactKind, UploadRecord,
    UploadRecordStore,
};
