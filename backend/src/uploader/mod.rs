//! Uploader (§4.7): pushes built Cards, posters, and backdrops back
//! through a `MediaServer` connector, and relays that connector's
//! watched-state report back to the caller.
//!
//! Grounded on `connectors::retry::retry_with_backoff` for the actual
//! network interaction, and on `store::UploadRecordStore` to decide
//! *whether* a push is needed at all — the acceptance record is the
//! only thing that lets a re-run of `load_cards` skip bytes the server
//! already has.

use std::sync::Arc;

use crate::assets::compression::{compress_to_limit, JpegCompressor};
use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{MediaServer, UploadOutcome};
use crate::error::{Result, TcmError};
use crate::model::{Card, Connection, EpisodeInfo, SeriesInfo, WatchedStatus};
use crate::store::{UploadArtifactKind, UploadRecord, UploadRecordStore};

pub struct Uploader {
    upload_records: Arc<dyn UploadRecordStore>,
    compressor: Arc<dyn JpegCompressor>,
}

impl Uploader {
    pub fn new(upload_records: Arc<dyn UploadRecordStore>, compressor: Arc<dyn JpegCompressor>) -> Self {
        Self { upload_records, compressor }
    }

    /// Upload every Card in `cards`, in the order given — callers pass
    /// them already sorted ascending `(season, episode)` per §5, so a
    /// failure partway through never obscures the records already
    /// written for earlier episodes.
    pub async fn upload_title_cards(
        &self,
        media_server: &dyn MediaServer,
        connection: &Connection,
        series_id: i64,
        library: &str,
        series: &SeriesInfo,
        cards: &[(EpisodeInfo, Card)],
    ) -> Vec<(i64, Result<UploadOutcome>)> {
        let mut results = Vec::with_capacity(cards.len());
        for (episode_info, card) in cards {
            let outcome = self.upload_one_title_card(media_server, connection, series_id, library, series, episode_info, card).await;
            results.push((card.episode_id, outcome));
        }
        results
    }

    async fn upload_one_title_card(
        &self,
        media_server: &dyn MediaServer,
        connection: &Connection,
        series_id: i64,
        library: &str,
        series: &SeriesInfo,
        episode_info: &EpisodeInfo,
        card: &Card,
    ) -> Result<UploadOutcome> {
        if self.already_uploaded(connection.interface_id, library, series_id, Some(card.episode_id), None, UploadArtifactKind::TitleCard, card.file_size, card.fingerprint.as_str()).await? {
            return Ok(UploadOutcome::Unchanged);
        }

        let raw = tokio::fs::read(&card.file_path)
            .await
            .map_err(|e| TcmError::transient(format!("reading {}: {e}", card.file_path)))?;
        let bytes = compress_to_limit(self.compressor.as_ref(), &raw, connection.filesize_limit_bytes)?;
        let file_size = bytes.len() as u64;

        let batch = [(episode_info.clone(), bytes)];
        let loaded = retry_with_backoff("upload_title_card", || async { media_server.load_title_cards(library, series, &batch).await }).await?;
        if loaded == 0 {
            return Err(TcmError::transient(format!("server accepted 0 of 1 title card for episode {}", card.episode_id)));
        }

        self.record(connection.interface_id, library, series_id, Some(card.episode_id), None, UploadArtifactKind::TitleCard, file_size, Some(card.fingerprint.as_str())).await?;
        Ok(UploadOutcome::Loaded)
    }

    pub async fn upload_series_poster(
        &self,
        media_server: &dyn MediaServer,
        connection: &Connection,
        series_id: i64,
        library: &str,
        series: &SeriesInfo,
        bytes: &[u8],
        fingerprint: &str,
    ) -> Result<UploadOutcome> {
        let file_size = bytes.len() as u64;
        if self.already_uploaded(connection.interface_id, library, series_id, None, None, UploadArtifactKind::SeriesPoster, file_size, fingerprint).await? {
            return Ok(UploadOutcome::Unchanged);
        }

        let bytes = compress_to_limit(self.compressor.as_ref(), bytes, connection.filesize_limit_bytes)?;
        let outcome = retry_with_backoff("upload_series_poster", || async { media_server.load_series_poster(library, series, &bytes).await }).await?;
        if outcome == UploadOutcome::Loaded {
            self.record(connection.interface_id, library, series_id, None, None, UploadArtifactKind::SeriesPoster, bytes.len() as u64, Some(fingerprint)).await?;
        }
        Ok(outcome)
    }

    pub async fn upload_series_background(
        &self,
        media_server: &dyn MediaServer,
        connection: &Connection,
        series_id: i64,
        library: &str,
        series: &SeriesInfo,
        bytes: &[u8],
        fingerprint: &str,
    ) -> Result<UploadOutcome> {
        let file_size = bytes.len() as u64;
        if self.already_uploaded(connection.interface_id, library, series_id, None, None, UploadArtifactKind::SeriesBackground, file_size, fingerprint).await? {
            return Ok(UploadOutcome::Unchanged);
        }

        let bytes = compress_to_limit(self.compressor.as_ref(), bytes, connection.filesize_limit_bytes)?;
        let outcome = retry_with_backoff("upload_series_background", || async { media_server.load_series_background(library, series, &bytes).await }).await?;
        if outcome == UploadOutcome::Loaded {
            self.record(connection.interface_id, library, series_id, None, None, UploadArtifactKind::SeriesBackground, bytes.len() as u64, Some(fingerprint)).await?;
        }
        Ok(outcome)
    }

    /// Season-poster loading has no connector capability implementing
    /// it (SPEC_FULL §C resolves this as "not implemented," not an
    /// error) — report it without touching the network or the
    /// acceptance record.
    pub async fn upload_season_poster(&self, _series_id: i64, _season_number: i32) -> Result<UploadOutcome> {
        Ok(UploadOutcome::Unsupported)
    }

    /// Ask the connector for each Episode's current watched status.
    /// Merging the result into the Episode's per-library `WatchedMap`
    /// and triggering re-resolution/invalidation on a change is the
    /// scheduler's `watched_sync` job's responsibility — this is just
    /// the retried network call.
    pub async fn fetch_watched_statuses(
        &self,
        media_server: &dyn MediaServer,
        library: &str,
        series: &SeriesInfo,
        episodes: &[EpisodeInfo],
    ) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        retry_with_backoff("watched_sync", || async { media_server.update_watched_statuses(library, series, episodes).await }).await
    }

    async fn already_uploaded(
        &self,
        interface_id: i64,
        library: &str,
        series_id: i64,
        episode_id: Option<i64>,
        season_number: Option<i32>,
        kind: UploadArtifactKind,
        file_size: u64,
        fingerprint: &str,
    ) -> Result<bool> {
        let Some(last) = self.upload_records.get(interface_id, library, series_id, episode_id, season_number, kind).await? else {
            return Ok(false);
        };
        Ok(last.file_size == file_size && last.fingerprint.as_deref() == Some(fingerprint))
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        interface_id: i64,
        library: &str,
        series_id: i64,
        episode_id: Option<i64>,
        season_number: Option<i32>,
        artifact_kind: UploadArtifactKind,
        file_size: u64,
        fingerprint: Option<&str>,
    ) -> Result<()> {
        self.upload_records
            .record(&UploadRecord {
                interface_id,
                library: library.to_string(),
                series_id,
                episode_id,
                season_number,
                artifact_kind,
                file_size,
                fingerprint: fingerprint.map(|s| s.to_string()),
                uploaded_at: chrono::Utc::now(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    use crate::connectors::{Connector, EpisodeSource, SearchResult};
    use crate::model::{ConnectionKind, SyncFilter};

    #[derive(Default)]
    struct FakeUploadRecordStore(Mutex<Vec<UploadRecord>>);

    #[async_trait]
    impl UploadRecordStore for FakeUploadRecordStore {
        async fn get(&self, interface_id: i64, library: &str, series_id: i64, episode_id: Option<i64>, season_number: Option<i32>, artifact_kind: UploadArtifactKind) -> Result<Option<UploadRecord>> {
            Ok(self.0.lock().unwrap().iter().find(|r| {
                r.interface_id == interface_id
                    && r.library == library
                    && r.series_id == series_id
                    && r.episode_id == episode_id
                    && r.season_number == season_number
                    && r.artifact_kind == artifact_kind
            }).cloned())
        }
        async fn record(&self, record: &UploadRecord) -> Result<()> {
            let mut records = self.0.lock().unwrap();
            records.retain(|r| !(r.interface_id == record.interface_id && r.library == record.library && r.series_id == record.series_id && r.episode_id == record.episode_id && r.season_number == record.season_number && r.artifact_kind == record.artifact_kind));
            records.push(record.clone());
            Ok(())
        }
        async fn count(&self, artifact_kind: UploadArtifactKind) -> Result<i64> {
            Ok(self.0.lock().unwrap().iter().filter(|r| r.artifact_kind == artifact_kind).count() as i64)
        }
    }

    struct NoopCompressor;
    impl JpegCompressor for NoopCompressor {
        fn recompress(&self, bytes: &[u8], _quality: u8) -> Result<Vec<u8>> {
            Ok(bytes.to_vec())
        }
    }

    struct FakeMediaServer {
        interface_id: i64,
        loaded_calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for FakeMediaServer {
        fn interface_id(&self) -> i64 {
            self.interface_id
        }
        fn kind(&self) -> ConnectionKind {
            ConnectionKind::Emby
        }
        fn is_active(&self) -> bool {
            true
        }
    }

    #[async_trait]
    impl EpisodeSource for FakeMediaServer {
        async fn set_series_ids(&self, _library: &str, _series: &mut SeriesInfo) -> Result<()> {
            Ok(())
        }
        async fn set_episode_ids(&self, _library: &str, _series: &SeriesInfo, _episodes: &mut [EpisodeInfo]) -> Result<()> {
            Ok(())
        }
        async fn get_all_episodes(&self, _library: &str, _series: &SeriesInfo) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
            Ok(vec![])
        }
        async fn query_series(&self, _text: &str) -> Result<Vec<SearchResult>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl MediaServer for FakeMediaServer {
        async fn get_libraries(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn get_source_image(&self, _library: &str, _series: &SeriesInfo, _episode: &EpisodeInfo) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn load_title_cards(&self, _library: &str, _series: &SeriesInfo, cards: &[(EpisodeInfo, Vec<u8>)]) -> Result<u32> {
            self.loaded_calls.fetch_add(1, Ordering::SeqCst);
            Ok(cards.len() as u32)
        }
        async fn load_series_poster(&self, _library: &str, _series: &SeriesInfo, _bytes: &[u8]) -> Result<UploadOutcome> {
            Ok(UploadOutcome::Loaded)
        }
        async fn load_series_background(&self, _library: &str, _series: &SeriesInfo, _bytes: &[u8]) -> Result<UploadOutcome> {
            Ok(UploadOutcome::Loaded)
        }
        async fn update_watched_statuses(&self, _library: &str, _series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
            Ok(episodes.iter().map(|e| (e.clone(), WatchedStatus::Watched)).collect())
        }
        async fn get_series_poster(&self, _library: &str, _series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn get_series_logo(&self, _library: &str, _series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn connection(interface_id: i64) -> Connection {
        Connection {
            interface_id,
            kind: ConnectionKind::Emby,
            name: "test".into(),
            url: Some("http://emby:8096".into()),
            credential: "secret".into(),
            verify_ssl: true,
            filesize_limit_bytes: None,
            watched_user: None,
            sync_filter: SyncFilter::default(),
            language_priority: vec![],
            enabled: true,
        }
    }

    fn card(episode_id: i64, file_path: &str, file_size: u64) -> Card {
        Card {
            episode_id,
            library: "Shows".into(),
            file_path: file_path.to_string(),
            file_size,
            fingerprint: crate::model::Fingerprint("v1:abc".into()),
            recipe_json: "{}".into(),
        }
    }

    #[tokio::test]
    async fn uploads_a_card_that_was_never_recorded() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), b"card-bytes").await.unwrap();

        let uploader = Uploader::new(Arc::new(FakeUploadRecordStore::default()), Arc::new(NoopCompressor));
        let media_server = FakeMediaServer { interface_id: 1, loaded_calls: AtomicU32::new(0) };
        let conn = connection(1);
        let series = SeriesInfo::new("Show", 2020);
        let episode = EpisodeInfo::new("Pilot", 1, 1);
        let card = card(10, file.path().to_str().unwrap(), 10);

        let results = uploader.upload_title_cards(&media_server, &conn, 1, "Shows", &series, &[(episode, card)]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.as_ref().unwrap(), &UploadOutcome::Loaded);
        assert_eq!(media_server.loaded_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_network_call_when_fingerprint_unchanged() {
        let file = NamedTempFile::new().unwrap();
        tokio::fs::write(file.path(), b"card-bytes").await.unwrap();

        let records = Arc::new(FakeUploadRecordStore::default());
        let uploader = Uploader::new(records.clone(), Arc::new(NoopCompressor));
        let media_server = FakeMediaServer { interface_id: 1, loaded_calls: AtomicU32::new(0) };
        let conn = connection(1);
        let series = SeriesInfo::new("Show", 2020);
        let episode = EpisodeInfo::new("Pilot", 1, 1);
        let card = card(10, file.path().to_str().unwrap(), 10);

        uploader.upload_title_cards(&media_server, &conn, 1, "Shows", &series, &[(episode.clone(), card.clone())]).await;
        assert_eq!(media_server.loaded_calls.load(Ordering::SeqCst), 1);

        uploader.upload_title_cards(&media_server, &conn, 1, "Shows", &series, &[(episode, card)]).await;
        assert_eq!(media_server.loaded_calls.load(Ordering::SeqCst), 1, "second push with an unchanged fingerprint must not touch the network");
    }

    #[tokio::test]
    async fn season_poster_is_reported_unsupported() {
        let uploader = Uploader::new(Arc::new(FakeUploadRecordStore::default()), Arc::new(NoopCompressor));
        assert_eq!(uploader.upload_season_poster(1, 2).await.unwrap(), UploadOutcome::Unsupported);
    }
}
