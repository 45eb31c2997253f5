//! Sonarr connector (§4.2): API v3 behind `/api/v3/`
//! (`Connection::normalized_url`), `X-Api-Key` header auth. Sonarr's own
//! numeric series id is recorded as `"<interface_id>:<sonarr_id>"` since
//! a bare Sonarr id is not globally unique across multiple Sonarr
//! instances the way an IMDb/TMDb/TVDb id is.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, EpisodeSource, SearchResult, SyncSource};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, IdKey, SeriesInfo, SourceKind, SyncFilter, WatchedStatus};

pub struct SonarrConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
}

impl SonarrConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false) })
    }

    fn base_url(&self) -> Result<String> {
        self.connection.normalized_url().ok_or_else(|| TcmError::InvalidRecipe("missing Sonarr URL".into()))
    }

    fn api_key(&self) -> &str {
        &self.connection.credential
    }

    pub async fn activate(&self) -> Result<()> {
        let url = format!("{}system/status", self.base_url()?);
        let response = self
            .client
            .get(&url)
            .header("X-Api-Key", self.api_key())
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            self.active.store(false, Ordering::SeqCst);
            return Err(classify_status(status, &body));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Sonarr's own numeric id is only unique within one Sonarr instance,
    /// so the stable key is `(Sonarr, interface_id)` and the *value*
    /// carries the namespaced `"<interface_id>:<sonarr_id>"` string
    /// (§4.2) — keying on the bare `sonarr_id` instead would mint a new
    /// key every time a series' Sonarr id changed rather than
    /// reconciling against the one already on file.
    fn series_id_key(&self) -> IdKey {
        IdKey::new(SourceKind::Sonarr, self.connection.interface_id)
    }

    fn namespaced_id(&self, sonarr_id: i64) -> String {
        format!("{}:{}", self.connection.interface_id, sonarr_id)
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let base = self.base_url()?;
        let path = path.to_string();
        retry_with_backoff("sonarr.get", || {
            let base = base.clone();
            let path = path.clone();
            async move {
                let url = format!("{base}{path}");
                let response = self
                    .client
                    .get(&url)
                    .header("X-Api-Key", self.api_key())
                    .send()
                    .await
                    .map_err(|e| TcmError::transient(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(classify_status(response.status(), ""));
                }
                response.json::<Value>().await.map_err(|e| TcmError::Other(e.into()))
            }
        })
        .await
    }

    fn series_info_from(&self, item: &Value) -> Option<SeriesInfo> {
        let name = item["title"].as_str()?.to_string();
        let year = item["year"].as_i64().unwrap_or(0) as i32;
        let mut info = SeriesInfo::new(name, year);

        if let Some(id) = item["id"].as_i64() {
            let _ = info.ids.set(self.series_id_key(), self.namespaced_id(id), false);
        }
        if let Some(tvdb) = item["tvdbId"].as_i64() {
            let _ = info.ids.set(IdKey::new(SourceKind::Tvdb, 0), tvdb.to_string(), false);
        }
        if let Some(imdb) = item["imdbId"].as_str() {
            let _ = info.ids.set(IdKey::new(SourceKind::Imdb, 0), imdb, false);
        }
        Some(info)
    }
}

impl Connector for SonarrConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Sonarr
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EpisodeSource for SonarrConnector {
    async fn set_series_ids(&self, _library: &str, series: &mut SeriesInfo) -> Result<()> {
        let all = self.get_json("series").await?;
        let Some(found) = all.as_array().into_iter().flatten().find(|item| {
            item["title"].as_str().map(|t| crate::model::ids::matching_title(t)) == Some(series.match_name())
        }) else {
            return Ok(());
        };

        if let Some(id) = found["id"].as_i64() {
            series.ids.set(self.series_id_key(), self.namespaced_id(id), false)?;
        }
        if let Some(tvdb) = found["tvdbId"].as_i64() {
            series.ids.set(IdKey::new(SourceKind::Tvdb, 0), tvdb.to_string(), false)?;
        }
        if let Some(imdb) = found["imdbId"].as_str() {
            series.ids.set(IdKey::new(SourceKind::Imdb, 0), imdb, false)?;
        }
        Ok(())
    }

    async fn set_episode_ids(&self, _library: &str, series: &SeriesInfo, episodes: &mut [EpisodeInfo]) -> Result<()> {
        let all = self.get_json("series").await?;
        let Some(sonarr_id) = all
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| item["title"].as_str().map(|t| crate::model::ids::matching_title(t)) == Some(series.match_name()))
            .and_then(|item| item["id"].as_i64())
        else {
            return Ok(());
        };

        let body = self.get_json(&format!("episode?seriesId={sonarr_id}")).await?;
        for item in body.as_array().into_iter().flatten() {
            let season = item["seasonNumber"].as_i64().unwrap_or(-1) as i32;
            let number = item["episodeNumber"].as_i64().unwrap_or(-1) as i32;
            let Some(episode) = episodes.iter_mut().find(|e| e.season_number == season && e.episode_number == number) else {
                continue;
            };
            if let Some(id) = item["id"].as_i64() {
                episode.ids.set(IdKey::with_library(SourceKind::Sonarr, self.connection.interface_id, id.to_string()), id.to_string(), false)?;
            }
        }
        Ok(())
    }

    async fn get_all_episodes(&self, _library: &str, series: &SeriesInfo) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let all = self.get_json("series").await?;
        let Some(found) = all.as_array().into_iter().flatten().find(|item| {
            item["title"].as_str().map(|t| crate::model::ids::matching_title(t)) == Some(series.match_name())
        }) else {
            return Ok(Vec::new());
        };
        let Some(sonarr_id) = found["id"].as_i64() else {
            return Ok(Vec::new());
        };

        let body = self.get_json(&format!("episode?seriesId={sonarr_id}")).await?;
        let mut episodes = Vec::new();
        for item in body.as_array().into_iter().flatten() {
            let season = item["seasonNumber"].as_i64().unwrap_or(0) as i32;
            let number = item["episodeNumber"].as_i64().unwrap_or(0) as i32;
            let title = item["title"].as_str().unwrap_or_default().to_string();
            // `^(tba|tbd)$` is never a real episode title regardless of
            // data source (§4.2 supplement); dropped here rather than
            // ingested and filtered later so it never becomes an Episode.
            if crate::model::episode_info::always_placeholder(&title) {
                continue;
            }
            let watched = item["hasFile"].as_bool().unwrap_or(false);
            episodes.push((EpisodeInfo::new(title, season, number), WatchedStatus::from_bool(watched)));
        }
        Ok(episodes)
    }

    async fn query_series(&self, text: &str) -> Result<Vec<SearchResult>> {
        let body = self.get_json(&format!("series/lookup?term={text}")).await?;
        Ok(body
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| self.series_info_from(item))
            .map(|info| SearchResult { info })
            .collect())
    }
}

#[async_trait]
impl SyncSource for SonarrConnector {
    async fn sync_series(&self, filter: &SyncFilter) -> Result<Vec<SearchResult>> {
        let body = self.get_json("series").await?;
        Ok(body
            .as_array()
            .into_iter()
            .flatten()
            .filter(|item| {
                if filter.required_tags.is_empty() {
                    return true;
                }
                let tags: Vec<String> = item["tags"].as_array().into_iter().flatten().filter_map(|t| t.as_str().map(str::to_string)).collect();
                filter.required_tags.iter().any(|t| tags.contains(t))
            })
            .filter_map(|item| self.series_info_from(item))
            .map(|info| SearchResult { info })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncFilter;

    fn connector(interface_id: i64) -> SonarrConnector {
        let connection = Connection {
            interface_id,
            kind: ConnectionKind::Sonarr,
            name: "test".into(),
            url: Some("http://sonarr:8989".into()),
            credential: "key".into(),
            verify_ssl: true,
            filesize_limit_bytes: None,
            watched_user: None,
            sync_filter: SyncFilter::default(),
            language_priority: vec![],
            enabled: true,
        };
        SonarrConnector::new(connection).unwrap()
    }

    #[test]
    fn series_id_key_is_stable_across_sonarr_ids() {
        let c = connector(7);
        assert_eq!(c.series_id_key(), c.series_id_key());
        assert_eq!(c.series_id_key().instance_id, 7);
        assert!(c.series_id_key().library.is_none());
    }

    #[test]
    fn namespaced_id_carries_interface_and_sonarr_id() {
        let c = connector(7);
        assert_eq!(c.namespaced_id(42), "7:42");
    }

    #[test]
    fn series_info_from_sets_namespaced_value_under_stable_key() {
        let c = connector(7);
        let item = serde_json::json!({"title": "Breaking Bad", "year": 2008, "id": 42});
        let info = c.series_info_from(&item).unwrap();
        assert_eq!(info.ids.get_scoped(&c.series_id_key()), Some("7:42"));
    }
}
