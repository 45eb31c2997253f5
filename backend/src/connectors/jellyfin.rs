//! Jellyfin connector (§4.2). Jellyfin forked from Emby and keeps the
//! same query-parameter API-key scheme and item model, so this mirrors
//! `connectors::emby` closely; kept as its own connector rather than an
//! alias since the two have drifted on header names and activation
//! error text that matter for diagnostics (§4.2 "each connector
//! performs its own probe").

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, EpisodeSource, MediaServer, SearchResult, UploadOutcome};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, IdKey, SeriesInfo, SourceKind, WatchedStatus};

pub struct JellyfinConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
}

impl JellyfinConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false) })
    }

    fn base_url(&self) -> Result<&str> {
        self.connection.url.as_deref().ok_or_else(|| TcmError::InvalidRecipe("missing Jellyfin URL".into()))
    }

    fn api_key(&self) -> &str {
        &self.connection.credential
    }

    pub async fn activate(&self) -> Result<()> {
        let url = format!("{}/System/Info/Public", self.base_url()?.trim_end_matches('/'));
        let response = self.client.get(&url).send().await.map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            self.active.store(false, Ordering::SeqCst);
            return Err(classify_status(status, &body));
        }

        let auth_url = format!("{}/System/Info", self.base_url()?.trim_end_matches('/'));
        let auth_response = self
            .client
            .get(&auth_url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !auth_response.status().is_success() {
            let status = auth_response.status();
            self.active.store(false, Ordering::SeqCst);
            return Err(classify_status(status, ""));
        }

        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resolve_series_item_id(&self, series: &SeriesInfo) -> Result<Option<String>> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let name = series.name.clone();
        let body = retry_with_backoff("jellyfin.resolve_series_item", || {
            let base = base.clone();
            let name = name.clone();
            async move {
                let url = format!("{base}/Items");
                let response = self
                    .client
                    .get(&url)
                    .query(&[("api_key", self.api_key()), ("searchTerm", &name), ("includeItemTypes", "Series")])
                    .send()
                    .await
                    .map_err(|e| TcmError::transient(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(classify_status(response.status(), ""));
                }
                response.json::<Value>().await.map_err(|e| TcmError::Other(e.into()))
            }
        })
        .await?;
        Ok(body["Items"].get(0).and_then(|i| i["Id"].as_str()).map(str::to_string))
    }

    async fn resolve_episode_items(&self, series_item_id: &str) -> Result<Vec<Value>> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Shows/{series_item_id}/Episodes");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let body: Value = response.json().await.map_err(|e| TcmError::Other(e.into()))?;
        Ok(body["Items"].as_array().cloned().unwrap_or_default())
    }

    fn find_episode_item<'a>(items: &'a [Value], episode: &EpisodeInfo) -> Option<&'a Value> {
        items.iter().find(|item| {
            item["ParentIndexNumber"].as_i64() == Some(episode.season_number as i64)
                && item["IndexNumber"].as_i64() == Some(episode.episode_number as i64)
        })
    }

    async fn upload_image(&self, item_id: &str, bytes: &[u8]) -> Result<()> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Items/{item_id}/Images/Primary");
        let encoded = BASE64.encode(bytes);
        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key())])
            .header("Content-Type", "image/jpeg")
            .body(encoded)
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        Ok(())
    }

    async fn fetch_image(&self, item_id: &str) -> Result<Option<Vec<u8>>> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Items/{item_id}/Images/Primary");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let bytes = response.bytes().await.map_err(|e| TcmError::Other(e.into()))?;
        Ok(Some(bytes.to_vec()))
    }
}

impl Connector for JellyfinConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Jellyfin
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EpisodeSource for JellyfinConnector {
    async fn set_series_ids(&self, _library: &str, series: &mut SeriesInfo) -> Result<()> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let name = series.name.clone();
        let body = retry_with_backoff("jellyfin.set_series_ids", || {
            let base = base.clone();
            let name = name.clone();
            async move {
                let url = format!("{base}/Items");
                let response = self
                    .client
                    .get(&url)
                    .query(&[("api_key", self.api_key()), ("searchTerm", &name), ("includeItemTypes", "Series")])
                    .send()
                    .await
                    .map_err(|e| TcmError::transient(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(classify_status(response.status(), ""));
                }
                response.json::<Value>().await.map_err(|e| TcmError::Other(e.into()))
            }
        })
        .await?;

        if let Some(provider_ids) = body["Items"].get(0).and_then(|i| i.get("ProviderIds")) {
            if let Some(tvdb) = provider_ids.get("Tvdb").and_then(Value::as_str) {
                series.ids.set(IdKey::new(SourceKind::Tvdb, 0), tvdb, false)?;
            }
            if let Some(imdb) = provider_ids.get("Imdb").and_then(Value::as_str) {
                series.ids.set(IdKey::new(SourceKind::Imdb, 0), imdb, false)?;
            }
        }
        Ok(())
    }

    async fn set_episode_ids(&self, _library: &str, _series: &SeriesInfo, _episodes: &mut [EpisodeInfo]) -> Result<()> {
        Ok(())
    }

    async fn get_all_episodes(&self, library: &str, series: &SeriesInfo) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Shows/{}/Episodes", series.match_name());
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let body: Value = response.json().await.map_err(|e| TcmError::Other(e.into()))?;

        let mut episodes = Vec::new();
        for item in body["Items"].as_array().into_iter().flatten() {
            let season = item["ParentIndexNumber"].as_i64().unwrap_or(0) as i32;
            let episode_number = item["IndexNumber"].as_i64().unwrap_or(0) as i32;
            let title = item["Name"].as_str().unwrap_or_default().to_string();
            let watched = item["UserData"]["Played"].as_bool().unwrap_or(false);
            episodes.push((EpisodeInfo::new(title, season, episode_number), WatchedStatus::from_bool(watched)));
        }
        let _ = library;
        Ok(episodes)
    }

    async fn query_series(&self, text: &str) -> Result<Vec<SearchResult>> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Items");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key()), ("searchTerm", text), ("includeItemTypes", "Series")])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let body: Value = response.json().await.map_err(|e| TcmError::Other(e.into()))?;

        Ok(body["Items"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let name = item["Name"].as_str()?.to_string();
                let year = item["ProductionYear"].as_i64().unwrap_or(0) as i32;
                Some(SearchResult { info: SeriesInfo::new(name, year) })
            })
            .collect())
    }
}

#[async_trait]
impl MediaServer for JellyfinConnector {
    async fn get_libraries(&self) -> Result<Vec<String>> {
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Library/VirtualFolders");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let body: Vec<Value> = response.json().await.map_err(|e| TcmError::Other(e.into()))?;
        Ok(body.iter().filter_map(|v| v["Name"].as_str().map(str::to_string)).collect())
    }

    async fn get_source_image(&self, _library: &str, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<Vec<u8>>> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Ok(None);
        };
        let items = self.resolve_episode_items(&series_id).await?;
        let Some(item) = Self::find_episode_item(&items, episode) else {
            return Ok(None);
        };
        let Some(item_id) = item["Id"].as_str() else {
            return Ok(None);
        };
        self.fetch_image(item_id).await
    }

    async fn load_title_cards(&self, _library: &str, series: &SeriesInfo, cards: &[(EpisodeInfo, Vec<u8>)]) -> Result<u32> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Ok(0);
        };
        let items = self.resolve_episode_items(&series_id).await?;

        let mut loaded = 0u32;
        for (episode_info, bytes) in cards {
            let Some(item) = Self::find_episode_item(&items, episode_info) else {
                continue;
            };
            let Some(item_id) = item["Id"].as_str() else {
                continue;
            };
            self.upload_image(item_id, bytes).await?;
            loaded += 1;
        }
        Ok(loaded)
    }

    async fn load_series_poster(&self, _library: &str, series: &SeriesInfo, bytes: &[u8]) -> Result<UploadOutcome> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Err(TcmError::NotFound(format!("series {} not found on Jellyfin", series.name)));
        };
        self.upload_image(&series_id, bytes).await?;
        Ok(UploadOutcome::Loaded)
    }

    async fn load_series_background(&self, _library: &str, series: &SeriesInfo, bytes: &[u8]) -> Result<UploadOutcome> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Err(TcmError::NotFound(format!("series {} not found on Jellyfin", series.name)));
        };
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Items/{series_id}/Images/Backdrop");
        let encoded = BASE64.encode(bytes);
        let response = self
            .client
            .post(&url)
            .query(&[("api_key", self.api_key())])
            .header("Content-Type", "image/jpeg")
            .body(encoded)
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        Ok(UploadOutcome::Loaded)
    }

    async fn update_watched_statuses(&self, library: &str, series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let all = self.get_all_episodes(library, series).await?;
        Ok(all.into_iter().filter(|(info, _)| episodes.iter().any(|e| e.season_number == info.season_number && e.episode_number == info.episode_number)).collect())
    }

    async fn get_series_poster(&self, _library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Ok(None);
        };
        self.fetch_image(&series_id).await
    }

    async fn get_series_logo(&self, _library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let Some(series_id) = self.resolve_series_item_id(series).await? else {
            return Ok(None);
        };
        let base = self.base_url()?.trim_end_matches('/');
        let url = format!("{base}/Items/{series_id}/Images/Logo");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        let bytes = response.bytes().await.map_err(|e| TcmError::Other(e.into()))?;
        Ok(Some(bytes.to_vec()))
    }
}
