//! TVDb connector (§4.2): login exchanges the stored API key for a
//! bearer token good for roughly 25 days (`TVDB_TOKEN_LIFETIME`); the
//! token is cached and re-issued once stale rather than being
//! requested on every call.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::assets::source_image::ImageCandidate;
use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, ImageSource};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, SeriesInfo, SourceKind};

const TVDB_API_BASE: &str = "https://api4.thetvdb.com/v4";

/// TVDb issues bearer tokens valid for roughly a month; refresh a few
/// hours early to avoid racing expiry mid-request.
const TVDB_TOKEN_LIFETIME: Duration = Duration::days(25);

struct Token {
    bearer: String,
    issued_at: DateTime<Utc>,
}

pub struct TvdbConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
    token: RwLock<Option<Token>>,
}

impl TvdbConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false), token: RwLock::new(None) })
    }

    async fn login(&self) -> Result<String> {
        let url = format!("{TVDB_API_BASE}/login");
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "apikey": self.connection.credential }))
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        let body: Value = response.json().await.map_err(|e| TcmError::Other(e.into()))?;
        body["data"]["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| TcmError::AuthError("tvdb login response missing token".into()))
    }

    async fn bearer(&self) -> Result<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if Utc::now() - token.issued_at < TVDB_TOKEN_LIFETIME {
                    return Ok(token.bearer.clone());
                }
            }
        }

        let bearer = self.login().await?;
        let mut guard = self.token.write().await;
        *guard = Some(Token { bearer: bearer.clone(), issued_at: Utc::now() });
        Ok(bearer)
    }

    pub async fn activate(&self) -> Result<()> {
        match self.bearer().await {
            Ok(_) => {
                self.active.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(err) => {
                self.active.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let path = path.to_string();
        retry_with_backoff("tvdb.get", || {
            let path = path.clone();
            async move {
                let bearer = self.bearer().await?;
                let url = format!("{TVDB_API_BASE}{path}");
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(bearer)
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

    async fn find_series_id(&self, series: &SeriesInfo) -> Result<Option<i64>> {
        if let Some(tvdb_id) = series.ids.get_global(SourceKind::Tvdb) {
            return Ok(tvdb_id.parse().ok());
        }
        let body = self.get_json(&format!("/search?query={}&type=series&year={}", series.match_name(), series.year)).await?;
        Ok(body["data"].as_array().and_then(|a| a.first()).and_then(|r| r["tvdb_id"].as_str()).and_then(|s| s.parse().ok()))
    }

    fn images_from(&self, entries: &[Value]) -> Vec<ImageCandidate> {
        entries
            .iter()
            .filter_map(|img| {
                let url = img["image"].as_str()?.to_string();
                Some(ImageCandidate {
                    url,
                    width: img["width"].as_i64().unwrap_or(0) as u32,
                    height: img["height"].as_i64().unwrap_or(0) as u32,
                    language: img["language"].as_str().map(str::to_string),
                    vote_average: img["score"].as_f64().unwrap_or(0.0),
                })
            })
            .collect()
    }

    async fn download(&self, candidate: &ImageCandidate) -> Result<Vec<u8>> {
        let response = self.client.get(&candidate.url).send().await.map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        Ok(response.bytes().await.map_err(|e| TcmError::Other(e.into()))?.to_vec())
    }
}

impl Connector for TvdbConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Tvdb
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for TvdbConnector {
    async fn get_all_source_images(&self, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self
            .get_json(&format!("/series/{series_id}/episodes/default?season={}&episodeNumber={}", episode.season_number, episode.episode_number))
            .await?;
        let episodes = body["data"]["episodes"].as_array().cloned().unwrap_or_default();
        let stills: Vec<Value> = episodes
            .into_iter()
            .filter(|e| e["number"].as_i64() == Some(episode.episode_number as i64))
            .filter_map(|e| e["image"].as_str().map(|p| serde_json::json!({ "image": p })))
            .collect();
        Ok(self.images_from(&stills))
    }

    async fn get_all_backdrops(&self, series: &SeriesInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self.get_json(&format!("/series/{series_id}/artworks?type=3")).await?;
        let artworks = body["data"]["artworks"].as_array().cloned().unwrap_or_default();
        Ok(self.images_from(&artworks))
    }

    async fn get_all_logos(&self, series: &SeriesInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self.get_json(&format!("/series/{series_id}/artworks?type=23")).await?;
        let artworks = body["data"]["artworks"].as_array().cloned().unwrap_or_default();
        Ok(self.images_from(&artworks))
    }

    async fn get_source_image(&self, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<Vec<u8>>> {
        let candidates = self.get_all_source_images(series, episode).await?;
        let ranked = crate::assets::source_image::rank_candidates(&candidates, &self.connection.language_priority);
        let Some(best) = ranked.first() else {
            return Ok(None);
        };
        Ok(Some(self.download(best).await?))
    }

    async fn get_series_backdrop(&self, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let candidates = self.get_all_backdrops(series).await?;
        let ranked = crate::assets::source_image::rank_candidates(&candidates, &self.connection.language_priority);
        let Some(best) = ranked.first() else {
            return Ok(None);
        };
        Ok(Some(self.download(best).await?))
    }

    async fn get_series_logo(&self, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let candidates = self.get_all_logos(series).await?;
        let ranked = crate::assets::source_image::rank_candidates(&candidates, &self.connection.language_priority);
        let Some(best) = ranked.first() else {
            return Ok(None);
        };
        Ok(Some(self.download(best).await?))
    }

    async fn get_episode_title(&self, series: &SeriesInfo, episode: &EpisodeInfo, language_code: &str) -> Result<Option<String>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(None);
        };
        let body = self
            .get_json(&format!(
                "/series/{series_id}/episodes/default/{language_code}?season={}&episodeNumber={}",
                episode.season_number, episode.episode_number
            ))
            .await?;
        let episodes = body["data"]["episodes"].as_array().cloned().unwrap_or_default();
        Ok(episodes
            .into_iter()
            .find(|e| e["number"].as_i64() == Some(episode.episode_number as i64))
            .and_then(|e| e["name"].as_str().map(str::to_string))
            .filter(|t| !crate::model::episode_info::is_placeholder_title(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lifetime_is_about_25_days() {
        assert_eq!(TVDB_TOKEN_LIFETIME, Duration::days(25));
    }
}
