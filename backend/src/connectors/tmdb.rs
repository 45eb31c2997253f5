//! TMDb connector (§4.2): OAuth-style API key (v3 `api_key` query
//! param, or a v4 bearer token when configured), used purely as an
//! `ImageSource` — TMDb never hosts an episode's watch state or
//! library listing the way a media server does. Artwork candidates are
//! ranked by the connection's `language_priority` list via
//! `assets::source_image::rank_candidates`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::assets::source_image::ImageCandidate;
use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, ImageSource};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, SeriesInfo};

const TMDB_API_BASE: &str = "https://api.themoviedb.org/3";
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p/original";

pub struct TmdbConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
}

impl TmdbConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false) })
    }

    fn api_key(&self) -> &str {
        &self.connection.credential
    }

    pub async fn activate(&self) -> Result<()> {
        let url = format!("{TMDB_API_BASE}/authentication");
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key())])
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

    async fn get_json(&self, path: &str) -> Result<Value> {
        let path = path.to_string();
        retry_with_backoff("tmdb.get", || {
            let path = path.clone();
            async move {
                let url = format!("{TMDB_API_BASE}{path}");
                let separator = if path.contains('?') { "&" } else { "?" };
                let response = self
                    .client
                    .get(format!("{url}{separator}api_key={}", self.api_key()))
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
        if let Some(tmdb_id) = series.ids.get_global(crate::model::SourceKind::Tmdb) {
            return Ok(tmdb_id.parse().ok());
        }
        let body = self.get_json(&format!("/search/tv?query={}&first_air_date_year={}", series.match_name(), series.year)).await?;
        Ok(body["results"].as_array().and_then(|a| a.first()).and_then(|r| r["id"].as_i64()))
    }

    fn images_from(&self, entries: &[Value], key: &str) -> Vec<ImageCandidate> {
        entries
            .iter()
            .filter_map(|img| {
                let path = img[key].as_str()?;
                Some(ImageCandidate {
                    url: format!("{TMDB_IMAGE_BASE}{path}"),
                    width: img["width"].as_i64().unwrap_or(0) as u32,
                    height: img["height"].as_i64().unwrap_or(0) as u32,
                    language: img["iso_639_1"].as_str().map(str::to_string),
                    vote_average: img["vote_average"].as_f64().unwrap_or(0.0),
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

impl Connector for TmdbConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Tmdb
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for TmdbConnector {
    async fn get_all_source_images(&self, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self
            .get_json(&format!("/tv/{series_id}/season/{}/episode/{}/images", episode.season_number, episode.episode_number))
            .await?;
        let stills = body["stills"].as_array().cloned().unwrap_or_default();
        Ok(self.images_from(&stills, "file_path"))
    }

    async fn get_all_backdrops(&self, series: &SeriesInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self.get_json(&format!("/tv/{series_id}/images")).await?;
        let backdrops = body["backdrops"].as_array().cloned().unwrap_or_default();
        Ok(self.images_from(&backdrops, "file_path"))
    }

    async fn get_all_logos(&self, series: &SeriesInfo) -> Result<Vec<ImageCandidate>> {
        let Some(series_id) = self.find_series_id(series).await? else {
            return Ok(Vec::new());
        };
        let body = self.get_json(&format!("/tv/{series_id}/images")).await?;
        let logos = body["logos"].as_array().cloned().unwrap_or_default();
        Ok(self.images_from(&logos, "file_path"))
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
                "/tv/{series_id}/season/{}/episode/{}?language={language_code}",
                episode.season_number, episode.episode_number
            ))
            .await?;
        Ok(body["name"].as_str().map(str::to_string).filter(|t| !crate::model::episode_info::is_placeholder_title(t)))
    }
}
