//! Plex connector (§4.2): `X-Plex-Token` header auth, library lookup by
//! `type=show`, ID reconciliation from `Guid` entries of the form
//! `imdb://tt123`, `tmdb://456`, `tvdb://789`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, EpisodeSource, MediaServer, SearchResult, UploadOutcome};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, IdKey, SeriesInfo, SourceKind, WatchedStatus};

/// Label applied to an uploaded image's Plex metadata entry so a later
/// `get_source_image`/`get_series_poster` read can tell "this is a card
/// TCM already loaded" apart from genuine source material (§4.7) —
/// the EXIF tag the original write also stamps is left to the
/// image-composition kernel that produces the bytes (§1 Non-goal);
/// this connector owns the wire-level ownership marker only.
const OWNER_LABEL: &str = "TCM";

pub struct PlexConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
}

/// Parse a Plex `Guid` value (`imdb://tt123`, `tmdb://456`, `tvdb://789`)
/// into a `(SourceKind, id)` pair. Unknown schemes are ignored.
fn parse_guid(guid: &str) -> Option<(SourceKind, &str)> {
    let (scheme, id) = guid.split_once("://")?;
    let kind = match scheme {
        "imdb" => SourceKind::Imdb,
        "tmdb" => SourceKind::Tmdb,
        "tvdb" => SourceKind::Tvdb,
        _ => return None,
    };
    Some((kind, id))
}

impl PlexConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false) })
    }

    fn base_url(&self) -> Result<&str> {
        self.connection.url.as_deref().ok_or_else(|| TcmError::InvalidRecipe("missing Plex URL".into()))
    }

    fn token(&self) -> &str {
        &self.connection.credential
    }

    pub async fn activate(&self) -> Result<()> {
        let url = format!("{}/identity", self.base_url()?.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", self.token())
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
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let path = path.to_string();
        retry_with_backoff("plex.get", || {
            let base = base.clone();
            let path = path.clone();
            async move {
                let url = format!("{base}{path}");
                let response = self
                    .client
                    .get(&url)
                    .header("X-Plex-Token", self.token())
                    .header("Accept", "application/json")
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

    fn section_key_for(&self, sections: &Value, library: &str) -> Option<String> {
        sections["MediaContainer"]["Directory"]
            .as_array()?
            .iter()
            .find(|d| d["title"].as_str() == Some(library) && d["type"].as_str() == Some("show"))
            .and_then(|d| d["key"].as_str())
            .map(str::to_string)
    }

    async fn resolve_series_rating_key(&self, library: &str, series: &SeriesInfo) -> Result<Option<String>> {
        let sections = self.get_json("/library/sections").await?;
        let Some(key) = self.section_key_for(&sections, library) else {
            return Ok(None);
        };
        let search = self.get_json(&format!("/library/sections/{key}/all?type=2&title={}", series.match_name())).await?;
        Ok(search["MediaContainer"]["Metadata"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|i| i["ratingKey"].as_str())
            .map(str::to_string))
    }

    async fn resolve_episode_rating_key(&self, library: &str, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<String>> {
        let Some(series_rating_key) = self.resolve_series_rating_key(library, series).await? else {
            return Ok(None);
        };
        let episodes_json = self.get_json(&format!("/library/metadata/{series_rating_key}/allLeaves")).await?;
        Ok(episodes_json["MediaContainer"]["Metadata"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|item| {
                item["parentIndex"].as_i64() == Some(episode.season_number as i64)
                    && item["index"].as_i64() == Some(episode.episode_number as i64)
            })
            .and_then(|item| item["ratingKey"].as_str())
            .map(str::to_string))
    }

    /// Multipart POST to `/library/metadata/<ratingKey>/posters` (§4.7,
    /// §6); followed by the owner-label marker so a later read can tell
    /// this image apart from genuine source material.
    async fn upload_poster(&self, rating_key: &str, bytes: &[u8]) -> Result<()> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let url = format!("{base}/library/metadata/{rating_key}/posters");
        let part = reqwest::multipart::Part::bytes(bytes.to_vec())
            .file_name("card.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| TcmError::Other(e.into()))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(&url)
            .header("X-Plex-Token", self.token())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        self.apply_owner_label(rating_key).await
    }

    async fn apply_owner_label(&self, rating_key: &str) -> Result<()> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let url = format!("{base}/library/metadata/{rating_key}");
        let response = self
            .client
            .put(&url)
            .header("X-Plex-Token", self.token())
            .query(&[("label[0].tag.tag", OWNER_LABEL), ("label.locked", "1")])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(classify_status(response.status(), ""));
        }
        Ok(())
    }

    /// GET an absolute Plex resource path (`thumb`/`art` field off a
    /// metadata item) with the same bearer token as every other call.
    /// A missing image is data, not an error (§7).
    async fn fetch_resource_path(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let url = format!("{base}{path}");
        let response = self
            .client
            .get(&url)
            .header("X-Plex-Token", self.token())
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

impl Connector for PlexConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Plex
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EpisodeSource for PlexConnector {
    async fn set_series_ids(&self, library: &str, series: &mut SeriesInfo) -> Result<()> {
        let sections = self.get_json("/library/sections").await?;
        let Some(key) = self.section_key_for(&sections, library) else {
            return Ok(());
        };
        let search = self.get_json(&format!("/library/sections/{key}/all?type=2&title={}", series.match_name())).await?;
        let Some(item) = search["MediaContainer"]["Metadata"].as_array().and_then(|a| a.first()) else {
            return Ok(());
        };
        for guid in item["Guid"].as_array().into_iter().flatten() {
            if let Some(value) = guid["id"].as_str() {
                if let Some((kind, id)) = parse_guid(value) {
                    series.ids.set(IdKey::new(kind, 0), id, false)?;
                }
            }
        }
        Ok(())
    }

    async fn set_episode_ids(&self, _library: &str, _series: &SeriesInfo, _episodes: &mut [EpisodeInfo]) -> Result<()> {
        Ok(())
    }

    async fn get_all_episodes(&self, library: &str, series: &SeriesInfo) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let sections = self.get_json("/library/sections").await?;
        let Some(key) = self.section_key_for(&sections, library) else {
            return Ok(Vec::new());
        };
        let search = self.get_json(&format!("/library/sections/{key}/all?type=2&title={}", series.match_name())).await?;
        let Some(rating_key) = search["MediaContainer"]["Metadata"].as_array().and_then(|a| a.first()).and_then(|i| i["ratingKey"].as_str()) else {
            return Ok(Vec::new());
        };

        let episodes_json = self.get_json(&format!("/library/metadata/{rating_key}/allLeaves")).await?;
        let mut episodes = Vec::new();
        for item in episodes_json["MediaContainer"]["Metadata"].as_array().into_iter().flatten() {
            let season = item["parentIndex"].as_i64().unwrap_or(0) as i32;
            let episode_number = item["index"].as_i64().unwrap_or(0) as i32;
            let title = item["title"].as_str().unwrap_or_default().to_string();
            let watched = item["viewCount"].as_i64().unwrap_or(0) > 0;
            episodes.push((EpisodeInfo::new(title, season, episode_number), WatchedStatus::from_bool(watched)));
        }
        Ok(episodes)
    }

    async fn query_series(&self, text: &str) -> Result<Vec<SearchResult>> {
        let body = self.get_json(&format!("/search?query={text}&type=2")).await?;
        Ok(body["MediaContainer"]["Metadata"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| {
                let name = item["title"].as_str()?.to_string();
                let year = item["year"].as_i64().unwrap_or(0) as i32;
                Some(SearchResult { info: SeriesInfo::new(name, year) })
            })
            .collect())
    }
}

#[async_trait]
impl MediaServer for PlexConnector {
    async fn get_libraries(&self) -> Result<Vec<String>> {
        let sections = self.get_json("/library/sections").await?;
        Ok(sections["MediaContainer"]["Directory"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|d| d["type"].as_str() == Some("show"))
            .filter_map(|d| d["title"].as_str().map(str::to_string))
            .collect())
    }

    async fn get_source_image(&self, library: &str, series: &SeriesInfo, episode: &EpisodeInfo) -> Result<Option<Vec<u8>>> {
        let Some(rating_key) = self.resolve_episode_rating_key(library, series, episode).await? else {
            return Ok(None);
        };
        let metadata = self.get_json(&format!("/library/metadata/{rating_key}")).await?;
        let Some(thumb) = metadata["MediaContainer"]["Metadata"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|i| i["thumb"].as_str())
        else {
            return Ok(None);
        };
        self.fetch_resource_path(thumb).await
    }

    async fn load_title_cards(&self, library: &str, series: &SeriesInfo, cards: &[(EpisodeInfo, Vec<u8>)]) -> Result<u32> {
        let mut loaded = 0u32;
        for (episode_info, bytes) in cards {
            let Some(rating_key) = self.resolve_episode_rating_key(library, series, episode_info).await? else {
                continue;
            };
            self.upload_poster(&rating_key, bytes).await?;
            loaded += 1;
        }
        Ok(loaded)
    }

    async fn load_series_poster(&self, library: &str, series: &SeriesInfo, bytes: &[u8]) -> Result<UploadOutcome> {
        let Some(rating_key) = self.resolve_series_rating_key(library, series).await? else {
            return Err(TcmError::NotFound(format!("series {} not found on Plex", series.name)));
        };
        self.upload_poster(&rating_key, bytes).await?;
        Ok(UploadOutcome::Loaded)
    }

    async fn load_series_background(&self, _library: &str, _series: &SeriesInfo, _bytes: &[u8]) -> Result<UploadOutcome> {
        // Plex does not expose a distinct per-series "background" upload
        // endpoint separate from art; modeled as unsupported rather than
        // silently writing to the wrong slot (SPEC_FULL §C).
        Ok(UploadOutcome::Unsupported)
    }

    async fn update_watched_statuses(&self, library: &str, series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let all = self.get_all_episodes(library, series).await?;
        Ok(all.into_iter().filter(|(info, _)| episodes.iter().any(|e| e.season_number == info.season_number && e.episode_number == info.episode_number)).collect())
    }

    async fn get_series_poster(&self, library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let Some(rating_key) = self.resolve_series_rating_key(library, series).await? else {
            return Ok(None);
        };
        let metadata = self.get_json(&format!("/library/metadata/{rating_key}")).await?;
        let Some(thumb) = metadata["MediaContainer"]["Metadata"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|i| i["thumb"].as_str())
        else {
            return Ok(None);
        };
        self.fetch_resource_path(thumb).await
    }

    async fn get_series_logo(&self, library: &str, series: &SeriesInfo) -> Result<Option<Vec<u8>>> {
        let Some(rating_key) = self.resolve_series_rating_key(library, series).await? else {
            return Ok(None);
        };
        let metadata = self.get_json(&format!("/library/metadata/{rating_key}")).await?;
        let Some(logo) = metadata["MediaContainer"]["Metadata"]
            .as_array()
            .and_then(|a| a.first())
            .and_then(|i| i["Image"].as_array())
            .and_then(|images| images.iter().find(|img| img["type"].as_str() == Some("clearLogo")))
            .and_then(|img| img["url"].as_str())
        else {
            return Ok(None);
        };
        self.fetch_resource_path(logo).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_guid_schemes() {
        assert_eq!(parse_guid("imdb://tt0903747"), Some((SourceKind::Imdb, "tt0903747")));
        assert_eq!(parse_guid("tvdb://81189"), Some((SourceKind::Tvdb, "81189")));
        assert_eq!(parse_guid("tmdb://1396"), Some((SourceKind::Tmdb, "1396")));
    }

    #[test]
    fn ignores_unknown_guid_schemes() {
        assert_eq!(parse_guid("plex://abc123"), None);
        assert_eq!(parse_guid("not-a-guid"), None);
    }
}
