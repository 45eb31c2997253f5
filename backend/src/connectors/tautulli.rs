//! Tautulli connector (§4.2): Plex playback-history companion used
//! only as a `WatchStateSource`. Authenticates via an `apikey` query
//! parameter against its own REST API (distinct from the Plex
//! connection it reports on).

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::connectors::retry::retry_with_backoff;
use crate::connectors::{build_http_client, Connector, WatchStateSource};
use crate::error::{classify_status, Result, TcmError};
use crate::model::{Connection, ConnectionKind, EpisodeInfo, SeriesInfo, WatchedStatus};

pub struct TautulliConnector {
    connection: Connection,
    client: reqwest::Client,
    active: AtomicBool,
}

impl TautulliConnector {
    pub fn new(connection: Connection) -> Result<Self> {
        let client = build_http_client(&connection).map_err(|e| TcmError::Other(e.into()))?;
        Ok(Self { connection, client, active: AtomicBool::new(false) })
    }

    fn base_url(&self) -> Result<&str> {
        self.connection.url.as_deref().ok_or_else(|| TcmError::InvalidRecipe("missing Tautulli URL".into()))
    }

    fn api_key(&self) -> &str {
        &self.connection.credential
    }

    pub async fn activate(&self) -> Result<()> {
        let url = format!("{}/api/v2", self.base_url()?.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", self.api_key()), ("cmd", "get_server_friendly_name")])
            .send()
            .await
            .map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            self.active.store(false, Ordering::SeqCst);
            return Err(classify_status(status, &body));
        }
        let body: Value = response.json().await.map_err(|e| TcmError::Other(e.into()))?;
        if body["response"]["result"].as_str() != Some("success") {
            self.active.store(false, Ordering::SeqCst);
            return Err(TcmError::AuthError("tautulli rejected api key".into()));
        }
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_history(&self, series: &SeriesInfo) -> Result<Value> {
        let base = self.base_url()?.trim_end_matches('/').to_string();
        let name = series.name.clone();
        retry_with_backoff("tautulli.get_history", || {
            let base = base.clone();
            let name = name.clone();
            async move {
                let url = format!("{base}/api/v2");
                let response = self
                    .client
                    .get(&url)
                    .query(&[("apikey", self.api_key()), ("cmd", "get_history"), ("search", &name), ("media_type", "episode")])
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
}

impl Connector for TautulliConnector {
    fn interface_id(&self) -> i64 {
        self.connection.interface_id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Tautulli
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WatchStateSource for TautulliConnector {
    async fn get_watched_statuses(&self, _library: &str, series: &SeriesInfo, episodes: &[EpisodeInfo]) -> Result<Vec<(EpisodeInfo, WatchedStatus)>> {
        let body = self.get_history(series).await?;
        let rows = body["response"]["data"]["data"].as_array().cloned().unwrap_or_default();

        let mut results = Vec::new();
        for episode in episodes {
            let watched = rows.iter().any(|row| {
                row["parent_media_index"].as_i64() == Some(episode.season_number as i64)
                    && row["media_index"].as_i64() == Some(episode.episode_number as i64)
                    && row["watched_status"].as_i64().unwrap_or(0) >= 1
            });
            results.push((episode.clone(), WatchedStatus::from_bool(watched)));
        }
        Ok(results)
    }
}
