//! Connection configuration entities (§3, §4.2).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Emby,
    Jellyfin,
    Plex,
    Sonarr,
    Tmdb,
    Tvdb,
    Tautulli,
}

impl ConnectionKind {
    pub fn is_media_server(&self) -> bool {
        matches!(self, ConnectionKind::Emby | ConnectionKind::Jellyfin | ConnectionKind::Plex)
    }

    pub fn is_episode_source(&self) -> bool {
        matches!(
            self,
            ConnectionKind::Emby
                | ConnectionKind::Jellyfin
                | ConnectionKind::Plex
                | ConnectionKind::Sonarr
        )
    }

    pub fn is_image_source(&self) -> bool {
        matches!(
            self,
            ConnectionKind::Emby | ConnectionKind::Jellyfin | ConnectionKind::Plex | ConnectionKind::Tmdb
        )
    }

    pub fn is_sync_source(&self) -> bool {
        matches!(
            self,
            ConnectionKind::Emby | ConnectionKind::Jellyfin | ConnectionKind::Plex | ConnectionKind::Sonarr
        )
    }
}

/// Library allow/deny filtering plus tag filtering applied during a
/// media-server sync (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncFilter {
    pub required_libraries: Vec<String>,
    pub excluded_libraries: Vec<String>,
    pub required_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
}

/// A configured remote endpoint. `interface_id` is the stable numeric
/// identity referenced by every entity ID key (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub interface_id: i64,
    pub kind: ConnectionKind,
    pub name: String,
    pub url: Option<String>,
    /// Decrypted at load time from the store's encrypted-at-rest column;
    /// never logged or serialized back out (see `store::sqlite`'s use
    /// of `aes-gcm` for the at-rest encryption).
    #[serde(skip_serializing)]
    pub credential: String,
    pub verify_ssl: bool,
    pub filesize_limit_bytes: Option<u64>,
    pub watched_user: Option<String>,
    pub sync_filter: SyncFilter,
    /// TMDb/TVDb language priority list governing artwork scoring.
    pub language_priority: Vec<String>,
    pub enabled: bool,
}

impl Connection {
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(30)
    }

    pub fn full_sync_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(240)
    }

    /// Sonarr's URL must end in `/api/v3/`; other kinds are used as-is.
    /// Grounded on `SonarrInterface2.py.__init__`'s URL normalization.
    pub fn normalized_url(&self) -> Option<String> {
        let url = self.url.as_ref()?;
        if self.kind != ConnectionKind::Sonarr {
            return Some(url.clone());
        }

        let url = if url.ends_with('/') { url.clone() } else { format!("{url}/") };
        if url.ends_with("/api/v3/") {
            Some(url)
        } else {
            Some(format!("{url}api/v3/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(kind: ConnectionKind, url: &str) -> Connection {
        Connection {
            interface_id: 0,
            kind,
            name: "test".into(),
            url: Some(url.into()),
            credential: "secret".into(),
            verify_ssl: true,
            filesize_limit_bytes: None,
            watched_user: None,
            sync_filter: SyncFilter::default(),
            language_priority: vec![],
            enabled: true,
        }
    }

    #[test]
    fn sonarr_url_gets_api_suffix() {
        let c = conn(ConnectionKind::Sonarr, "http://sonarr:8989");
        assert_eq!(c.normalized_url().unwrap(), "http://sonarr:8989/api/v3/");
    }

    #[test]
    fn sonarr_url_already_normalized_is_untouched() {
        let c = conn(ConnectionKind::Sonarr, "http://sonarr:8989/api/v3/");
        assert_eq!(c.normalized_url().unwrap(), "http://sonarr:8989/api/v3/");
    }

    #[test]
    fn non_sonarr_url_is_untouched() {
        let c = conn(ConnectionKind::Plex, "http://plex:32400");
        assert_eq!(c.normalized_url().unwrap(), "http://plex:32400");
    }
}
