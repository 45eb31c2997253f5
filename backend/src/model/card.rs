//! Built artifacts (§3, §4.5, §6).

use serde::{Deserialize, Serialize};

/// Stable hash of a Recipe plus input-asset content (§4.5, §6).
/// `v1:` today; any semantic change to fingerprinting must bump this
/// prefix so stale on-disk fingerprints are never mistaken for fresh
/// ones after a format change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub const VERSION_PREFIX: &'static str = "v1:";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub episode_id: i64,
    pub library: String,
    pub file_path: String,
    pub file_size: u64,
    pub fingerprint: Fingerprint,
    /// The JSON-serialized Recipe that produced this Card (§3 invariant).
    pub recipe_json: String,
}
