//! Foreign-ID bookkeeping shared by `SeriesInfo` and `EpisodeInfo` (§4.1).
//!
//! Grounded on `modules/DatabaseInfoContainer.py` and
//! `modules/SeriesInfo2.py`'s `InterfaceID` fields: an ID is either
//! unset or set, and once set is immutable except by an explicit
//! re-query that proves it changed. Unlike the original, which keys
//! IDs by attribute name on an `__slots__` struct, this models the
//! general `(kind, instance[, library])` key directly so the same code
//! serves Series and Episode ID sets.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TcmError;

/// A source of identity: either a metadata provider or a media server
/// instance. Mirrors the `source_kind` values named in spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Imdb,
    Tmdb,
    Tvdb,
    TvRage,
    Emby,
    Jellyfin,
    Plex,
    Sonarr,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceKind::Imdb => "imdb",
            SourceKind::Tmdb => "tmdb",
            SourceKind::Tvdb => "tvdb",
            SourceKind::TvRage => "tvrage",
            SourceKind::Emby => "emby",
            SourceKind::Jellyfin => "jellyfin",
            SourceKind::Plex => "plex",
            SourceKind::Sonarr => "sonarr",
        };
        f.write_str(s)
    }
}

/// Key for one foreign ID slot: `(kind, instance_id[, library])`.
///
/// `instance_id` is the `interface_id` of the owning Connection (always
/// present); `library` namespaces IDs that are only stable within one
/// library of that instance (Plex/Emby/Jellyfin GUIDs are instance-wide,
/// but Sonarr's own numeric ID is effectively per-root-folder in some
/// multi-instance setups, so the more specific key is supported
/// generally rather than special-cased per kind).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdKey {
    pub kind: SourceKind,
    pub instance_id: i64,
    pub library: Option<String>,
}

impl IdKey {
    pub fn new(kind: SourceKind, instance_id: i64) -> Self {
        Self { kind, instance_id, library: None }
    }

    pub fn with_library(kind: SourceKind, instance_id: i64, library: impl Into<String>) -> Self {
        Self { kind, instance_id, library: Some(library.into()) }
    }

    /// Specificity rank used by reconciliation tie-breaks: more specific
    /// wins — `(kind, instance, library)` > `(kind, instance)` > `(kind)`.
    fn specificity(&self) -> u8 {
        if self.library.is_some() { 2 } else { 1 }
    }
}

/// A set of foreign IDs keyed by `(kind, instance[, library])`, plus the
/// handful of IDs that are instance-independent (IMDb/TMDb/TVDb/TVRage —
/// a metadata-provider ID does not vary per Connection instance the way
/// an Emby/Jellyfin/Plex/Sonarr library-server ID can).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdSet {
    /// Instance-scoped IDs (Emby, Jellyfin, Plex, Sonarr).
    scoped: BTreeMap<IdKey, String>,
    /// Global metadata-provider IDs (IMDb, TMDb, TVDb, TVRage), one slot
    /// per kind since these do not vary across Connection instances.
    global: BTreeMap<SourceKind, String>,
}

const GLOBAL_KINDS: [SourceKind; 4] =
    [SourceKind::Imdb, SourceKind::Tmdb, SourceKind::Tvdb, SourceKind::TvRage];

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_global(&self, kind: SourceKind) -> Option<&str> {
        self.global.get(&kind).map(|s| s.as_str())
    }

    pub fn get_scoped(&self, key: &IdKey) -> Option<&str> {
        self.scoped.get(key).map(|s| s.as_str())
    }

    /// Set an ID, honoring immutability: a non-empty existing value is
    /// never silently overwritten. Returns `Err(Conflict)` when the new
    /// value disagrees with an existing non-empty one; `force` bypasses
    /// this for the "explicit re-query proved it changed" case in §4.1.
    pub fn set(&mut self, key: IdKey, value: impl Into<String>, force: bool) -> Result<(), TcmError> {
        let value = value.into();
        if value.is_empty() {
            return Ok(());
        }

        if GLOBAL_KINDS.contains(&key.kind) && key.library.is_none() {
            return self.set_global(key.kind, value, force);
        }

        match self.scoped.get(&key) {
            Some(existing) if existing == &value => Ok(()),
            Some(existing) if !force => Err(TcmError::Conflict {
                kind: kind_name(key.kind),
                local: existing.clone(),
                remote: value,
            }),
            _ => {
                self.scoped.insert(key, value);
                Ok(())
            }
        }
    }

    fn set_global(&mut self, kind: SourceKind, value: String, force: bool) -> Result<(), TcmError> {
        match self.global.get(&kind) {
            Some(existing) if existing == &value => Ok(()),
            Some(existing) if !force => Err(TcmError::Conflict {
                kind: kind_name(kind),
                local: existing.clone(),
                remote: value,
            }),
            _ => {
                self.global.insert(kind, value);
                Ok(())
            }
        }
    }

    /// Copy any IDs from `other` that `self` lacks. Never overwrites a
    /// non-empty ID in `self` — see §8's *ID monotonicity* law.
    pub fn merge_ids(&mut self, other: &IdSet) -> Result<(), TcmError> {
        for (kind, value) in &other.global {
            if !self.global.contains_key(kind) {
                self.global.insert(*kind, value.clone());
            }
        }

        for (key, value) in &other.scoped {
            if !self.scoped.contains_key(key) {
                self.scoped.insert(key.clone(), value.clone());
            }
        }

        Ok(())
    }

    /// True if any ID this set holds matches the other set's ID for the
    /// same key, honoring the specificity tie-break (§4.1): the most
    /// specific shared key that both sets define decides the match.
    pub fn shares_id_with(&self, other: &IdSet) -> bool {
        for (kind, value) in &self.global {
            if other.global.get(kind) == Some(value) {
                return true;
            }
        }

        let mut best: Option<(u8, bool)> = None;
        for (key, value) in &self.scoped {
            if let Some(other_value) = other.scoped.get(key) {
                let matches = other_value == value;
                let spec = key.specificity();
                best = Some(match best {
                    Some((s, m)) if s >= spec => (s, m),
                    _ => (spec, matches),
                });
            }
        }

        matches!(best, Some((_, true)))
    }

    pub fn is_empty(&self) -> bool {
        self.scoped.is_empty() && self.global.is_empty()
    }
}

fn kind_name(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Imdb => "imdb_id",
        SourceKind::Tmdb => "tmdb_id",
        SourceKind::Tvdb => "tvdb_id",
        SourceKind::TvRage => "tvrage_id",
        SourceKind::Emby => "emby_id",
        SourceKind::Jellyfin => "jellyfin_id",
        SourceKind::Plex => "plex_id",
        SourceKind::Sonarr => "sonarr_id",
    }
}

/// Alphanumerics-only, lowercased "match name" used for title-driven
/// equality — `modules/SeriesInfo2.py::get_matching_title`.
pub fn matching_title(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_never_overwrites_existing_id() {
        let mut a = IdSet::new();
        a.set(IdKey::new(SourceKind::Tvdb, 0), "100", false).unwrap();

        let mut b = IdSet::new();
        b.set(IdKey::new(SourceKind::Tvdb, 0), "999", false).unwrap();
        b.set(IdKey::new(SourceKind::Imdb, 0), "tt123", false).unwrap();

        a.merge_ids(&b).unwrap();

        assert_eq!(a.get_global(SourceKind::Tvdb), Some("100"));
        assert_eq!(a.get_global(SourceKind::Imdb), Some("tt123"));
    }

    #[test]
    fn conflicting_set_without_force_errors() {
        let mut a = IdSet::new();
        a.set(IdKey::new(SourceKind::Tvdb, 0), "100", false).unwrap();
        let err = a.set(IdKey::new(SourceKind::Tvdb, 0), "200", false).unwrap_err();
        assert!(matches!(err, TcmError::Conflict { .. }));
    }

    #[test]
    fn matching_title_strips_punctuation_and_case() {
        assert_eq!(matching_title("Breaking Bad!"), "breakingbad");
        assert_eq!(matching_title("Breaking Bad!"), matching_title("breaking-bad"));
    }

    #[test]
    fn shares_id_prefers_more_specific_key() {
        let mut a = IdSet::new();
        a.set(IdKey::new(SourceKind::Emby, 1), "abc", false).unwrap();
        a.set(IdKey::with_library(SourceKind::Emby, 1, "Shows"), "xyz", false).unwrap();

        let mut b = IdSet::new();
        b.set(IdKey::new(SourceKind::Emby, 1), "abc", false).unwrap();
        b.set(IdKey::with_library(SourceKind::Emby, 1, "Shows"), "different", false).unwrap();

        // The library-scoped key is more specific and disagrees, so it
        // decides the match even though the coarser key agrees.
        assert!(!a.shares_id_with(&b));
    }
}
