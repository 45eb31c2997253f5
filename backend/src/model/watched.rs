//! Per-library watched state (§3, §4.7).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchedStatus {
    Watched,
    Unwatched,
}

impl WatchedStatus {
    pub fn as_bool(&self) -> bool {
        matches!(self, WatchedStatus::Watched)
    }

    pub fn from_bool(b: bool) -> Self {
        if b { WatchedStatus::Watched } else { WatchedStatus::Unwatched }
    }
}

/// Watched state differs per `(interface_id, library)` pair — the same
/// Episode can be watched on one server's library and not another's.
pub type WatchedMap = BTreeMap<String, WatchedStatus>;
