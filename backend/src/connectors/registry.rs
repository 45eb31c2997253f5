//! Per-capability connector groups (§4.2).
//!
//! Grounded on `indexer::manager::IndexerManager`'s `RwLock<HashMap<Uuid,
//! Arc<dyn Indexer>>>`: connectors are loaded once, held behind `Arc`,
//! and swapped atomically on refresh rather than mutated in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::TcmError;

/// Raised when a connector's construction-time connectivity/auth probe
/// fails (§4.2). The connector is still registered, just inactive,
/// so callers can see *why* rather than finding it silently missing.
#[derive(Debug, thiserror::Error)]
#[error("activation failed for interface {interface_id}: {source}")]
pub struct ActivationError {
    pub interface_id: i64,
    #[source]
    pub source: TcmError,
}

/// A map from `interface_id` to an active connector instance for one
/// capability. "Truthy" (able to serve a request) only when every
/// member reports active.
pub struct InterfaceGroup<T: ?Sized> {
    members: RwLock<BTreeMap<i64, Arc<T>>>,
}

impl<T: ?Sized> Default for InterfaceGroup<T> {
    fn default() -> Self {
        Self { members: RwLock::new(BTreeMap::new()) }
    }
}

impl<T: ?Sized> InterfaceGroup<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace (or insert) a connector atomically. In-flight requests
    /// against the previous `Arc` complete against it undisturbed —
    /// the registry is copy-on-write (§5).
    pub fn put(&self, interface_id: i64, connector: Arc<T>) {
        self.members.write().insert(interface_id, connector);
    }

    pub fn remove(&self, interface_id: i64) {
        self.members.write().remove(&interface_id);
    }

    pub fn get(&self, interface_id: i64) -> Option<Arc<T>> {
        self.members.read().get(&interface_id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<T>> {
        self.members.read().values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }
}

/// Top-level registry: one `InterfaceGroup` per capability (§4.2). A
/// connector implementing more than one capability (e.g. Plex is both
/// an `EpisodeSource` and a `MediaServer`) is registered into each
/// relevant group as a separate trait-object handle over the same
/// underlying instance.
#[derive(Default)]
pub struct ConnectorRegistry {
    pub episode_sources: InterfaceGroup<dyn super::EpisodeSource>,
    pub media_servers: InterfaceGroup<dyn super::MediaServer>,
    pub image_sources: InterfaceGroup<dyn super::ImageSource>,
    pub sync_sources: InterfaceGroup<dyn super::SyncSource>,
    pub watch_state_sources: InterfaceGroup<dyn super::WatchStateSource>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}
