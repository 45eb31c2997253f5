//! Episode entity (§3).

use serde::{Deserialize, Serialize};

use crate::model::episode_info::EpisodeInfo;
use crate::model::recipe::Recipe;
use crate::model::watched::WatchedMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    pub series_id: i64,
    pub info: EpisodeInfo,
    pub watched: WatchedMap,
    /// Path (local or remote URL) to the chosen source image, once
    /// selected by the Asset Store (§4.4).
    pub source_image: Option<String>,
    pub template_ids: Vec<i64>,
    pub font_id: Option<i64>,
    /// Episode-level recipe overrides (layer 4 of §4.3, highest
    /// precedence).
    pub overrides: Recipe,
    /// Number of consecutive syncs in which this Episode was absent
    /// from every connected source; soft-deleted at `N` per §3.
    pub missing_sync_count: u32,
    pub deleted: bool,
}

/// Number of consecutive absent syncs before an Episode is soft-deleted.
pub const MISSING_SYNC_THRESHOLD: u32 = 3;

impl Episode {
    pub fn new(id: i64, series_id: i64, info: EpisodeInfo) -> Self {
        Self {
            id,
            series_id,
            info,
            watched: WatchedMap::new(),
            source_image: None,
            template_ids: vec![],
            font_id: None,
            overrides: Recipe::new(),
            missing_sync_count: 0,
            deleted: false,
        }
    }

    /// Ordering key for ascending `(season, episode)` processing within
    /// a Series (§5 ordering guarantees).
    pub fn sort_key(&self) -> (i32, i32) {
        (self.info.season_number, self.info.episode_number)
    }

    pub fn mark_seen(&mut self) {
        self.missing_sync_count = 0;
    }

    pub fn mark_missing(&mut self) {
        self.missing_sync_count += 1;
        if self.missing_sync_count >= MISSING_SYNC_THRESHOLD {
            self.deleted = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::episode_info::EpisodeInfo;

    #[test]
    fn soft_deletes_after_threshold_consecutive_misses() {
        let mut e = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 1));
        for _ in 0..MISSING_SYNC_THRESHOLD - 1 {
            e.mark_missing();
            assert!(!e.deleted);
        }
        e.mark_missing();
        assert!(e.deleted);
    }

    #[test]
    fn seeing_again_resets_miss_count() {
        let mut e = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 1));
        e.mark_missing();
        e.mark_missing();
        e.mark_seen();
        assert_eq!(e.missing_sync_count, 0);
    }
}
