//! Canonical episode identity (§3, §4.1).
//!
//! Grounded on `backend/modules/Episode.py` / `modules/EpisodeInfo2.py`:
//! an `EpisodeInfo` carries the series it belongs to plus season/episode
//! numbers, an optional absolute number and airdate, and its own
//! `IdSet`. Equality is ID-first, then falls back to `(season, episode)`
//! within the same series, optionally also requiring a title match.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::TcmError;
use crate::model::ids::IdSet;
use crate::model::series_info::SeriesInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub title: String,
    pub season_number: i32,
    pub episode_number: i32,
    pub absolute_number: Option<i32>,
    pub airdate: Option<NaiveDate>,
    pub ids: IdSet,
}

/// Titles that never count as real episode titles, regardless of data
/// source — `SonarrInterface2.py`'s `__ALWAYS_IGNORE_REGEX`.
pub(crate) fn always_placeholder(title: &str) -> bool {
    let t = title.trim().to_ascii_lowercase();
    t == "tba" || t == "tbd"
}

/// Titles that look like a placeholder *for now* — generic "Episode N"
/// titles a provider emits before the real title airs.
/// `SonarrInterface2.py`'s `__TEMP_IGNORE_REGEX`. Per SPEC_FULL §C this
/// is resolved to "re-evaluated next sync" rather than a literal 48h
/// timer, so the caller (refresh_episodes) re-checks on every firing;
/// this function only classifies the current value.
pub fn is_placeholder_title(title: &str) -> bool {
    if always_placeholder(title) {
        return true;
    }
    let t = title.trim().to_ascii_lowercase();
    t == "tba"
        || t == "tbd"
        || regex_episode_n().is_match(&t)
}

fn regex_episode_n() -> &'static regex::Regex {
    static RE: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"^episode \d+$").unwrap());
    &RE
}

impl EpisodeInfo {
    pub fn new(title: impl Into<String>, season_number: i32, episode_number: i32) -> Self {
        Self {
            title: title.into(),
            season_number,
            episode_number,
            absolute_number: None,
            airdate: None,
            ids: IdSet::new(),
        }
    }

    pub fn merge_ids(&mut self, other: &EpisodeInfo) -> Result<(), TcmError> {
        self.ids.merge_ids(&other.ids)
    }

    /// Equality per §4.1: ID-first, else `(season, episode)` within the
    /// same series, optionally requiring a title match when the owning
    /// series configures `match_titles`.
    pub fn identifies_same_episode(&self, other: &EpisodeInfo, series: &SeriesInfo) -> bool {
        if self.ids.shares_id_with(&other.ids) {
            return true;
        }

        let same_index =
            self.season_number == other.season_number && self.episode_number == other.episode_number;

        if !same_index {
            return false;
        }

        if series.match_titles {
            crate::model::ids::matching_title(&self.title) == crate::model::ids::matching_title(&other.title)
        } else {
            true
        }
    }

    /// `"s<season>e<episode>"` key used by Blueprint episode overrides
    /// (§6) and by `EPISODE_REGEX` in `app/internal/blueprint.py`.
    pub fn blueprint_key(&self) -> String {
        format!("s{}e{}", self.season_number, self.episode_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_titles_are_detected() {
        assert!(is_placeholder_title("TBA"));
        assert!(is_placeholder_title("tbd"));
        assert!(is_placeholder_title("Episode 12"));
        assert!(!is_placeholder_title("Pilot"));
    }

    #[test]
    fn identifies_same_episode_by_index_when_titles_dont_matter() {
        let mut series = SeriesInfo::new("Show", 2020);
        series.match_titles = false;
        let a = EpisodeInfo::new("Alpha", 1, 1);
        let b = EpisodeInfo::new("Beta", 1, 1);
        assert!(a.identifies_same_episode(&b, &series));
    }

    #[test]
    fn identifies_same_episode_requires_title_when_configured() {
        let series = SeriesInfo::new("Show", 2020);
        let a = EpisodeInfo::new("Alpha", 1, 1);
        let b = EpisodeInfo::new("Beta", 1, 1);
        assert!(!a.identifies_same_episode(&b, &series));
    }

    #[test]
    fn blueprint_key_formats_season_episode() {
        let e = EpisodeInfo::new("Pilot", 1, 3);
        assert_eq!(e.blueprint_key(), "s1e3");
    }
}
