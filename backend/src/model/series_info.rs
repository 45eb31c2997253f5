//! Canonical series identity (§3, §4.1).
//!
//! Grounded on `modules/SeriesInfo2.py`: a `SeriesInfo` is a
//! name/year pair plus an `IdSet`; equality prefers shared IDs and
//! falls back to a case/punctuation-insensitive name match with a
//! year tolerance used to resolve alias titles.

use serde::{Deserialize, Serialize};

use crate::error::TcmError;
use crate::model::ids::{matching_title, IdSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub name: String,
    pub year: i32,
    pub ids: IdSet,
    /// Whether Episode title comparisons should additionally require a
    /// title match (as opposed to `(season, episode)` alone).
    pub match_titles: bool,
}

/// Year tolerance applied when no ID is shared and only the name/year
/// is available — some providers disagree on a series' premiere year by
/// one, e.g. a late-December premiere recorded against the following
/// January by another source.
pub const ALIAS_YEAR_TOLERANCE: i32 = 1;

impl SeriesInfo {
    pub fn new(name: impl Into<String>, year: i32) -> Self {
        Self {
            name: name.into(),
            year,
            ids: IdSet::new(),
            match_titles: true,
        }
    }

    /// `"<name> (<year>)"`, used for folder naming and Blueprint lookup.
    pub fn full_name(&self) -> String {
        format!("{} ({})", self.name, self.year)
    }

    pub fn match_name(&self) -> String {
        matching_title(&self.name)
    }

    /// Folder-safe rendering of `name`, per the Asset Store sanitization
    /// rule (§4.4); delegated to `assets::sanitize` to avoid duplicating
    /// the character map.
    pub fn clean_name(&self) -> String {
        crate::assets::sanitize::sanitize_name(&self.name)
    }

    /// Copy any IDs from `other` that `self` lacks; never overwrites a
    /// populated ID — §4.1 `merge_ids`, §8 ID monotonicity.
    pub fn merge_ids(&mut self, other: &SeriesInfo) -> Result<(), TcmError> {
        self.ids.merge_ids(&other.ids)
    }

    /// Whether any of the given alias titles match this series' name,
    /// via the alphanumeric-lowercased match name.
    pub fn matches_title(&self, names: &[&str]) -> bool {
        let target = self.match_name();
        names.iter().any(|n| matching_title(n) == target)
    }

    /// Equality per §4.1/§3: ID-first, falling back to name + year with
    /// `ALIAS_YEAR_TOLERANCE`. Distinct from `PartialEq` because the
    /// underlying test is asymmetric in cost (ID compare is cheap, name
    /// compare is a string normalization) and callers usually want to
    /// know *why* two infos matched, not just that they did — so this is
    /// exposed as an explicit method rather than operator overloading.
    pub fn identifies_same_series(&self, other: &SeriesInfo) -> bool {
        if self.ids.shares_id_with(&other.ids) {
            return true;
        }

        self.match_name() == other.match_name()
            && (self.year - other.year).abs() <= ALIAS_YEAR_TOLERANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_formats_year() {
        let s = SeriesInfo::new("Breaking Bad", 2008);
        assert_eq!(s.full_name(), "Breaking Bad (2008)");
    }

    #[test]
    fn identifies_same_series_by_name_and_year_tolerance() {
        let a = SeriesInfo::new("Breaking Bad", 2008);
        let b = SeriesInfo::new("breaking-bad", 2009);
        assert!(a.identifies_same_series(&b));

        let c = SeriesInfo::new("breaking-bad", 2011);
        assert!(!a.identifies_same_series(&c));
    }

    #[test]
    fn identifies_same_series_by_shared_id_even_with_different_name() {
        use crate::model::ids::{IdKey, SourceKind};
        let mut a = SeriesInfo::new("Breaking Bad", 2008);
        a.ids.set(IdKey::new(SourceKind::Tvdb, 0), "81189", false).unwrap();

        let mut b = SeriesInfo::new("Breaking Bad (US)", 2008);
        b.ids.set(IdKey::new(SourceKind::Tvdb, 0), "81189", false).unwrap();

        assert!(a.identifies_same_series(&b));
    }
}
