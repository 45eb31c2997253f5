//! Episode source-image selection (§4.4).
//!
//! Three-tier policy: an Episode's manual override, then a Series'
//! ordered media-server priority list, then metadata-provider image
//! search ranked by `(language priority, pixel area, vote average)`.

use std::cmp::Ordering;
use std::path::PathBuf;

use crate::assets::sanitize::sanitize_name;
use crate::error::{Result, TcmError};
use crate::model::{Episode, Series};

/// One candidate image returned by a metadata-provider search.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub language: Option<String>,
    pub vote_average: f64,
}

/// `(media_server_kind, interface_id)` priority entry, tried in order
/// until bytes are returned and pass the minimum size gate.
#[derive(Debug, Clone)]
pub struct PriorityEntry {
    pub interface_id: i64,
}

pub struct MinimumSize {
    pub width: u32,
    pub height: u32,
}

impl MinimumSize {
    pub fn passes(&self, width: u32, height: u32) -> bool {
        width >= self.width && height >= self.height
    }
}

/// Rank candidates by `(language priority, pixel area, vote average)`,
/// highest first. `language_priority` is an ordered list; a candidate
/// whose language is not in the list ranks after every listed language
/// (but still above no candidates at all).
pub fn rank_candidates<'a>(
    candidates: &'a [ImageCandidate],
    language_priority: &[String],
) -> Vec<&'a ImageCandidate> {
    let mut ranked: Vec<&ImageCandidate> = candidates.iter().collect();
    ranked.sort_by(|a, b| {
        let rank_a = language_rank(a.language.as_deref(), language_priority);
        let rank_b = language_rank(b.language.as_deref(), language_priority);
        rank_a
            .cmp(&rank_b)
            .then_with(|| (b.width as u64 * b.height as u64).cmp(&(a.width as u64 * a.height as u64)))
            .then_with(|| {
                b.vote_average
                    .partial_cmp(&a.vote_average)
                    .unwrap_or(Ordering::Equal)
            })
    });
    ranked
}

fn language_rank(language: Option<&str>, priority: &[String]) -> usize {
    match language {
        Some(lang) => priority.iter().position(|p| p == lang).unwrap_or(priority.len()),
        None => priority.len(),
    }
}

/// Source-control path for a downloaded Episode source image:
/// `<source_root>/<sanitized series full name>/s<season>e<episode>.<ext>`.
pub fn episode_source_path(source_root: &std::path::Path, series: &Series, episode: &Episode, ext: &str) -> PathBuf {
    let folder = sanitize_name(&series.info.full_name());
    source_root
        .join(folder)
        .join(format!("s{}e{}.{}", episode.info.season_number, episode.info.episode_number, ext))
}

pub fn series_logo_path(source_root: &std::path::Path, series: &Series) -> PathBuf {
    source_root.join(sanitize_name(&series.info.full_name())).join("logo.png")
}

pub fn series_backdrop_path(source_root: &std::path::Path, series: &Series) -> PathBuf {
    source_root.join(sanitize_name(&series.info.full_name())).join("backdrop.jpg")
}

/// Download `bytes` to `path` idempotently: a partial file from a
/// previous failed attempt is replaced by a successful retry, never
/// left corrupt alongside it.
pub async fn write_idempotent(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TcmError::transient(format!("creating {}: {e}", parent.display())))?;
    }

    let tmp_path = path.with_extension("part");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| TcmError::transient(format!("writing {}: {e}", tmp_path.display())))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| TcmError::transient(format!("renaming into {}: {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lang: &str, w: u32, h: u32, votes: f64) -> ImageCandidate {
        ImageCandidate {
            url: format!("http://example/{lang}"),
            width: w,
            height: h,
            language: Some(lang.to_string()),
            vote_average: votes,
        }
    }

    #[test]
    fn ranks_by_language_priority_first() {
        let candidates = vec![candidate("fr", 4000, 3000, 9.0), candidate("en", 1000, 1000, 1.0)];
        let priority = vec!["en".to_string(), "fr".to_string()];
        let ranked = rank_candidates(&candidates, &priority);
        assert_eq!(ranked[0].language.as_deref(), Some("en"));
    }

    #[test]
    fn ranks_by_pixel_area_when_language_ties() {
        let candidates = vec![candidate("en", 1000, 1000, 9.0), candidate("en", 4000, 3000, 1.0)];
        let priority = vec!["en".to_string()];
        let ranked = rank_candidates(&candidates, &priority);
        assert_eq!(ranked[0].width, 4000);
    }

    #[test]
    fn falls_back_to_vote_average_on_full_tie() {
        let candidates = vec![candidate("en", 1000, 1000, 1.0), candidate("en", 1000, 1000, 9.0)];
        let priority = vec!["en".to_string()];
        let ranked = rank_candidates(&candidates, &priority);
        assert_eq!(ranked[0].vote_average, 9.0);
    }

    #[test]
    fn minimum_size_gate() {
        let gate = MinimumSize { width: 1000, height: 500 };
        assert!(gate.passes(1200, 600));
        assert!(!gate.passes(800, 600));
    }

    #[test]
    fn episode_source_path_is_sanitized_and_shaped() {
        use crate::model::{EpisodeInfo, SeriesInfo};
        let series = Series::new(1, SeriesInfo::new("Law & Order", 1990));
        let episode = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 3));
        let path = episode_source_path(std::path::Path::new("/source"), &series, &episode, "jpg");
        assert_eq!(path, std::path::PathBuf::from("/source/Law & Order (1990)/s1e3.jpg"));
    }
}
