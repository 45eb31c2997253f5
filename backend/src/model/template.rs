//! Templates: reusable, filter-gated Recipe fragments (§3, §4.3).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::episode::Episode;
use crate::model::recipe::Recipe;
use crate::model::series::Series;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: i64,
    pub name: String,
    pub filters: Vec<Filter>,
    pub recipe: Recipe,
}

/// One typed condition in a Template's filter conjunction. Matching a
/// Template means every `Filter` in its set evaluates true; an empty
/// filter set always matches. A Template whose filters fail contributes
/// nothing to resolution (§4.3) rather than erroring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum Filter {
    SeasonEquals { season: i32 },
    EpisodeNumberIn { seasons: Vec<i32>, episodes: Vec<i32> },
    AirdateBefore { date: NaiveDate },
    AirdateAfter { date: NaiveDate },
    Watched { watched: bool },
}

/// Context a Filter is evaluated against: the Series/Episode pair plus
/// the watched flag for the library the recipe is being resolved for
/// (watched status is per-library, not a property of Episode alone).
pub struct FilterContext<'a> {
    pub series: &'a Series,
    pub episode: &'a Episode,
    pub watched: bool,
}

impl Filter {
    pub fn matches(&self, ctx: &FilterContext<'_>) -> bool {
        match self {
            Filter::SeasonEquals { season } => ctx.episode.info.season_number == *season,
            Filter::EpisodeNumberIn { seasons, episodes } => {
                seasons.contains(&ctx.episode.info.season_number)
                    && episodes.contains(&ctx.episode.info.episode_number)
            }
            Filter::AirdateBefore { date } => {
                ctx.episode.info.airdate.map(|d| d < *date).unwrap_or(false)
            }
            Filter::AirdateAfter { date } => {
                ctx.episode.info.airdate.map(|d| d > *date).unwrap_or(false)
            }
            Filter::Watched { watched } => ctx.watched == *watched,
        }
    }
}

impl Template {
    /// Whether every filter in this Template's set matches the context;
    /// an empty set vacuously matches everything.
    pub fn applies(&self, ctx: &FilterContext<'_>) -> bool {
        self.filters.iter().all(|f| f.matches(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::episode_info::EpisodeInfo;
    use crate::model::series_info::SeriesInfo;

    fn ctx() -> (Series, Episode) {
        let series = Series::new(1, SeriesInfo::new("Show", 2020));
        let mut episode = Episode::new(1, 1, EpisodeInfo::new("Pilot", 0, 1));
        episode.info.season_number = 0;
        (series, episode)
    }

    #[test]
    fn empty_filter_set_always_matches() {
        let (series, episode) = ctx();
        let template = Template { id: 1, name: "t".into(), filters: vec![], recipe: Recipe::new() };
        let fctx = FilterContext { series: &series, episode: &episode, watched: false };
        assert!(template.applies(&fctx));
    }

    #[test]
    fn season_filter_gates_applicability() {
        let (series, episode) = ctx();
        let template = Template {
            id: 1,
            name: "specials".into(),
            filters: vec![Filter::SeasonEquals { season: 0 }],
            recipe: Recipe::new(),
        };
        let fctx = FilterContext { series: &series, episode: &episode, watched: false };
        assert!(template.applies(&fctx));

        let mut other_season = episode.clone();
        other_season.info.season_number = 3;
        let fctx2 = FilterContext { series: &series, episode: &other_season, watched: false };
        assert!(!template.applies(&fctx2));
    }
}
