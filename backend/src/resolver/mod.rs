//! Settings Resolver (§4.3): merges global ⊕ templates ⊕ series ⊕
//! episode into a fully materialized render Recipe, and resolves
//! per-episode title translations through an image-source connector.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::connectors::ImageSource;
use crate::error::Result;
use crate::model::episode_info::is_placeholder_title;
use crate::model::{Episode, Font, Recipe, Series};
use crate::model::template::FilterContext;
use crate::store::{FontStore, TemplateStore, TranslationBackoffStore};

pub mod font;

pub use font::EffectiveFont;

pub struct Resolver {
    templates: Arc<dyn TemplateStore>,
    fonts: Arc<dyn FontStore>,
    translation_backoff: Arc<dyn TranslationBackoffStore>,
    global_recipe: Recipe,
    translation_backoff_window: Duration,
}

impl Resolver {
    pub fn new(
        templates: Arc<dyn TemplateStore>,
        fonts: Arc<dyn FontStore>,
        translation_backoff: Arc<dyn TranslationBackoffStore>,
        global_recipe: Recipe,
        translation_backoff_window: Duration,
    ) -> Self {
        Self { templates, fonts, translation_backoff, global_recipe, translation_backoff_window }
    }

    /// Merge layer 1 (global) through layer 4 (episode overrides),
    /// skipping any Template whose filters don't match (§4.3). Templates
    /// attached to the Series are applied before those attached to the
    /// Episode, each in its own declared order, since both still sit
    /// below the Series/Episode override layers in precedence.
    pub async fn resolve_recipe(&self, series: &Series, episode: &Episode, watched: bool) -> Result<Recipe> {
        let mut recipe = self.global_recipe.clone();

        let fctx = FilterContext { series, episode, watched };
        for template_id in series.template_ids.iter().chain(episode.template_ids.iter()) {
            let Some(template) = self.templates.get(*template_id).await? else {
                continue;
            };
            if template.applies(&fctx) {
                recipe.merge_from(&template.recipe);
            }
        }

        if let Some(font_id) = series.font_id {
            recipe.merge_from(&Recipe { font_id: Some(font_id), ..Recipe::new() });
        }
        recipe.merge_from(&series.overrides);

        if let Some(font_id) = episode.font_id {
            recipe.merge_from(&Recipe { font_id: Some(font_id), ..Recipe::new() });
        }
        recipe.merge_from(&episode.overrides);

        Ok(recipe)
    }

    /// Load the Font entity `recipe.font_id` names, if any.
    pub async fn resolve_font(&self, recipe: &Recipe) -> Result<Option<Font>> {
        match recipe.font_id {
            Some(id) => self.fonts.get(id).await,
            None => Ok(None),
        }
    }

    /// Effective font styling: the named Font's values with any
    /// Recipe-level overrides (`font_color`, `font_size`, ...) applied
    /// on top, per §4.3's "recognized options" list.
    pub async fn resolve_effective_font(&self, recipe: &Recipe) -> Result<EffectiveFont> {
        let font = self.resolve_font(recipe).await?;
        Ok(font::EffectiveFont::resolve(font.as_ref(), recipe))
    }

    /// Resolve every `{data_key -> language_code}` translation request
    /// in `recipe.translations` through `source`, honoring per-episode
    /// back-off for titles previously rejected as "generic" (§4.3).
    pub async fn resolve_translations(
        &self,
        recipe: &Recipe,
        episode: &Episode,
        series: &Series,
        source: &dyn ImageSource,
    ) -> Result<BTreeMap<String, String>> {
        let mut resolved = BTreeMap::new();
        let Some(requests) = recipe.translations.as_ref() else {
            return Ok(resolved);
        };

        for (data_key, language_code) in requests {
            if self.translation_backoff.is_backed_off(episode.id, language_code).await? {
                continue;
            }

            let Some(title) = source.get_episode_title(&series.info, &episode.info, language_code).await? else {
                continue;
            };

            if is_placeholder_title(&title) {
                let window = chrono::Duration::from_std(self.translation_backoff_window).unwrap_or(chrono::Duration::zero());
                self.translation_backoff.record_rejection(episode.id, language_code, Utc::now() + window).await?;
                continue;
            }

            resolved.insert(data_key.clone(), title);
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EpisodeInfo, SeriesInfo};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeTemplateStore(Vec<crate::model::Template>);

    #[async_trait]
    impl TemplateStore for FakeTemplateStore {
        async fn get(&self, id: i64) -> Result<Option<crate::model::Template>> {
            Ok(self.0.iter().find(|t| t.id == id).cloned())
        }
        async fn list(&self) -> Result<Vec<crate::model::Template>> {
            Ok(self.0.clone())
        }
        async fn upsert(&self, template: &crate::model::Template) -> Result<crate::model::Template> {
            Ok(template.clone())
        }
        async fn delete(&self, _id: i64) -> Result<()> {
            Ok(())
        }
    }

    struct FakeFontStore;

    #[async_trait]
    impl FontStore for FakeFontStore {
        async fn get(&self, _id: i64) -> Result<Option<Font>> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<Font>> {
            Ok(vec![])
        }
        async fn upsert(&self, font: &Font) -> Result<Font> {
            Ok(font.clone())
        }
        async fn delete(&self, _id: i64) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeBackoffStore(Mutex<Vec<(i64, String)>>);

    #[async_trait]
    impl TranslationBackoffStore for FakeBackoffStore {
        async fn is_backed_off(&self, episode_id: i64, language_code: &str) -> Result<bool> {
            Ok(self.0.lock().unwrap().iter().any(|(e, l)| *e == episode_id && l == language_code))
        }
        async fn record_rejection(&self, episode_id: i64, language_code: &str, _until: chrono::DateTime<Utc>) -> Result<()> {
            self.0.lock().unwrap().push((episode_id, language_code.to_string()));
            Ok(())
        }
    }

    fn resolver(templates: Vec<crate::model::Template>) -> Resolver {
        Resolver::new(
            Arc::new(FakeTemplateStore(templates)),
            Arc::new(FakeFontStore),
            Arc::new(FakeBackoffStore::default()),
            Recipe { watched_style: Some("unique".into()), ..Recipe::new() },
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn series_overrides_beat_templates_which_beat_global() {
        let template = crate::model::Template {
            id: 1,
            name: "t".into(),
            filters: vec![],
            recipe: Recipe { watched_style: Some("template".into()), ..Recipe::new() },
        };
        let r = resolver(vec![template]);

        let mut series = Series::new(1, SeriesInfo::new("Show", 2020));
        series.template_ids = vec![1];
        series.overrides = Recipe { title_text: Some("Series Title".into()), ..Recipe::new() };

        let episode = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 1));

        let recipe = r.resolve_recipe(&series, &episode, false).await.unwrap();
        assert_eq!(recipe.watched_style.as_deref(), Some("template"));
        assert_eq!(recipe.title_text.as_deref(), Some("Series Title"));
    }

    #[tokio::test]
    async fn episode_overrides_win_over_series_overrides() {
        let r = resolver(vec![]);

        let mut series = Series::new(1, SeriesInfo::new("Show", 2020));
        series.overrides = Recipe { title_text: Some("Series".into()), ..Recipe::new() };

        let mut episode = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 1));
        episode.overrides = Recipe { title_text: Some("Episode".into()), ..Recipe::new() };

        let recipe = r.resolve_recipe(&series, &episode, false).await.unwrap();
        assert_eq!(recipe.title_text.as_deref(), Some("Episode"));
    }

    #[tokio::test]
    async fn non_matching_template_filter_contributes_nothing() {
        let template = crate::model::Template {
            id: 1,
            name: "specials-only".into(),
            filters: vec![crate::model::template::Filter::SeasonEquals { season: 0 }],
            recipe: Recipe { title_text: Some("Specials".into()), ..Recipe::new() },
        };
        let r = resolver(vec![template]);

        let mut series = Series::new(1, SeriesInfo::new("Show", 2020));
        series.template_ids = vec![1];
        let episode = Episode::new(1, 1, EpisodeInfo::new("Pilot", 1, 1));

        let recipe = r.resolve_recipe(&series, &episode, false).await.unwrap();
        assert_eq!(recipe.title_text, None);
    }
}
