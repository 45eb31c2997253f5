//! Blueprint Port (§4.9): export a Series' entire configuration —
//! itself, its Episode overrides, and every Template/Font it
//! transitively references — as one portable document, and import
//! that document back into a (possibly different) store.
//!
//! Grounded on `resolver::Resolver`'s layered-Recipe model for what
//! "a Series' configuration" even means, and on
//! `assets::source_image::write_idempotent` for the font-file write
//! during import.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assets::source_image::write_idempotent;
use crate::error::{Result, TcmError};
use crate::model::{Font, Recipe, Series, Template};
use crate::store::{EpisodeStore, FontStore, SeriesStore, TemplateStore};

/// One entity's recipe overrides plus its font/template cross-references,
/// expressed as indices into the document's own `fonts`/`templates`
/// arrays rather than database IDs (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintEntity {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub font_id: Option<usize>,
    pub template_ids: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintTemplate {
    pub name: String,
    pub filters: Vec<crate::model::template::Filter>,
    #[serde(flatten)]
    pub recipe: Recipe,
    pub font_id: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintFont {
    pub name: String,
    pub file: Option<String>,
    pub color: Option<String>,
    pub size: f64,
    pub kerning: f64,
    pub stroke_width: f64,
    pub interline_spacing: i32,
    pub vertical_shift: i32,
    pub case_transform: crate::model::font::CaseTransform,
    pub replacements: Vec<(String, String)>,
    pub delete_missing_glyphs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintDocument {
    pub series: BlueprintEntity,
    pub episodes: BTreeMap<String, BlueprintEntity>,
    pub templates: Vec<BlueprintTemplate>,
    pub fonts: Vec<BlueprintFont>,
}

/// A font's bytes travel alongside the document, not inside it — the
/// document is indices-only JSON, the bytes are whatever blob storage
/// the caller already uses to ship the export around.
pub struct ExportedFontFile {
    pub font_index: usize,
    pub bytes: Vec<u8>,
}

pub struct ExportOptions {
    pub include_episodes: bool,
    pub include_global_defaults: bool,
}

pub struct Exporter {
    series: Arc<dyn SeriesStore>,
    episodes: Arc<dyn EpisodeStore>,
    templates: Arc<dyn TemplateStore>,
    fonts: Arc<dyn FontStore>,
    asset_directory: std::path::PathBuf,
}

impl Exporter {
    pub fn new(
        series: Arc<dyn SeriesStore>,
        episodes: Arc<dyn EpisodeStore>,
        templates: Arc<dyn TemplateStore>,
        fonts: Arc<dyn FontStore>,
        asset_directory: std::path::PathBuf,
    ) -> Self {
        Self { series, episodes, templates, fonts, asset_directory }
    }

    pub async fn export(&self, series_id: i64, options: &ExportOptions) -> Result<(BlueprintDocument, Vec<ExportedFontFile>)> {
        let series = self.series.get(series_id).await?.ok_or_else(|| TcmError::NotFound(format!("series {series_id}")))?;

        let mut font_index = BTreeMap::new();
        let mut fonts = Vec::new();
        let mut font_files = Vec::new();

        let mut resolve_font_index = |id: i64, fonts: &mut Vec<Font>, font_index: &mut BTreeMap<i64, usize>, store_fonts: &[Font]| -> Option<usize> {
            if let Some(&idx) = font_index.get(&id) {
                return Some(idx);
            }
            let font = store_fonts.iter().find(|f| f.id == id)?.clone();
            let idx = fonts.len();
            font_index.insert(id, idx);
            fonts.push(font);
            Some(idx)
        };

        let all_fonts = self.fonts.list().await?;
        let mut template_index = BTreeMap::new();
        let mut templates_out = Vec::new();

        let series_font_idx = series.font_id.and_then(|id| resolve_font_index(id, &mut fonts, &mut font_index, &all_fonts));

        let mut series_template_idxs = Vec::new();
        for template_id in &series.template_ids {
            if let Some(&idx) = template_index.get(template_id) {
                series_template_idxs.push(idx);
                continue;
            }
            let Some(template) = self.templates.get(*template_id).await? else { continue };
            let template_font_idx = template.recipe.font_id.and_then(|id| resolve_font_index(id, &mut fonts, &mut font_index, &all_fonts));
            let idx = templates_out.len();
            templates_out.push(BlueprintTemplate {
                name: template.name.clone(),
                filters: template.filters.clone(),
                recipe: template.recipe.clone(),
                font_id: template_font_idx,
            });
            template_index.insert(*template_id, idx);
            series_template_idxs.push(idx);
        }

        let mut series_recipe = series.overrides.clone();
        if !options.include_global_defaults {
            series_recipe.font_id = None;
        }

        let series_entity = BlueprintEntity { recipe: series_recipe, font_id: series_font_idx, template_ids: series_template_idxs };

        let mut episodes_out = BTreeMap::new();
        if options.include_episodes {
            for episode in self.episodes.list_for_series(series_id).await? {
                if episode.deleted {
                    continue;
                }
                let episode_font_idx = episode.font_id.and_then(|id| resolve_font_index(id, &mut fonts, &mut font_index, &all_fonts));

                let mut episode_template_idxs = Vec::new();
                for template_id in &episode.template_ids {
                    if let Some(&idx) = template_index.get(template_id) {
                        episode_template_idxs.push(idx);
                        continue;
                    }
                    let Some(template) = self.templates.get(*template_id).await? else { continue };
                    let template_font_idx = template.recipe.font_id.and_then(|id| resolve_font_index(id, &mut fonts, &mut font_index, &all_fonts));
                    let idx = templates_out.len();
                    templates_out.push(BlueprintTemplate {
                        name: template.name.clone(),
                        filters: template.filters.clone(),
                        recipe: template.recipe.clone(),
                        font_id: template_font_idx,
                    });
                    template_index.insert(*template_id, idx);
                    episode_template_idxs.push(idx);
                }

                episodes_out.insert(
                    episode.info.blueprint_key(),
                    BlueprintEntity { recipe: episode.overrides.clone(), font_id: episode_font_idx, template_ids: episode_template_idxs },
                );
            }
        }

        let mut fonts_out = Vec::with_capacity(fonts.len());
        for (index, font) in fonts.iter().enumerate() {
            fonts_out.push(BlueprintFont {
                name: font.name.clone(),
                file: font.file.as_ref().and_then(|p| std::path::Path::new(p).file_name()).map(|n| n.to_string_lossy().to_string()),
                color: font.color.clone(),
                size: font.size,
                kerning: font.kerning,
                stroke_width: font.stroke_width,
                interline_spacing: font.interline_spacing,
                vertical_shift: font.vertical_shift,
                case_transform: font.case_transform.clone(),
                replacements: font.replacements.clone(),
                delete_missing_glyphs: font.delete_missing_glyphs,
            });
            if let Some(path) = &font.file {
                if let Ok(bytes) = tokio::fs::read(path).await {
                    font_files.push(ExportedFontFile { font_index: index, bytes });
                }
            }
        }

        Ok((BlueprintDocument { series: series_entity, episodes: episodes_out, templates: templates_out, fonts: fonts_out }, font_files))
    }
}

/// Import is transactional at the Series scope (§4.9): every Font and
/// Template this call creates is tracked so a later failure can be
/// rolled back before any Series/Episode write lands.
pub struct Importer {
    series: Arc<dyn SeriesStore>,
    episodes: Arc<dyn EpisodeStore>,
    templates: Arc<dyn TemplateStore>,
    fonts: Arc<dyn FontStore>,
    asset_directory: std::path::PathBuf,
}

struct Rollback {
    fonts: Arc<dyn FontStore>,
    templates: Arc<dyn TemplateStore>,
    created_font_ids: Vec<i64>,
    created_template_ids: Vec<i64>,
}

impl Rollback {
    async fn undo(&self) {
        for id in &self.created_template_ids {
            let _ = self.templates.delete(*id).await;
        }
        for id in &self.created_font_ids {
            let _ = self.fonts.delete(*id).await;
        }
    }
}

impl Importer {
    pub fn new(
        series: Arc<dyn SeriesStore>,
        episodes: Arc<dyn EpisodeStore>,
        templates: Arc<dyn TemplateStore>,
        fonts: Arc<dyn FontStore>,
        asset_directory: std::path::PathBuf,
    ) -> Self {
        Self { series, episodes, templates, fonts, asset_directory }
    }

    /// Validates the document without writing anything. Rejects a
    /// document whose `font_id`/`template_ids` indices are out of
    /// range for its own `fonts`/`templates` arrays.
    pub fn validate(&self, document: &BlueprintDocument) -> Result<()> {
        let check_font = |idx: Option<usize>| -> Result<()> {
            if let Some(idx) = idx {
                if idx >= document.fonts.len() {
                    return Err(TcmError::InvalidRecipe(format!("font index {idx} out of range")));
                }
            }
            Ok(())
        };
        let check_templates = |idxs: &[usize]| -> Result<()> {
            for &idx in idxs {
                if idx >= document.templates.len() {
                    return Err(TcmError::InvalidRecipe(format!("template index {idx} out of range")));
                }
            }
            Ok(())
        };

        check_font(document.series.font_id)?;
        check_templates(&document.series.template_ids)?;
        for template in &document.templates {
            check_font(template.font_id)?;
        }
        for entity in document.episodes.values() {
            check_font(entity.font_id)?;
            check_templates(&entity.template_ids)?;
        }
        Ok(())
    }

    pub async fn import(&self, series_id: i64, document: &BlueprintDocument, font_files: &[ExportedFontFile]) -> Result<Series> {
        self.validate(document)?;

        let mut series = self.series.get(series_id).await?.ok_or_else(|| TcmError::NotFound(format!("series {series_id}")))?;

        let mut rollback =
            Rollback { fonts: self.fonts.clone(), templates: self.templates.clone(), created_font_ids: Vec::new(), created_template_ids: Vec::new() };

        match self.import_inner(&mut series, document, font_files, &mut rollback).await {
            Ok(()) => Ok(series),
            Err(err) => {
                rollback.undo().await;
                Err(err)
            }
        }
    }

    async fn import_inner(&self, series: &mut Series, document: &BlueprintDocument, font_files: &[ExportedFontFile], rollback: &mut Rollback) -> Result<()> {
        let mut new_font_ids = Vec::with_capacity(document.fonts.len());
        for (index, font) in document.fonts.iter().enumerate() {
            let bundled = font_files.iter().find(|f| f.font_index == index);
            let file_path = match (&font.file, bundled) {
                (Some(filename), Some(bundled)) => {
                    let created = self
                        .fonts
                        .upsert(&Font {
                            id: 0,
                            name: font.name.clone(),
                            file: None,
                            color: font.color.clone(),
                            size: font.size,
                            kerning: font.kerning,
                            stroke_width: font.stroke_width,
                            interline_spacing: font.interline_spacing,
                            vertical_shift: font.vertical_shift,
                            case_transform: font.case_transform.clone(),
                            replacements: font.replacements.clone(),
                            delete_missing_glyphs: font.delete_missing_glyphs,
                        })
                        .await?;
                    rollback.created_font_ids.push(created.id);

                    let path = self.asset_directory.join("fonts").join(created.id.to_string()).join(filename);
                    write_idempotent(&path, &bundled.bytes).await?;

                    let mut created = created;
                    created.file = Some(path.display().to_string());
                    self.fonts.upsert(&created).await?;
                    Some(created.id)
                }
                _ => {
                    let created = self
                        .fonts
                        .upsert(&Font {
                            id: 0,
                            name: font.name.clone(),
                            file: None,
                            color: font.color.clone(),
                            size: font.size,
                            kerning: font.kerning,
                            stroke_width: font.stroke_width,
                            interline_spacing: font.interline_spacing,
                            vertical_shift: font.vertical_shift,
                            case_transform: font.case_transform.clone(),
                            replacements: font.replacements.clone(),
                            delete_missing_glyphs: font.delete_missing_glyphs,
                        })
                        .await?;
                    rollback.created_font_ids.push(created.id);
                    Some(created.id)
                }
            };
            new_font_ids.push(file_path.expect("font id always assigned above"));
        }

        let mut new_template_ids = Vec::with_capacity(document.templates.len());
        for template in &document.templates {
            let mut recipe = template.recipe.clone();
            recipe.font_id = template.font_id.map(|idx| new_font_ids[idx]);
            let created = self.templates.upsert(&Template { id: 0, name: template.name.clone(), filters: template.filters.clone(), recipe }).await?;
            rollback.created_template_ids.push(created.id);
            new_template_ids.push(created.id);
        }

        let mut change_log = Vec::new();
        let mut series_recipe = document.series.recipe.clone();
        series_recipe.font_id = document.series.font_id.map(|idx| new_font_ids[idx]);
        if series.overrides != series_recipe {
            change_log.push("series overrides updated".to_string());
            series.overrides = series_recipe;
        }
        let new_series_template_ids: Vec<i64> = document.series.template_ids.iter().map(|&idx| new_template_ids[idx]).collect();
        if series.template_ids != new_series_template_ids {
            change_log.push("series template_ids updated".to_string());
            series.template_ids = new_series_template_ids;
        }
        let new_series_font_id = document.series.font_id.map(|idx| new_font_ids[idx]);
        if series.font_id != new_series_font_id {
            change_log.push("series font_id updated".to_string());
            series.font_id = new_series_font_id;
        }
        if !change_log.is_empty() {
            tracing::info!(series_id = series.id, changes = ?change_log, "blueprint import updated series");
        }
        self.series.upsert(series).await?;

        let existing_episodes = self.episodes.list_for_series(series.id).await?;
        for (blueprint_key, entity) in &document.episodes {
            let Some(mut episode) = existing_episodes.iter().find(|e| e.info.blueprint_key() == *blueprint_key).cloned() else {
                tracing::warn!(series_id = series.id, key = blueprint_key, "blueprint import skipped unknown episode");
                continue;
            };

            let mut recipe = entity.recipe.clone();
            recipe.font_id = entity.font_id.map(|idx| new_font_ids[idx]);
            episode.overrides = recipe;
            episode.font_id = entity.font_id.map(|idx| new_font_ids[idx]);
            episode.template_ids = entity.template_ids.iter().map(|&idx| new_template_ids[idx]).collect();
            self.episodes.upsert(&episode).await?;
        }

        Ok(())
    }
}
