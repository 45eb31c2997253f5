//! Effective font styling: a named `Font`'s values with any
//! Recipe-level overrides applied on top (§4.3).

use crate::model::{Font, Recipe};

#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveFont {
    pub file: Option<String>,
    pub color: Option<String>,
    pub size: f64,
    pub kerning: f64,
    pub stroke_width: f64,
    pub interline_spacing: i32,
    pub interword_spacing: i32,
    pub vertical_shift: i32,
}

impl Default for EffectiveFont {
    fn default() -> Self {
        Self {
            file: None,
            color: None,
            size: 1.0,
            kerning: 0.0,
            stroke_width: 1.0,
            interline_spacing: 0,
            interword_spacing: 0,
            vertical_shift: 0,
        }
    }
}

impl EffectiveFont {
    pub fn resolve(font: Option<&Font>, recipe: &Recipe) -> Self {
        let mut effective = match font {
            Some(font) => Self {
                file: font.file.clone(),
                color: font.color.clone(),
                size: font.size,
                kerning: font.kerning,
                stroke_width: font.stroke_width,
                interline_spacing: font.interline_spacing,
                interword_spacing: 0,
                vertical_shift: font.vertical_shift,
            },
            None => Self::default(),
        };

        if let Some(color) = &recipe.font_color {
            effective.color = Some(color.clone());
        }
        if let Some(size) = recipe.font_size {
            effective.size = size;
        }
        if let Some(kerning) = recipe.font_kerning {
            effective.kerning = kerning;
        }
        if let Some(stroke_width) = recipe.font_stroke_width {
            effective.stroke_width = stroke_width;
        }
        if let Some(interline) = recipe.font_interline_spacing {
            effective.interline_spacing = interline;
        }
        if let Some(interword) = recipe.font_interword_spacing {
            effective.interword_spacing = interword;
        }
        if let Some(shift) = recipe.font_vertical_shift {
            effective.vertical_shift = shift;
        }

        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::font::CaseTransform;

    fn font() -> Font {
        Font {
            id: 1,
            name: "Base".into(),
            file: Some("Base.ttf".into()),
            color: Some("#FFFFFF".into()),
            size: 1.0,
            kerning: 0.0,
            stroke_width: 1.0,
            interline_spacing: 0,
            vertical_shift: 0,
            case_transform: CaseTransform::None,
            replacements: vec![],
            delete_missing_glyphs: false,
        }
    }

    #[test]
    fn no_font_yields_defaults() {
        let effective = EffectiveFont::resolve(None, &Recipe::new());
        assert_eq!(effective, EffectiveFont::default());
    }

    #[test]
    fn recipe_overrides_font_color_only() {
        let recipe = Recipe { font_color: Some("#FF0000".into()), ..Recipe::new() };
        let effective = EffectiveFont::resolve(Some(&font()), &recipe);
        assert_eq!(effective.color.as_deref(), Some("#FF0000"));
        assert_eq!(effective.size, 1.0);
    }

    #[test]
    fn unset_recipe_fields_fall_back_to_font_values() {
        let effective = EffectiveFont::resolve(Some(&font()), &Recipe::new());
        assert_eq!(effective.color.as_deref(), Some("#FFFFFF"));
        assert_eq!(effective.file.as_deref(), Some("Base.ttf"));
    }
}
