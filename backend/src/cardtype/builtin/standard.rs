//! The default card type: title text over a source image, with an
//! optional season label. Mirrors the teacher's "the simplest card type
//! doubles as the fallback when a Series doesn't name one."

use crate::cardtype::CardType;
use crate::error::{Result, TcmError};
use crate::model::Recipe;

pub struct StandardCardType;

const SUPPORTED_OPTIONS: &[&str] = &[
    "title_text",
    "season_text",
    "season_text_map",
    "hide_season_text",
    "hide_episode_text",
    "font_color",
    "font_size",
    "font_kerning",
    "font_stroke_width",
    "font_interline_spacing",
    "font_interword_spacing",
    "font_vertical_shift",
    "blur",
    "grayscale",
    "watched_style",
    "unwatched_style",
];

impl CardType for StandardCardType {
    fn identifier(&self) -> &str {
        "standard"
    }

    fn supported_options(&self) -> &[&'static str] {
        SUPPORTED_OPTIONS
    }

    fn validate(&self, recipe: &Recipe) -> Result<Recipe> {
        let mut recipe = recipe.clone();

        if let Some(size) = recipe.font_size {
            if size <= 0.0 {
                return Err(TcmError::InvalidRecipe(format!("font_size must be positive, got {size}")));
            }
        }
        if let Some(stroke) = recipe.font_stroke_width {
            if stroke < 0.0 {
                return Err(TcmError::InvalidRecipe(format!("font_stroke_width cannot be negative, got {stroke}")));
            }
        }
        if recipe.title_text.is_none() {
            recipe.title_text = Some(String::new());
        }

        Ok(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_font_size() {
        let card_type = StandardCardType;
        let recipe = Recipe { font_size: Some(0.0), ..Recipe::new() };
        let err = card_type.validate(&recipe).unwrap_err();
        assert!(matches!(err, TcmError::InvalidRecipe(_)));
    }

    #[test]
    fn fills_in_empty_title_text_when_absent() {
        let card_type = StandardCardType;
        let recipe = card_type.validate(&Recipe::new()).unwrap();
        assert_eq!(recipe.title_text.as_deref(), Some(""));
    }

    #[test]
    fn accepts_a_fully_specified_recipe() {
        let card_type = StandardCardType;
        let recipe = Recipe {
            title_text: Some("Pilot".into()),
            font_size: Some(1.2),
            font_stroke_width: Some(2.0),
            ..Recipe::new()
        };
        assert!(card_type.validate(&recipe).is_ok());
    }
}
