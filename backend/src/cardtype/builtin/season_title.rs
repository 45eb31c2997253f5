//! A card type that requires a season label — refuses to validate a
//! Recipe that hides season text without supplying a `season_text_map`
//! entry for the season in question, since there would be nothing left
//! to draw.

use crate::cardtype::CardType;
use crate::error::{Result, TcmError};
use crate::model::Recipe;

pub struct SeasonTitleCardType;

const SUPPORTED_OPTIONS: &[&str] = &[
    "title_text",
    "season_text",
    "season_text_map",
    "font_color",
    "font_size",
    "blur",
    "grayscale",
];

impl CardType for SeasonTitleCardType {
    fn identifier(&self) -> &str {
        "season title card"
    }

    fn supported_options(&self) -> &[&'static str] {
        SUPPORTED_OPTIONS
    }

    fn validate(&self, recipe: &Recipe) -> Result<Recipe> {
        if recipe.hide_season_text == Some(true) && recipe.season_text.is_none() && recipe.season_text_map.is_none() {
            return Err(TcmError::InvalidRecipe(
                "season title card cannot hide season text with no season_text or season_text_map set".into(),
            ));
        }
        Ok(recipe.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_hidden_season_text_with_no_fallback() {
        let card_type = SeasonTitleCardType;
        let recipe = Recipe { hide_season_text: Some(true), ..Recipe::new() };
        assert!(card_type.validate(&recipe).is_err());
    }

    #[test]
    fn accepts_hidden_season_text_when_map_present() {
        let card_type = SeasonTitleCardType;
        let mut map = std::collections::BTreeMap::new();
        map.insert(0, "Specials".to_string());
        let recipe = Recipe { hide_season_text: Some(true), season_text_map: Some(map), ..Recipe::new() };
        assert!(card_type.validate(&recipe).is_ok());
    }
}
