//! The fully materialized per-Episode render recipe (§4.3, §6).
//!
//! Every field is `Option`-shaped because resolution fills them in
//! layer by layer (global ⊕ template ⊕ series ⊕ episode) and a
//! still-`None` field at build time is itself meaningful: the chosen
//! `CardType` supplies its own default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One merge layer's worth of recipe fields. `Recipe` (below) is the
/// result of merging a sequence of these in ascending precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub card_type: Option<String>,

    pub title_text: Option<String>,
    pub season_text: Option<String>,
    /// Per-season-number text overrides, e.g. `{0: "Specials"}`.
    pub season_text_map: Option<BTreeMap<i32, String>>,

    pub hide_season_text: Option<bool>,
    pub hide_episode_text: Option<bool>,

    pub font_id: Option<i64>,
    pub font_color: Option<String>,
    pub font_size: Option<f64>,
    pub font_kerning: Option<f64>,
    pub font_stroke_width: Option<f64>,
    pub font_interline_spacing: Option<i32>,
    pub font_interword_spacing: Option<i32>,
    pub font_vertical_shift: Option<i32>,

    pub blur: Option<bool>,
    pub grayscale: Option<bool>,

    pub watched_style: Option<String>,
    pub unwatched_style: Option<String>,

    pub logo_file: Option<String>,
    pub source_file: Option<String>,

    /// `{data_key -> language_code}` translation requests (§4.3).
    pub translations: Option<BTreeMap<String, String>>,

    /// Key-wise-merged free-form extension fields, merged at the same
    /// precedence rather than replaced wholesale (§4.3 merge rule).
    pub extras: BTreeMap<String, Value>,
}

impl Recipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `higher` over `self` in place: non-nil wins, collections
    /// replace rather than concatenate, `extras` merges key-wise. This
    /// is the one merge rule (§4.3/§8) every resolution layer uses.
    pub fn merge_from(&mut self, higher: &Recipe) {
        macro_rules! take {
            ($field:ident) => {
                if higher.$field.is_some() {
                    self.$field = higher.$field.clone();
                }
            };
        }

        take!(card_type);
        take!(title_text);
        take!(season_text);
        take!(season_text_map);
        take!(hide_season_text);
        take!(hide_episode_text);
        take!(font_id);
        take!(font_color);
        take!(font_size);
        take!(font_kerning);
        take!(font_stroke_width);
        take!(font_interline_spacing);
        take!(font_interword_spacing);
        take!(font_vertical_shift);
        take!(blur);
        take!(grayscale);
        take!(watched_style);
        take!(unwatched_style);
        take!(logo_file);
        take!(source_file);
        take!(translations);

        for (key, value) in &higher.extras {
            self.extras.insert(key.clone(), value.clone());
        }
    }

    /// Canonical JSON used as fingerprint input (§4.5, §6): keys sorted,
    /// no whitespace variance. `serde_json`'s map is a `BTreeMap` under
    /// `preserve_order` being disabled (the default), so `to_string` on
    /// a value built from this struct's derived `Serialize` is already
    /// key-sorted for every nested object — `extras` is a `BTreeMap` and
    /// `season_text_map` likewise, so no additional canonicalization
    /// pass is needed beyond `serde_json::to_string`.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("Recipe serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_higher_precedence_non_nil_values() {
        let mut base = Recipe { title_text: Some("Base".into()), ..Recipe::new() };
        let higher = Recipe { title_text: Some("Override".into()), ..Recipe::new() };
        base.merge_from(&higher);
        assert_eq!(base.title_text.as_deref(), Some("Override"));
    }

    #[test]
    fn merge_leaves_lower_value_when_higher_is_nil() {
        let mut base = Recipe { hide_episode_text: Some(true), ..Recipe::new() };
        let higher = Recipe::new();
        base.merge_from(&higher);
        assert_eq!(base.hide_episode_text, Some(true));
    }

    #[test]
    fn extras_merge_key_wise() {
        let mut base = Recipe::new();
        base.extras.insert("a".into(), Value::from(1));
        base.extras.insert("b".into(), Value::from(2));

        let mut higher = Recipe::new();
        higher.extras.insert("b".into(), Value::from(99));

        base.merge_from(&higher);
        assert_eq!(base.extras.get("a"), Some(&Value::from(1)));
        assert_eq!(base.extras.get("b"), Some(&Value::from(99)));
    }

    #[test]
    fn canonical_json_is_deterministic_across_equal_recipes() {
        let mut a = Recipe::new();
        a.extras.insert("z".into(), Value::from(1));
        a.extras.insert("a".into(), Value::from(2));

        let mut b = Recipe::new();
        b.extras.insert("a".into(), Value::from(2));
        b.extras.insert("z".into(), Value::from(1));

        assert_eq!(a.canonical_json(), b.canonical_json());
    }
}
