//! Named font definitions (§3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CaseTransform {
    None,
    Upper,
    Lower,
    Title,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Font {
    pub id: i64,
    pub name: String,
    pub file: Option<String>,
    pub color: Option<String>,
    pub size: f64,
    pub kerning: f64,
    pub stroke_width: f64,
    pub interline_spacing: i32,
    pub vertical_shift: i32,
    pub case_transform: CaseTransform,
    /// Characters substituted verbatim before rendering, e.g. curly
    /// quotes to straight quotes for a font missing those glyphs.
    pub replacements: Vec<(String, String)>,
    /// Whether to drop characters this font has no glyph for, rather
    /// than let the card type fall back to a tofu/placeholder glyph.
    pub delete_missing_glyphs: bool,
}

impl Font {
    pub fn apply_case(&self, text: &str) -> String {
        match self.case_transform {
            CaseTransform::None => text.to_string(),
            CaseTransform::Upper => text.to_uppercase(),
            CaseTransform::Lower => text.to_lowercase(),
            CaseTransform::Title => text
                .split_whitespace()
                .map(title_case_word)
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    pub fn apply_replacements(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (from, to) in &self.replacements {
            out = out.replace(from.as_str(), to.as_str());
        }
        out
    }
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn font() -> Font {
        Font {
            id: 1,
            name: "Default".into(),
            file: None,
            color: None,
            size: 1.0,
            kerning: 0.0,
            stroke_width: 1.0,
            interline_spacing: 0,
            vertical_shift: 0,
            case_transform: CaseTransform::Upper,
            replacements: vec![("\u{2019}".into(), "'".into())],
            delete_missing_glyphs: false,
        }
    }

    #[test]
    fn case_transform_upper() {
        assert_eq!(font().apply_case("hello"), "HELLO");
    }

    #[test]
    fn replacements_apply_in_order() {
        assert_eq!(font().apply_replacements("it\u{2019}s"), "it's");
    }
}
