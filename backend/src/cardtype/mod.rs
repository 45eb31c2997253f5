//! Card-Type Plugin Loader (§4.6).
//!
//! A `CardType` is the plugin *contract*: it declares the options it
//! recognizes, validates a Recipe against them, and translates a
//! resolved Recipe into a `CardSpec` for the render backend. The actual
//! pixel composition — "the image-composition kernel" — is explicitly
//! out of scope (§1) and is injected as a `render::RenderBackend`,
//! mirroring how `assets::compression::JpegCompressor` keeps the
//! quality-search loop in scope while treating re-encoding itself as an
//! injected concern.

pub mod builtin;
pub mod registry;
pub mod remote;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Recipe;
use crate::resolver::EffectiveFont;

pub use registry::CardTypeLoader;
pub use remote::{RemoteCardType, RemoteFile, RemoteManifest};

/// Flattened view of a resolved Recipe plus its render-time inputs,
/// handed to the injected `RenderBackend`. Every recognized option
/// named in §4.3 appears here so a backend never needs to reach back
/// into `Recipe` itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSpec {
    pub card_type: String,
    pub title_text: Option<String>,
    pub season_text: Option<String>,
    pub season_text_map: Option<std::collections::BTreeMap<i32, String>>,
    pub hide_season_text: bool,
    pub hide_episode_text: bool,
    pub blur: bool,
    pub grayscale: bool,
    pub watched_style: Option<String>,
    pub unwatched_style: Option<String>,
    /// Whether the episode is watched in the library this card is being
    /// built for — picks between `watched_style` and `unwatched_style`.
    /// Not a merged Recipe field: it's per-library episode state, not
    /// something a Template/Series/Episode layer overrides (§4.3, §4.5).
    pub watched: bool,
    pub extras: std::collections::BTreeMap<String, serde_json::Value>,

    pub font_file: Option<String>,
    pub font_color: Option<String>,
    pub font_size: f64,
    pub font_kerning: f64,
    pub font_stroke_width: f64,
    pub font_interline_spacing: i32,
    pub font_interword_spacing: i32,
    pub font_vertical_shift: i32,

    #[serde(skip)]
    pub source_image: Option<Vec<u8>>,
    #[serde(skip)]
    pub logo_image: Option<Vec<u8>>,
}

impl CardSpec {
    pub fn build(identifier: &str, recipe: &Recipe, font: &EffectiveFont, source_image: Option<Vec<u8>>, logo_image: Option<Vec<u8>>, watched: bool) -> Self {
        Self {
            card_type: identifier.to_string(),
            title_text: recipe.title_text.clone(),
            season_text: recipe.season_text.clone(),
            season_text_map: recipe.season_text_map.clone(),
            hide_season_text: recipe.hide_season_text.unwrap_or(false),
            hide_episode_text: recipe.hide_episode_text.unwrap_or(false),
            blur: recipe.blur.unwrap_or(false),
            grayscale: recipe.grayscale.unwrap_or(false),
            watched_style: recipe.watched_style.clone(),
            unwatched_style: recipe.unwatched_style.clone(),
            watched,
            extras: recipe.extras.clone(),
            font_file: font.file.clone(),
            font_color: font.color.clone(),
            font_size: font.size,
            font_kerning: font.kerning,
            font_stroke_width: font.stroke_width,
            font_interline_spacing: font.interline_spacing,
            font_interword_spacing: font.interword_spacing,
            font_vertical_shift: font.vertical_shift,
            source_image,
            logo_image,
        }
    }
}

/// The injected pixel-composition kernel (§1 Non-goal). A real backend
/// would draw `spec` onto a canvas and encode the result; this crate
/// only needs the contract so `CardType::render` and the Render
/// Coordinator have somewhere to hand a fully resolved spec.
pub trait RenderBackend: Send + Sync {
    fn compose(&self, spec: &CardSpec) -> Result<Vec<u8>>;
}

/// The plugin contract itself (§4.6).
pub trait CardType: Send + Sync {
    fn identifier(&self) -> &str;
    fn supported_options(&self) -> &[&'static str];

    /// Validate presence of required fields, coerce obviously-stringly
    /// typed extras, and reject recipes referencing missing local
    /// assets. Returns the (possibly coerced) Recipe back on success.
    fn validate(&self, recipe: &Recipe) -> Result<Recipe>;

    fn render(&self, recipe: &Recipe, font: &EffectiveFont, source_image: Option<Vec<u8>>, logo_image: Option<Vec<u8>>, watched: bool, backend: &dyn RenderBackend) -> Result<Vec<u8>> {
        let spec = CardSpec::build(self.identifier(), recipe, font, source_image, logo_image, watched);
        backend.compose(&spec)
    }
}
