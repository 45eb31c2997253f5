//! Locally bundled card types — no download, no remote manifest.
//! Each one only declares what it supports and validates a Recipe
//! against that; the actual drawing happens behind `RenderBackend`.

mod season_title;
mod standard;

pub use season_title::SeasonTitleCardType;
pub use standard::StandardCardType;

/// The card types shipped in-process, keyed by identifier (§4.6:
/// "Local" card types never touch the remote cache directory).
pub fn builtin_card_types() -> Vec<std::sync::Arc<dyn super::CardType>> {
    vec![
        std::sync::Arc::new(StandardCardType),
        std::sync::Arc::new(SeasonTitleCardType),
    ]
}
