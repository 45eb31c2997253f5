//! Series entity (§3).

use serde::{Deserialize, Serialize};

use crate::model::recipe::Recipe;
use crate::model::series_info::SeriesInfo;

/// A `(media_server_kind, instance_id, library_name)` binding — the
/// libraries a Series is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryBinding {
    pub interface_id: i64,
    pub library_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub info: SeriesInfo,
    pub libraries: Vec<LibraryBinding>,
    /// Ordered Template references; order matters for merge precedence
    /// within this layer (§4.3).
    pub template_ids: Vec<i64>,
    pub font_id: Option<i64>,
    /// Series-level recipe overrides (layer 3 of §4.3's resolution
    /// order).
    pub overrides: Recipe,
    pub deleted: bool,
}

impl Series {
    pub fn new(id: i64, info: SeriesInfo) -> Self {
        Self {
            id,
            info,
            libraries: vec![],
            template_ids: vec![],
            font_id: None,
            overrides: Recipe::new(),
            deleted: false,
        }
    }
}
