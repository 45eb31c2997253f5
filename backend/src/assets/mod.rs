//! Source & Asset Store (§4.4): episode source images, series logos and
//! backdrops, and cached font files.

pub mod compression;
pub mod fonts;
pub mod sanitize;
pub mod source_image;

pub use compression::compress_to_limit;
pub use sanitize::sanitize_name;
pub use source_image::{episode_source_path, rank_candidates, series_backdrop_path, series_logo_path};
