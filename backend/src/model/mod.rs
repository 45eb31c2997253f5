//! Data model (§3): canonical identity, entities, recipes.

pub mod card;
pub mod connection;
pub mod episode;
pub mod episode_info;
pub mod font;
pub mod ids;
pub mod recipe;
pub mod series;
pub mod series_info;
pub mod template;
pub mod watched;

pub use card::{Card, Fingerprint};
pub use connection::{Connection, ConnectionKind, SyncFilter};
pub use episode::Episode;
pub use episode_info::EpisodeInfo;
pub use font::Font;
pub use ids::{IdKey, IdSet, SourceKind};
pub use recipe::Recipe;
pub use series::{LibraryBinding, Series};
pub use series_info::SeriesInfo;
pub use template::{Filter, FilterContext, Template};
pub use watched::{WatchedMap, WatchedStatus};
