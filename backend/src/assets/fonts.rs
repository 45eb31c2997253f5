//! Font file caching (§4.4, §6): `assets/fonts/<font id>/<filename>`.

use std::path::{Path, PathBuf};

use crate::assets::source_image::write_idempotent;
use crate::error::Result;

pub fn font_file_path(asset_root: &Path, font_id: i64, filename: &str) -> PathBuf {
    asset_root.join("fonts").join(font_id.to_string()).join(filename)
}

/// Cache a font's file bytes at its canonical asset path, downloading
/// only if not already present — fonts are immutable once uploaded, so
/// re-fetching on every resolve would be wasted I/O.
pub async fn ensure_cached(asset_root: &Path, font_id: i64, filename: &str, bytes_if_missing: impl FnOnce() -> Vec<u8>) -> Result<PathBuf> {
    let path = font_file_path(asset_root, font_id, filename);
    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(path);
    }

    write_idempotent(&path, &bytes_if_missing()).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_file_path_is_keyed_by_id() {
        let p = font_file_path(Path::new("/assets"), 7, "Oswald.ttf");
        assert_eq!(p, PathBuf::from("/assets/fonts/7/Oswald.ttf"));
    }
}
