//! Fingerprint derivation (§4.5, §6): a stable hash of the canonical
//! JSON of a Recipe plus the content of its input assets. Two recipes
//! with identical canonical JSON and identical asset bytes always
//! yield the same fingerprint (§8 *fingerprint determinism*); any
//! semantic change to what feeds the hash must bump `Fingerprint::
//! VERSION_PREFIX` so a stale on-disk value is never mistaken for a
//! fresh one under a changed scheme.

use sha2::{Digest, Sha256};

use crate::model::{Fingerprint, Recipe};

/// Derive the fingerprint for a resolved Recipe. `watched` is folded in
/// directly: it is not a Recipe field (it is per-library episode state,
/// not a layered override — see `cardtype::CardSpec::watched`), but it
/// can change which of `watched_style`/`unwatched_style` a card type
/// renders with, so two otherwise-identical recipes for the same
/// episode in different watched states must never collide on one
/// fingerprint (§8 *watched-state triggers rebuild*).
pub fn fingerprint(recipe: &Recipe, watched: bool, source_bytes: Option<&[u8]>, logo_bytes: Option<&[u8]>) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(recipe.canonical_json().as_bytes());
    hasher.update([if watched { 1u8 } else { 0u8 }]);
    hasher.update(source_bytes.map(sha256_hex).unwrap_or_default().as_bytes());
    hasher.update(logo_bytes.map(sha256_hex).unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    Fingerprint(format!("{}{:x}", Fingerprint::VERSION_PREFIX, digest))
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_recipes_and_assets_yield_equal_fingerprints() {
        let r1 = Recipe { title_text: Some("Pilot".into()), ..Recipe::new() };
        let r2 = Recipe { title_text: Some("Pilot".into()), ..Recipe::new() };
        assert_eq!(fingerprint(&r1, false, Some(b"img"), None), fingerprint(&r2, false, Some(b"img"), None));
    }

    #[test]
    fn differing_watched_flag_changes_fingerprint() {
        let recipe = Recipe { title_text: Some("Pilot".into()), ..Recipe::new() };
        assert_ne!(fingerprint(&recipe, true, None, None), fingerprint(&recipe, false, None, None));
    }

    #[test]
    fn differing_source_bytes_changes_fingerprint() {
        let recipe = Recipe::new();
        assert_ne!(
            fingerprint(&recipe, false, Some(b"a"), None),
            fingerprint(&recipe, false, Some(b"b"), None)
        );
    }

    #[test]
    fn fingerprint_carries_the_version_prefix() {
        let fp = fingerprint(&Recipe::new(), false, None, None);
        assert!(fp.as_str().starts_with(Fingerprint::VERSION_PREFIX));
    }
}
