//! Card-Type Loader (§4.6): resolves a Recipe's `card_type` identifier
//! to a `CardType` — either one of the locally bundled types, or a
//! `<username>/<class_name>` identifier fetched through the remote
//! cache — and runs validation against it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cardtype::remote::RemoteCardTypeFetcher;
use crate::cardtype::{builtin, CardType};
use crate::error::{Result, TcmError};
use crate::model::Recipe;

/// A `card_type` naming neither a builtin nor a `<username>/<class>`
/// shape is rejected before any network call is attempted.
fn looks_like_remote_identifier(identifier: &str) -> bool {
    identifier.split('/').count() == 2 && !identifier.starts_with('/') && !identifier.ends_with('/')
}

pub struct CardTypeLoader {
    local: HashMap<String, Arc<dyn CardType>>,
    remote: RemoteCardTypeFetcher,
}

impl CardTypeLoader {
    pub fn new(client: reqwest::Client, repository_base: String, remote_cache_dir: PathBuf) -> Self {
        let local = builtin::builtin_card_types()
            .into_iter()
            .map(|card_type| (card_type.identifier().to_string(), card_type))
            .collect();
        Self { local, remote: RemoteCardTypeFetcher::new(client, repository_base, remote_cache_dir) }
    }

    /// Look up a card type by identifier, fetching and caching a remote
    /// one on first use. Returns `None` only for an identifier that is
    /// neither a known local name nor shaped like `username/class_name`.
    pub async fn get(&self, identifier: &str) -> Result<Option<Arc<dyn CardType>>> {
        if let Some(card_type) = self.local.get(identifier) {
            return Ok(Some(card_type.clone()));
        }
        if !looks_like_remote_identifier(identifier) {
            return Ok(None);
        }
        let card_type = self.remote.fetch(identifier).await?;
        Ok(Some(card_type as Arc<dyn CardType>))
    }

    /// Resolve `recipe.card_type` and validate the recipe against it,
    /// returning the (possibly coerced) recipe the render coordinator
    /// should build from. A missing or unresolvable card type is itself
    /// a validation failure, not a silent fallback to `standard`.
    pub async fn validate(&self, identifier: &str, recipe: &Recipe) -> Result<Recipe> {
        let card_type = self
            .get(identifier)
            .await?
            .ok_or_else(|| TcmError::InvalidRecipe(format!("unknown card type {identifier}")))?;
        card_type.validate(recipe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> CardTypeLoader {
        CardTypeLoader::new(reqwest::Client::new(), "https://cards.invalid".into(), PathBuf::from("/tmp/tcm-cardtype-cache-test"))
    }

    #[tokio::test]
    async fn resolves_builtin_standard_by_name() {
        let card_type = loader().get("standard").await.unwrap();
        assert!(card_type.is_some());
    }

    #[tokio::test]
    async fn rejects_identifier_with_no_slash() {
        let card_type = loader().get("not-a-known-type").await.unwrap();
        assert!(card_type.is_none());
    }

    #[tokio::test]
    async fn validate_surfaces_invalid_recipe_for_standard() {
        let recipe = Recipe { font_size: Some(-1.0), ..Recipe::new() };
        let err = loader().validate("standard", &recipe).await.unwrap_err();
        assert!(matches!(err, TcmError::InvalidRecipe(_)));
    }
}
