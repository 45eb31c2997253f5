//! Remote card types (§4.6): fetched by `<username>/<class_name>` from
//! a known community repository into a private cache directory.
//!
//! Since dynamically loading and executing foreign Rust is not a thing
//! a process can safely do, a "remote" card type here is data-driven: a
//! downloaded manifest names the options it recognizes and whatever
//! side-file dependencies it needs, and `RemoteCardType` implements the
//! same `CardType` contract generically against that manifest. The
//! manifest's `extras_defaults` flow into `CardSpec.extras` for the
//! injected `RenderBackend` to interpret — this is the "dynamic class
//! loading" Design Note confined to the plugin boundary.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::cardtype::CardType;
use crate::error::{Result, TcmError};
use crate::model::Recipe;

const MANIFEST_FILENAME: &str = "manifest.json";

/// A side-file a remote card type depends on (a font, a texture, ...).
/// Downloaded alongside the manifest; its absence invalidates the card
/// type entirely (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteFile {
    pub filename: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteManifest {
    pub identifier: String,
    pub supported_options: Vec<String>,
    pub required_options: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<RemoteFile>,
}

/// A card type sourced from `<username>/<class_name>`, backed by a
/// manifest and its downloaded dependency files, all under
/// `cache_dir/<username>/<class_name>/`.
pub struct RemoteCardType {
    identifier: String,
    manifest: RemoteManifest,
    supported_options: Vec<&'static str>,
    cache_dir: PathBuf,
}

impl RemoteCardType {
    /// Build from an already-downloaded manifest and cache directory.
    /// `RemoteCardType::supported_options` leaks the manifest's owned
    /// strings once at construction time so the `CardType` trait's
    /// `&'static str` return type (shared with the builtin, compile-time
    /// known card types) still holds for a runtime-loaded one.
    pub fn new(cache_dir: PathBuf, manifest: RemoteManifest) -> Self {
        let supported_options = manifest
            .supported_options
            .iter()
            .map(|s| Box::leak(s.clone().into_boxed_str()) as &'static str)
            .collect();
        Self { identifier: manifest.identifier.clone(), manifest, supported_options, cache_dir }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn dependency_paths(&self) -> Vec<PathBuf> {
        self.manifest.dependencies.iter().map(|dep| self.cache_dir.join(&dep.filename)).collect()
    }

    /// Every declared dependency file must already be present in the
    /// cache directory, or this card type is unusable (§4.6).
    pub fn dependencies_satisfied(&self) -> bool {
        self.dependency_paths().iter().all(|p| p.exists())
    }
}

impl CardType for RemoteCardType {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn supported_options(&self) -> &[&'static str] {
        &self.supported_options
    }

    fn validate(&self, recipe: &Recipe) -> Result<Recipe> {
        if !self.dependencies_satisfied() {
            return Err(TcmError::InvalidRecipe(format!(
                "remote card type {} is missing a required dependency file",
                self.identifier
            )));
        }

        for required in &self.manifest.required_options {
            let present = match required.as_str() {
                "title_text" => recipe.title_text.is_some(),
                "season_text" => recipe.season_text.is_some(),
                "font_color" => recipe.font_color.is_some(),
                other => recipe.extras.contains_key(other),
            };
            if !present {
                return Err(TcmError::InvalidRecipe(format!(
                    "remote card type {} requires option {required}",
                    self.identifier
                )));
            }
        }

        Ok(recipe.clone())
    }
}

/// Resolves `<username>/<class_name>` identifiers to a cached
/// `RemoteCardType`, downloading the manifest and its dependencies on
/// first use. A failed download leaves the identifier unresolved rather
/// than caching a partial result.
pub struct RemoteCardTypeFetcher {
    client: reqwest::Client,
    repository_base: String,
    cache_dir: PathBuf,
    loaded: RwLock<std::collections::HashMap<String, std::sync::Arc<RemoteCardType>>>,
}

impl RemoteCardTypeFetcher {
    pub fn new(client: reqwest::Client, repository_base: String, cache_dir: PathBuf) -> Self {
        Self { client, repository_base, cache_dir, loaded: RwLock::new(std::collections::HashMap::new()) }
    }

    fn cache_dir_for(&self, identifier: &str) -> PathBuf {
        self.cache_dir.join(identifier)
    }

    pub async fn fetch(&self, identifier: &str) -> Result<std::sync::Arc<RemoteCardType>> {
        if let Some(existing) = self.loaded.read().unwrap().get(identifier) {
            return Ok(existing.clone());
        }

        let dir = self.cache_dir_for(identifier);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| TcmError::Other(e.into()))?;

        let manifest_url = format!("{}/{}/{}", self.repository_base.trim_end_matches('/'), identifier, MANIFEST_FILENAME);
        let response = self.client.get(&manifest_url).send().await.map_err(|e| TcmError::transient(e.to_string()))?;
        if !response.status().is_success() {
            return Err(crate::error::classify_status(response.status(), identifier));
        }
        let manifest: RemoteManifest = response.json().await.map_err(|e| TcmError::Other(e.into()))?;

        for dependency in &manifest.dependencies {
            let bytes = self
                .client
                .get(&dependency.url)
                .send()
                .await
                .map_err(|e| TcmError::transient(e.to_string()))?
                .bytes()
                .await
                .map_err(|e| TcmError::Other(e.into()))?;
            tokio::fs::write(dir.join(&dependency.filename), &bytes).await.map_err(|e| TcmError::Other(e.into()))?;
        }

        let card_type = std::sync::Arc::new(RemoteCardType::new(dir, manifest));
        if !card_type.dependencies_satisfied() {
            return Err(TcmError::InvalidRecipe(format!("remote card type {identifier} failed to download all dependencies")));
        }

        self.loaded.write().unwrap().insert(identifier.to_string(), card_type.clone());
        Ok(card_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RemoteManifest {
        RemoteManifest {
            identifier: "someone/FancyCard".into(),
            supported_options: vec!["title_text".into()],
            required_options: vec!["title_text".into()],
            dependencies: vec![],
        }
    }

    #[test]
    fn no_dependencies_means_always_satisfied() {
        let card_type = RemoteCardType::new(PathBuf::from("/tmp/does-not-exist"), manifest());
        assert!(card_type.dependencies_satisfied());
    }

    #[test]
    fn validate_rejects_missing_required_option() {
        let card_type = RemoteCardType::new(PathBuf::from("/tmp/does-not-exist"), manifest());
        let err = card_type.validate(&Recipe::new()).unwrap_err();
        assert!(matches!(err, TcmError::InvalidRecipe(_)));
    }

    #[test]
    fn validate_accepts_when_required_option_present() {
        let card_type = RemoteCardType::new(PathBuf::from("/tmp/does-not-exist"), manifest());
        let recipe = Recipe { title_text: Some("Pilot".into()), ..Recipe::new() };
        assert!(card_type.validate(&recipe).is_ok());
    }

    #[test]
    fn missing_dependency_file_fails_validation() {
        let manifest = RemoteManifest {
            dependencies: vec![RemoteFile { filename: "font.ttf".into(), url: "https://example.invalid/font.ttf".into() }],
            ..manifest()
        };
        let card_type = RemoteCardType::new(PathBuf::from("/tmp/does-not-exist-either"), manifest);
        assert!(!card_type.dependencies_satisfied());
        assert!(card_type.validate(&Recipe { title_text: Some("Pilot".into()), ..Recipe::new() }).is_err());
    }
}
