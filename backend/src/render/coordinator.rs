//! Render Cache & Coordinator (§4.5): fingerprint → artifact, with
//! at-most-one concurrent builder per fingerprint across the whole
//! process (§5's per-fingerprint build lock).
//!
//! Grounded on `connectors::registry::InterfaceGroup`'s copy-on-write
//! map pattern, generalized from "one entry per interface_id" to "one
//! lock per fingerprint, created on first use and kept only as long as
//! a builder holds it."

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

use crate::assets::source_image::write_idempotent;
use crate::error::Result;
use crate::model::{Card, Fingerprint, Recipe};
use crate::store::CardStore;

/// Per-fingerprint single-flight locks. A lock is created lazily and
/// left in the map after release — cheap enough at process scale that
/// evicting unused entries isn't worth the complexity (unlike
/// `InterfaceGroup`, whose entries are long-lived connectors).
#[derive(Default)]
struct BuildLocks {
    locks: SyncMutex<HashMap<Fingerprint, Arc<AsyncMutex<()>>>>,
}

impl BuildLocks {
    fn lock_for(&self, fingerprint: &Fingerprint) -> Arc<AsyncMutex<()>> {
        self.locks.lock().entry(fingerprint.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Unchanged { file_path: String, file_size: u64 },
    Built { file_path: String, file_size: u64 },
}

impl BuildOutcome {
    pub fn file_path(&self) -> &str {
        match self {
            BuildOutcome::Unchanged { file_path, .. } | BuildOutcome::Built { file_path, .. } => file_path,
        }
    }
}

pub struct RenderCoordinator {
    cards: Arc<dyn CardStore>,
    build_locks: BuildLocks,
}

impl RenderCoordinator {
    pub fn new(cards: Arc<dyn CardStore>) -> Self {
        Self { cards, build_locks: BuildLocks::default() }
    }

    /// `ensure_built` per §4.5: recheck-after-lock so that of any number
    /// of concurrent callers sharing a fingerprint, exactly one invokes
    /// `render` (§8 *build-lock exclusivity*) and all observe the same
    /// artifact path and size (§8 *cache idempotence*).
    pub async fn ensure_built(
        &self,
        episode_id: i64,
        library: &str,
        recipe: &Recipe,
        fingerprint: Fingerprint,
        file_path: &Path,
        render: impl FnOnce() -> Result<Vec<u8>>,
    ) -> Result<BuildOutcome> {
        if let Some(outcome) = self.check_unchanged(episode_id, library, &fingerprint).await? {
            return Ok(outcome);
        }

        let lock = self.build_locks.lock_for(&fingerprint);
        let _guard = lock.lock().await;

        if let Some(outcome) = self.check_unchanged(episode_id, library, &fingerprint).await? {
            return Ok(outcome);
        }

        let bytes = render()?;
        write_idempotent(file_path, &bytes).await?;
        let file_size = bytes.len() as u64;
        let file_path_str = file_path.display().to_string();

        let card = Card {
            episode_id,
            library: library.to_string(),
            file_path: file_path_str.clone(),
            file_size,
            fingerprint,
            recipe_json: recipe.canonical_json(),
        };
        self.cards.put_active(&card).await?;

        Ok(BuildOutcome::Built { file_path: file_path_str, file_size })
    }

    async fn check_unchanged(&self, episode_id: i64, library: &str, fingerprint: &Fingerprint) -> Result<Option<BuildOutcome>> {
        let Some(card) = self.cards.get_active(episode_id, library).await? else {
            return Ok(None);
        };
        if &card.fingerprint != fingerprint {
            return Ok(None);
        }

        let actual_size = match tokio::fs::metadata(&card.file_path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(None),
        };
        if actual_size != card.file_size {
            return Ok(None);
        }

        Ok(Some(BuildOutcome::Unchanged { file_path: card.file_path, file_size: card.file_size }))
    }

    /// Delete the file and clear the record for every library this
    /// Episode has an active Card in (§4.5 `invalidate`).
    pub async fn invalidate(&self, episode_id: i64) -> Result<()> {
        for card in self.cards.list_for_episode(episode_id).await? {
            let _ = tokio::fs::remove_file(&card.file_path).await;
            self.cards.invalidate(episode_id, &card.library).await?;
        }
        Ok(())
    }

    /// Whether the Card on file for `(episode, library)` was built for
    /// a different fingerprint than `current_fingerprint` — i.e. the
    /// newly resolved recipe (post watched-sync or any other
    /// recompute) no longer matches what's on disk (§4.5
    /// `reload_needed`). Since `render::fingerprint` folds the watched
    /// flag in directly, a watched-state flip that changes styling
    /// shows up here without this module needing its own notion of
    /// "style."
    pub async fn reload_needed(&self, episode_id: i64, library: &str, current_fingerprint: &Fingerprint) -> Result<bool> {
        match self.cards.get_active(episode_id, library).await? {
            Some(card) => Ok(&card.fingerprint != current_fingerprint),
            None => Ok(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct FakeCardStore(Mutex<HashMap<(i64, String), Card>>);

    #[async_trait]
    impl CardStore for FakeCardStore {
        async fn get_active(&self, episode_id: i64, library: &str) -> Result<Option<Card>> {
            Ok(self.0.lock().unwrap().get(&(episode_id, library.to_string())).cloned())
        }
        async fn put_active(&self, card: &Card) -> Result<()> {
            self.0.lock().unwrap().insert((card.episode_id, card.library.clone()), card.clone());
            Ok(())
        }
        async fn invalidate(&self, episode_id: i64, library: &str) -> Result<()> {
            self.0.lock().unwrap().remove(&(episode_id, library.to_string()));
            Ok(())
        }
        async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<Card>> {
            Ok(self.0.lock().unwrap().values().filter(|c| c.episode_id == episode_id).cloned().collect())
        }
        async fn count_active(&self) -> Result<i64> {
            Ok(self.0.lock().unwrap().len() as i64)
        }
        async fn total_bytes(&self) -> Result<i64> {
            Ok(self.0.lock().unwrap().values().map(|c| c.file_size as i64).sum())
        }
    }

    #[tokio::test]
    async fn second_call_with_same_recipe_is_unchanged() {
        let dir = tempdir().unwrap();
        let coordinator = RenderCoordinator::new(Arc::new(FakeCardStore::default()));
        let recipe = Recipe::new();
        let fp = crate::render::fingerprint::fingerprint(&recipe, false, None, None);
        let path = dir.path().join("card.jpg");

        let first = coordinator.ensure_built(1, "Shows", &recipe, fp.clone(), &path, || Ok(vec![1, 2, 3])).await.unwrap();
        assert!(matches!(first, BuildOutcome::Built { .. }));

        let second = coordinator.ensure_built(1, "Shows", &recipe, fp, &path, || panic!("must not re-render")).await.unwrap();
        assert_eq!(second, BuildOutcome::Unchanged { file_path: first.file_path().to_string(), file_size: 3 });
    }

    #[tokio::test]
    async fn concurrent_callers_render_exactly_once() {
        let dir = tempdir().unwrap();
        let coordinator = Arc::new(RenderCoordinator::new(Arc::new(FakeCardStore::default())));
        let recipe = Recipe::new();
        let fp = crate::render::fingerprint::fingerprint(&recipe, false, None, None);
        let path = dir.path().join("card.jpg");
        let render_count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let recipe = recipe.clone();
            let fp = fp.clone();
            let path = path.clone();
            let render_count = render_count.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .ensure_built(1, "Shows", &recipe, fp, &path, || {
                        render_count.fetch_add(1, Ordering::SeqCst);
                        Ok(vec![9, 9, 9])
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }

        assert_eq!(render_count.load(Ordering::SeqCst), 1);
        let first_path = outcomes[0].file_path().to_string();
        for outcome in &outcomes {
            assert_eq!(outcome.file_path(), first_path);
        }
    }

    #[tokio::test]
    async fn invalidate_removes_file_and_record_across_libraries() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FakeCardStore::default());
        let coordinator = RenderCoordinator::new(store.clone());
        let recipe = Recipe::new();
        let fp = crate::render::fingerprint::fingerprint(&recipe, false, None, None);

        for library in ["Shows", "Kids Shows"] {
            let path = dir.path().join(format!("{library}.jpg"));
            coordinator.ensure_built(1, library, &recipe, fp.clone(), &path, || Ok(vec![1])).await.unwrap();
        }

        coordinator.invalidate(1).await.unwrap();
        assert_eq!(store.count_active().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reload_needed_true_when_fingerprint_changed() {
        let dir = tempdir().unwrap();
        let coordinator = RenderCoordinator::new(Arc::new(FakeCardStore::default()));
        let recipe = Recipe::new();
        let fp_unwatched = crate::render::fingerprint::fingerprint(&recipe, false, None, None);
        let fp_watched = crate::render::fingerprint::fingerprint(&recipe, true, None, None);
        let path = dir.path().join("card.jpg");

        coordinator.ensure_built(1, "Shows", &recipe, fp_unwatched, &path, || Ok(vec![1])).await.unwrap();
        assert!(coordinator.reload_needed(1, "Shows", &fp_watched).await.unwrap());
    }
}
