//! Mutex-guarded in-memory [`VersionStore`] used by the test suites.
//!
//! The single mutex makes every commit unit a mutual-exclusion section, so
//! the trait's atomicity contract holds trivially.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ArchiveOutcome, RenameOutcome, RollbackOutcome, StoreError, VersionStore};
use crate::models::{Hack, Patch, PatchId};

#[derive(Default)]
struct Inner {
    hacks: HashMap<String, Hack>,
    patches: HashMap<PatchId, Patch>,
    downloads: HashSet<(PatchId, String)>,
    next_patch_id: PatchId,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a hack. Callers arrange valid states; nothing is validated.
    pub fn insert_hack(&self, hack: Hack) {
        let mut inner = self.lock();
        inner.hacks.insert(hack.slug.clone(), hack);
    }

    /// Seeds a patch, assigning and returning its id.
    pub fn insert_patch(&self, mut patch: Patch) -> PatchId {
        let mut inner = self.lock();
        inner.next_patch_id += 1;
        patch.id = inner.next_patch_id;
        let id = patch.id;
        inner.patches.insert(id, patch);
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn hack_by_slug(&self, slug: &str) -> Result<Option<Hack>, StoreError> {
        Ok(self.lock().hacks.get(slug).cloned())
    }

    async fn patch_by_id(&self, id: PatchId) -> Result<Option<Patch>, StoreError> {
        Ok(self.lock().patches.get(&id).cloned())
    }

    async fn patches_of_hack(&self, slug: &str) -> Result<Vec<Patch>, StoreError> {
        let inner = self.lock();
        let mut patches: Vec<Patch> = inner
            .patches
            .values()
            .filter(|p| p.parent_hack == slug)
            .cloned()
            .collect();
        patches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(patches)
    }

    async fn commit_publish(
        &self,
        slug: &str,
        patch_id: PatchId,
        promote: bool,
        expected_current: Option<PatchId>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let Inner { hacks, patches, .. } = &mut *inner;
        let hack = hacks.get_mut(slug).ok_or(StoreError::Contention)?;
        if hack.current_patch != expected_current {
            return Err(StoreError::Contention);
        }
        let patch = patches.get_mut(&patch_id).ok_or(StoreError::Contention)?;
        patch.published = true;
        patch.published_at = Some(now);
        if promote {
            hack.current_patch = Some(patch_id);
        }
        Ok(())
    }

    async fn commit_archive(
        &self,
        slug: &str,
        patch_id: PatchId,
        now: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, StoreError> {
        let mut inner = self.lock();
        let Inner { hacks, patches, .. } = &mut *inner;
        let hack = hacks.get(slug).ok_or(StoreError::Contention)?;
        if hack.current_patch == Some(patch_id) {
            return Ok(ArchiveOutcome::IsCurrent);
        }
        let patch = patches.get_mut(&patch_id).ok_or(StoreError::Contention)?;
        patch.archived = true;
        patch.archived_at = Some(now);
        Ok(ArchiveOutcome::Archived)
    }

    async fn commit_restore(&self, patch_id: PatchId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let patch = inner
            .patches
            .get_mut(&patch_id)
            .ok_or(StoreError::Contention)?;
        patch.archived = false;
        patch.archived_at = None;
        Ok(())
    }

    async fn commit_rollback(
        &self,
        slug: &str,
        target: PatchId,
    ) -> Result<RollbackOutcome, StoreError> {
        let mut inner = self.lock();
        let Inner { hacks, patches, .. } = &mut *inner;
        let cutoff = match patches.get(&target) {
            Some(patch) if patch.parent_hack == slug => {
                if patch.archived {
                    return Ok(RollbackOutcome::TargetArchived);
                }
                patch.created_at
            }
            _ => return Ok(RollbackOutcome::TargetMissing),
        };
        let hack = hacks.get_mut(slug).ok_or(StoreError::Contention)?;
        hack.current_patch = Some(target);
        for patch in patches.values_mut() {
            if patch.parent_hack == slug && patch.created_at > cutoff {
                patch.published = false;
            }
        }
        Ok(RollbackOutcome::RolledBack)
    }

    async fn rename_patch(
        &self,
        patch_id: PatchId,
        version: &str,
        now: DateTime<Utc>,
    ) -> Result<RenameOutcome, StoreError> {
        let mut inner = self.lock();
        let parent = inner
            .patches
            .get(&patch_id)
            .ok_or(StoreError::Contention)?
            .parent_hack
            .clone();
        let taken = inner
            .patches
            .values()
            .any(|p| p.parent_hack == parent && p.version == version && p.id != patch_id);
        if taken {
            return Ok(RenameOutcome::DuplicateVersion);
        }
        let patch = inner
            .patches
            .get_mut(&patch_id)
            .ok_or(StoreError::Contention)?;
        patch.version = version.to_string();
        patch.updated_at = now;
        Ok(RenameOutcome::Renamed)
    }

    async fn set_changelog(
        &self,
        patch_id: PatchId,
        changelog: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let patch = inner
            .patches
            .get_mut(&patch_id)
            .ok_or(StoreError::Contention)?;
        patch.changelog = changelog.map(str::to_string);
        Ok(())
    }

    async fn set_artifact_object(
        &self,
        patch_id: PatchId,
        object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let patch = inner
            .patches
            .get_mut(&patch_id)
            .ok_or(StoreError::Contention)?;
        patch.filename = object_key.to_string();
        patch.updated_at = now;
        Ok(())
    }

    async fn record_download(
        &self,
        patch_id: PatchId,
        device_key: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        Ok(inner.downloads.insert((patch_id, device_key.to_string())))
    }

    async fn download_count(&self, patch_id: PatchId) -> Result<i64, StoreError> {
        let inner = self.lock();
        Ok(inner
            .downloads
            .iter()
            .filter(|(patch, _)| *patch == patch_id)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn hack(slug: &str, current: Option<PatchId>) -> Hack {
        Hack {
            slug: slug.to_string(),
            title: slug.to_string(),
            created_by: Uuid::from_u128(1),
            original_author: None,
            permission_from: None,
            current_patch: current,
            approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn patch(slug: &str, version: &str) -> Patch {
        let now = Utc::now();
        Patch {
            id: 0,
            parent_hack: slug.to_string(),
            version: version.to_string(),
            changelog: None,
            bucket: None,
            filename: format!("{slug}-{version}.bps"),
            published: false,
            published_at: None,
            archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn publish_commit_rejects_stale_expectation() {
        let store = MemoryStore::new();
        let a = store.insert_patch(patch("h", "1.0"));
        let b = store.insert_patch(patch("h", "1.1"));
        store.insert_hack(hack("h", Some(a)));

        let stale = store
            .commit_publish("h", b, true, None, Utc::now())
            .await;
        assert!(matches!(stale, Err(StoreError::Contention)));

        // and nothing was applied
        let b_row = store.patch_by_id(b).await.unwrap().unwrap();
        assert!(!b_row.published);

        store
            .commit_publish("h", b, true, Some(a), Utc::now())
            .await
            .unwrap();
        let hack = store.hack_by_slug("h").await.unwrap().unwrap();
        assert_eq!(hack.current_patch, Some(b));
    }

    #[tokio::test]
    async fn rename_reports_duplicates() {
        let store = MemoryStore::new();
        let a = store.insert_patch(patch("h", "1.0"));
        store.insert_patch(patch("h", "1.1"));
        store.insert_hack(hack("h", None));

        let outcome = store.rename_patch(a, "1.1", Utc::now()).await.unwrap();
        assert_eq!(outcome, RenameOutcome::DuplicateVersion);
        assert_eq!(
            store.patch_by_id(a).await.unwrap().unwrap().version,
            "1.0"
        );

        let outcome = store.rename_patch(a, "2.0", Utc::now()).await.unwrap();
        assert_eq!(outcome, RenameOutcome::Renamed);
    }

    #[tokio::test]
    async fn patches_listed_newest_first() {
        let store = MemoryStore::new();
        let mut older = patch("h", "1.0");
        older.created_at = Utc::now() - chrono::Duration::minutes(10);
        store.insert_patch(older);
        let newest = store.insert_patch(patch("h", "1.1"));
        store.insert_hack(hack("h", None));

        let listed = store.patches_of_hack("h").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newest);
    }
}
