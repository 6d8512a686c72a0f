//! Patch version lifecycle operations.
//!
//! Every operation loads a fresh hack snapshot, re-runs the permission
//! check, verifies the target patch belongs to the named hack, and applies
//! its changes through one atomic store commit. Multi-record effects
//! (promotion, rollback cascades) never become visible partially: after any
//! committed operation a hack's `current_patch` always references one of
//! its own non-archived patches.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::blob::{BlobStore, DOWNLOAD_URL_TTL, UPLOAD_URL_TTL};
use crate::device::DeviceId;
use crate::guard::{can_edit_as_creator, is_informational_archive};
use crate::models::{Hack, Patch, PatchId};
use crate::store::{ArchiveOutcome, RenameOutcome, RollbackOutcome, StoreError, VersionStore};

/// Publish commit attempts before giving up on optimistic-concurrency
/// contention.
const PUBLISH_RETRIES: usize = 3;

const CONCURRENT_UPDATE: &str = "The hack was modified concurrently. Please try again.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("{0}")]
    Validation(&'static str),
    #[error("An unexpected storage error occurred")]
    Upstream,
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

fn log_upstream(operation: &'static str, err: StoreError) -> LifecycleError {
    tracing::error!(operation = operation, error = ?err, "version store operation failed");
    LifecycleError::Upstream
}

/// The lifecycle engine. Store and blob handles are threaded in explicitly
/// so tests can substitute an in-memory store.
#[derive(Clone)]
pub struct PatchLifecycle {
    store: Arc<dyn VersionStore>,
    blobs: Arc<dyn BlobStore>,
}

impl PatchLifecycle {
    pub fn new(store: Arc<dyn VersionStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Loads the hack and checks the actor may manage its versions.
    async fn editable_hack(&self, slug: &str, actor_id: Uuid) -> LifecycleResult<Hack> {
        let hack = self
            .store
            .hack_by_slug(slug)
            .await
            .map_err(|err| log_upstream("load hack", err))?
            .ok_or(LifecycleError::NotFound("Hack not found"))?;
        if !can_edit_as_creator(&hack, actor_id) {
            return Err(LifecycleError::Forbidden);
        }
        if is_informational_archive(&hack) {
            return Err(LifecycleError::Conflict(
                "Archive hacks do not have patch files available",
            ));
        }
        Ok(hack)
    }

    /// Loads the patch and verifies it belongs to the named hack. Patches
    /// never leak across hacks; a foreign id reads as absent.
    async fn owned_patch(&self, slug: &str, patch_id: PatchId) -> LifecycleResult<Patch> {
        let patch = self
            .store
            .patch_by_id(patch_id)
            .await
            .map_err(|err| log_upstream("load patch", err))?
            .ok_or(LifecycleError::NotFound("Patch not found"))?;
        if patch.parent_hack != slug {
            return Err(LifecycleError::NotFound("Patch not found"));
        }
        Ok(patch)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Publish
    // ─────────────────────────────────────────────────────────────────────

    /// Marks the patch published. Returns whether it was promoted to the
    /// hack's current patch: promotion happens iff the hack has no current
    /// patch or the target was created strictly later than it. Publishing
    /// an older patch never reassigns the pointer.
    ///
    /// The promotion decision is committed under an expected-previous-value
    /// guard on `current_patch`; on contention the whole read-decide-commit
    /// cycle reruns against a fresh snapshot.
    pub async fn publish(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
    ) -> LifecycleResult<bool> {
        for _ in 0..PUBLISH_RETRIES {
            let hack = self.editable_hack(slug, actor_id).await?;
            let patch = self.owned_patch(slug, patch_id).await?;

            let promote = match hack.current_patch {
                None => true,
                Some(current_id) => match self
                    .store
                    .patch_by_id(current_id)
                    .await
                    .map_err(|err| log_upstream("load current patch", err))?
                {
                    Some(current) => patch.created_at > current.created_at,
                    None => true,
                },
            };

            match self
                .store
                .commit_publish(slug, patch_id, promote, hack.current_patch, Utc::now())
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        hack = slug,
                        patch = patch_id,
                        promoted = promote,
                        "patch published"
                    );
                    return Ok(promote);
                }
                Err(StoreError::Contention) => continue,
                Err(err) => return Err(log_upstream("publish patch", err)),
            }
        }
        Err(LifecycleError::Conflict(CONCURRENT_UPDATE))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Archive / Restore
    // ─────────────────────────────────────────────────────────────────────

    /// Hides the patch from every listing. The hack's current patch can
    /// never be archived directly; supersede it first by publishing or
    /// rolling back to another version.
    pub async fn archive(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
    ) -> LifecycleResult<()> {
        let hack = self.editable_hack(slug, actor_id).await?;
        // re-verified under the hack row lock inside the commit
        if hack.current_patch == Some(patch_id) {
            return Err(LifecycleError::Conflict(
                "Cannot archive the current patch version",
            ));
        }
        self.owned_patch(slug, patch_id).await?;

        match self.store.commit_archive(slug, patch_id, Utc::now()).await {
            Ok(ArchiveOutcome::Archived) => {
                tracing::info!(hack = slug, patch = patch_id, "patch archived");
                Ok(())
            }
            Ok(ArchiveOutcome::IsCurrent) => Err(LifecycleError::Conflict(
                "Cannot archive the current patch version",
            )),
            Err(StoreError::Contention) => Err(LifecycleError::Conflict(CONCURRENT_UPDATE)),
            Err(err) => Err(log_upstream("archive patch", err)),
        }
    }

    /// Brings an archived patch back. A restored patch does not become
    /// current automatically.
    pub async fn restore(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
    ) -> LifecycleResult<()> {
        self.editable_hack(slug, actor_id).await?;
        self.owned_patch(slug, patch_id).await?;

        match self.store.commit_restore(patch_id).await {
            Ok(()) => {
                tracing::info!(hack = slug, patch = patch_id, "patch restored");
                Ok(())
            }
            Err(StoreError::Contention) => Err(LifecycleError::Conflict(CONCURRENT_UPDATE)),
            Err(err) => Err(log_upstream("restore patch", err)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Rollback
    // ─────────────────────────────────────────────────────────────────────

    /// Makes an earlier patch current again and unpublishes every sibling
    /// released after it, in one atomic unit. Rolling back to an archived
    /// patch is rejected; rolling back to a draft leaves the hack current
    /// on an unpublished patch, which is a legal administrative state.
    /// Idempotent: repeating a rollback reproduces the same final state.
    pub async fn rollback(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
    ) -> LifecycleResult<()> {
        self.editable_hack(slug, actor_id).await?;
        let target = self.owned_patch(slug, patch_id).await?;
        if target.archived {
            return Err(LifecycleError::Conflict(
                "Cannot roll back to an archived version",
            ));
        }

        match self.store.commit_rollback(slug, patch_id).await {
            Ok(RollbackOutcome::RolledBack) => {
                tracing::info!(hack = slug, patch = patch_id, "rolled back to patch");
                Ok(())
            }
            Ok(RollbackOutcome::TargetArchived) => Err(LifecycleError::Conflict(
                "Cannot roll back to an archived version",
            )),
            Ok(RollbackOutcome::TargetMissing) => {
                Err(LifecycleError::NotFound("Patch not found"))
            }
            Err(StoreError::Contention) => Err(LifecycleError::Conflict(CONCURRENT_UPDATE)),
            Err(err) => Err(log_upstream("rollback to patch", err)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Metadata edits
    // ─────────────────────────────────────────────────────────────────────

    /// Renames the patch's version label. Renaming to the label the patch
    /// already carries is a no-op success; a label carried by any sibling,
    /// whatever its state, is rejected.
    pub async fn rename(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
        new_version: &str,
    ) -> LifecycleResult<()> {
        self.editable_hack(slug, actor_id).await?;
        let patch = self.owned_patch(slug, patch_id).await?;

        let trimmed = new_version.trim();
        if trimmed.is_empty() {
            return Err(LifecycleError::Validation("Version cannot be empty"));
        }
        if patch.version == trimmed {
            return Ok(());
        }

        match self.store.rename_patch(patch_id, trimmed, Utc::now()).await {
            Ok(RenameOutcome::Renamed) => Ok(()),
            Ok(RenameOutcome::DuplicateVersion) => Err(LifecycleError::Conflict(
                "That version already exists for this hack.",
            )),
            Err(StoreError::UniqueViolation) => Err(LifecycleError::Conflict(
                "That version already exists for this hack.",
            )),
            Err(StoreError::Contention) => Err(LifecycleError::Conflict(CONCURRENT_UPDATE)),
            Err(err) => Err(log_upstream("rename patch", err)),
        }
    }

    /// Replaces the patch's changelog. Whitespace-only text clears it.
    pub async fn edit_changelog(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
        text: &str,
    ) -> LifecycleResult<()> {
        self.editable_hack(slug, actor_id).await?;
        self.owned_patch(slug, patch_id).await?;

        let trimmed = text.trim();
        let changelog = (!trimmed.is_empty()).then_some(trimmed);
        self.store
            .set_changelog(patch_id, changelog)
            .await
            .map_err(|err| log_upstream("update changelog", err))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Artifact replacement (two-phase)
    // ─────────────────────────────────────────────────────────────────────

    /// Phase one of artifact replacement: signs a time-boxed upload target
    /// for the given object key. The patch record is not touched; an
    /// unconfirmed reservation simply expires in the blob store.
    pub async fn request_reupload(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
        object_key: &str,
    ) -> LifecycleResult<String> {
        self.editable_hack(slug, actor_id).await?;
        let patch = self.owned_patch(slug, patch_id).await?;

        let key = object_key.trim();
        if key.is_empty() {
            return Err(LifecycleError::Validation("Object key cannot be empty"));
        }

        self.blobs
            .presign_upload(patch.artifact_bucket(), key, UPLOAD_URL_TTL)
            .await
            .map_err(|err| {
                tracing::error!(hack = slug, patch = patch_id, error = ?err, "failed to presign upload URL");
                LifecycleError::Upstream
            })
    }

    /// Phase two: repoints the patch at the uploaded object once the caller
    /// confirms the upload succeeded.
    pub async fn confirm_reupload(
        &self,
        slug: &str,
        actor_id: Uuid,
        patch_id: PatchId,
        object_key: &str,
    ) -> LifecycleResult<()> {
        self.editable_hack(slug, actor_id).await?;
        self.owned_patch(slug, patch_id).await?;

        let key = object_key.trim();
        if key.is_empty() {
            return Err(LifecycleError::Validation("Object key cannot be empty"));
        }

        self.store
            .set_artifact_object(patch_id, key, Utc::now())
            .await
            .map_err(|err| log_upstream("confirm reupload", err))?;
        tracing::info!(hack = slug, patch = patch_id, object_key = key, "patch artifact replaced");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Downloads
    // ─────────────────────────────────────────────────────────────────────

    /// Counts one download per device. The device fingerprint must carry
    /// exactly five opaque components; a repeated `(patch, device)` pair
    /// reports `false` instead of failing, so client retries are harmless.
    pub async fn record_download(
        &self,
        patch_id: PatchId,
        device_components: &[String],
    ) -> LifecycleResult<bool> {
        let device = DeviceId::from_components(device_components)
            .map_err(|_| LifecycleError::Validation("Invalid device ID"))?;

        self.store
            .patch_by_id(patch_id)
            .await
            .map_err(|err| log_upstream("load patch", err))?
            .ok_or(LifecycleError::NotFound("Patch not found"))?;

        self.store
            .record_download(patch_id, device.as_str())
            .await
            .map_err(|err| log_upstream("record download", err))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Artifact access
    // ─────────────────────────────────────────────────────────────────────

    /// Signs a short-lived download URL for one patch. Published,
    /// non-archived patches are public; anything else is restricted to
    /// actors who may edit the parent hack.
    pub async fn patch_download_url(
        &self,
        patch_id: PatchId,
        actor_id: Option<Uuid>,
    ) -> LifecycleResult<String> {
        let patch = self
            .store
            .patch_by_id(patch_id)
            .await
            .map_err(|err| log_upstream("load patch", err))?
            .ok_or(LifecycleError::NotFound("Patch not found"))?;

        if !patch.published || patch.archived {
            let actor = actor_id.ok_or(LifecycleError::Unauthorized)?;
            let hack = self
                .store
                .hack_by_slug(&patch.parent_hack)
                .await
                .map_err(|err| log_upstream("load hack", err))?
                .ok_or(LifecycleError::NotFound("Hack not found"))?;
            if !can_edit_as_creator(&hack, actor) {
                return Err(LifecycleError::Forbidden);
            }
        }

        self.sign_download(&patch).await
    }

    /// Signs a download URL for the hack's current patch. Unapproved hacks
    /// stay invisible to everyone but their editors.
    pub async fn current_patch_url(
        &self,
        slug: &str,
        actor_id: Option<Uuid>,
    ) -> LifecycleResult<String> {
        let hack = self
            .store
            .hack_by_slug(slug)
            .await
            .map_err(|err| log_upstream("load hack", err))?
            .ok_or(LifecycleError::NotFound("Hack not found"))?;

        let can_edit = actor_id.is_some_and(|actor| can_edit_as_creator(&hack, actor));
        if !hack.approved && !can_edit {
            return Err(LifecycleError::NotFound("Hack not found"));
        }
        if is_informational_archive(&hack) {
            return Err(LifecycleError::Conflict(
                "Archive hacks do not have patch files available",
            ));
        }

        let current = hack
            .current_patch
            .ok_or(LifecycleError::NotFound("No patch available"))?;
        let patch = self
            .store
            .patch_by_id(current)
            .await
            .map_err(|err| log_upstream("load patch", err))?
            .ok_or(LifecycleError::NotFound("Patch not found"))?;

        self.sign_download(&patch).await
    }

    async fn sign_download(&self, patch: &Patch) -> LifecycleResult<String> {
        self.blobs
            .presign_download(patch.artifact_bucket(), &patch.filename, DOWNLOAD_URL_TTL)
            .await
            .map_err(|err| {
                tracing::error!(patch = patch.id, error = ?err, "failed to presign download URL");
                LifecycleError::Upstream
            })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Listings
    // ─────────────────────────────────────────────────────────────────────

    /// Patches shown on the version list, newest first. The public sees
    /// published, non-archived versions; editors also see their drafts and,
    /// on request, archived versions.
    pub async fn list_versions(
        &self,
        slug: &str,
        actor_id: Option<Uuid>,
        include_archived: bool,
    ) -> LifecycleResult<Vec<Patch>> {
        let hack = self
            .store
            .hack_by_slug(slug)
            .await
            .map_err(|err| log_upstream("load hack", err))?
            .ok_or(LifecycleError::NotFound("Hack not found"))?;
        let can_edit = actor_id.is_some_and(|actor| can_edit_as_creator(&hack, actor));

        let mut patches = self
            .store
            .patches_of_hack(slug)
            .await
            .map_err(|err| log_upstream("list patches", err))?;
        patches.retain(|p| {
            let visible = p.published || can_edit;
            let unarchived = !p.archived || (can_edit && include_archived);
            visible && unarchived
        });
        Ok(patches)
    }

    /// Published, non-archived versions for the public changelog view.
    pub async fn changelog(&self, slug: &str) -> LifecycleResult<Vec<Patch>> {
        self.store
            .hack_by_slug(slug)
            .await
            .map_err(|err| log_upstream("load hack", err))?
            .ok_or(LifecycleError::NotFound("Hack not found"))?;

        let mut patches = self
            .store
            .patches_of_hack(slug)
            .await
            .map_err(|err| log_upstream("list patches", err))?;
        patches.retain(|p| p.published && !p.archived);
        Ok(patches)
    }
}
