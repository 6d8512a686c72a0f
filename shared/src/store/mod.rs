//! Durable persistence of hacks and patches.
//!
//! The trait splits into point lookups and `commit_*` units. Every commit
//! unit is atomic: it either applies completely or leaves the store
//! untouched, and every guard named in a method contract is re-verified
//! inside that unit rather than in a separate preceding read. Commit units
//! assume the identity rows the caller just read still exist; when one has
//! gone missing the unit fails with [`StoreError::Contention`] so the
//! caller re-reads.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Hack, Patch, PatchId};

pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An expected-previous-value guard did not match; re-read and retry.
    #[error("concurrent update rejected")]
    Contention,
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated")]
    UniqueViolation,
    #[error(transparent)]
    Backend(#[from] sqlx::Error),
}

/// Result of an archive attempt, decided under the hack row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived,
    /// The patch is the hack's current patch and must be superseded first.
    IsCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    RolledBack,
    TargetArchived,
    TargetMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed,
    DuplicateVersion,
}

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn hack_by_slug(&self, slug: &str) -> Result<Option<Hack>, StoreError>;

    async fn patch_by_id(&self, id: PatchId) -> Result<Option<Patch>, StoreError>;

    /// All patches of a hack, newest first.
    async fn patches_of_hack(&self, slug: &str) -> Result<Vec<Patch>, StoreError>;

    /// Marks the patch published and, when `promote` is set, reassigns the
    /// hack's current patch. `expected_current` is the value the promotion
    /// decision was computed from; a mismatch at commit time fails with
    /// [`StoreError::Contention`] without applying anything.
    async fn commit_publish(
        &self,
        slug: &str,
        patch_id: PatchId,
        promote: bool,
        expected_current: Option<PatchId>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Sets `archived` unless the patch is the hack's current patch at
    /// commit time.
    async fn commit_archive(
        &self,
        slug: &str,
        patch_id: PatchId,
        now: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, StoreError>;

    async fn commit_restore(&self, patch_id: PatchId) -> Result<(), StoreError>;

    /// Reassigns the hack's current patch to `target` and unpublishes every
    /// sibling created strictly after it, as one unit. The target's own
    /// flags are untouched; its `archived` state is re-verified inside the
    /// unit.
    async fn commit_rollback(
        &self,
        slug: &str,
        target: PatchId,
    ) -> Result<RollbackOutcome, StoreError>;

    /// Applies a new version label. Per-hack label uniqueness is enforced
    /// by the write itself, not by an earlier read.
    async fn rename_patch(
        &self,
        patch_id: PatchId,
        version: &str,
        now: DateTime<Utc>,
    ) -> Result<RenameOutcome, StoreError>;

    async fn set_changelog(
        &self,
        patch_id: PatchId,
        changelog: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Repoints the patch's stored artifact object (reupload confirmation).
    async fn set_artifact_object(
        &self,
        patch_id: PatchId,
        object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts a `(patch, device)` download marker. Returns `false` when
    /// the pair was already counted.
    async fn record_download(&self, patch_id: PatchId, device_key: &str)
        -> Result<bool, StoreError>;

    async fn download_count(&self, patch_id: PatchId) -> Result<i64, StoreError>;
}
