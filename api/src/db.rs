//! Postgres implementation of the version store.
//!
//! Multi-record commit units run in explicit transactions with a
//! `FOR UPDATE` lock on the row whose state they re-verify; a transaction
//! dropped before commit rolls back, so a failed guard leaves nothing
//! applied.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shared::models::{Hack, Patch, PatchId};
use shared::store::{ArchiveOutcome, RenameOutcome, RollbackOutcome, StoreError, VersionStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn hack_by_slug(&self, slug: &str) -> Result<Option<Hack>, StoreError> {
        let hack = sqlx::query_as::<_, Hack>("SELECT * FROM hacks WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hack)
    }

    async fn patch_by_id(&self, id: PatchId) -> Result<Option<Patch>, StoreError> {
        let patch = sqlx::query_as::<_, Patch>("SELECT * FROM patches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(patch)
    }

    async fn patches_of_hack(&self, slug: &str) -> Result<Vec<Patch>, StoreError> {
        let patches = sqlx::query_as::<_, Patch>(
            "SELECT * FROM patches WHERE parent_hack = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
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
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<PatchId>> =
            sqlx::query_scalar("SELECT current_patch FROM hacks WHERE slug = $1 FOR UPDATE")
                .bind(slug)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or(StoreError::Contention)?;
        if current != expected_current {
            return Err(StoreError::Contention);
        }

        sqlx::query("UPDATE patches SET published = TRUE, published_at = $2 WHERE id = $1")
            .bind(patch_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if promote {
            sqlx::query("UPDATE hacks SET current_patch = $2 WHERE slug = $1")
                .bind(slug)
                .bind(patch_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit_archive(
        &self,
        slug: &str,
        patch_id: PatchId,
        now: DateTime<Utc>,
    ) -> Result<ArchiveOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<PatchId>> =
            sqlx::query_scalar("SELECT current_patch FROM hacks WHERE slug = $1 FOR UPDATE")
                .bind(slug)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or(StoreError::Contention)?;
        if current == Some(patch_id) {
            return Ok(ArchiveOutcome::IsCurrent);
        }

        sqlx::query("UPDATE patches SET archived = TRUE, archived_at = $2 WHERE id = $1")
            .bind(patch_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ArchiveOutcome::Archived)
    }

    async fn commit_restore(&self, patch_id: PatchId) -> Result<(), StoreError> {
        sqlx::query("UPDATE patches SET archived = FALSE, archived_at = NULL WHERE id = $1")
            .bind(patch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn commit_rollback(
        &self,
        slug: &str,
        target: PatchId,
    ) -> Result<RollbackOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(bool, DateTime<Utc>)> = sqlx::query_as(
            "SELECT archived, created_at FROM patches \
             WHERE id = $1 AND parent_hack = $2 FOR UPDATE",
        )
        .bind(target)
        .bind(slug)
        .fetch_optional(&mut *tx)
        .await?;

        let (archived, cutoff) = match row {
            Some(row) => row,
            None => return Ok(RollbackOutcome::TargetMissing),
        };
        if archived {
            return Ok(RollbackOutcome::TargetArchived);
        }

        sqlx::query("UPDATE hacks SET current_patch = $2 WHERE slug = $1")
            .bind(slug)
            .bind(target)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE patches SET published = FALSE WHERE parent_hack = $1 AND created_at > $2",
        )
        .bind(slug)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(RollbackOutcome::RolledBack)
    }

    async fn rename_patch(
        &self,
        patch_id: PatchId,
        version: &str,
        now: DateTime<Utc>,
    ) -> Result<RenameOutcome, StoreError> {
        let result = sqlx::query("UPDATE patches SET version = $2, updated_at = $3 WHERE id = $1")
            .bind(patch_id)
            .bind(version)
            .bind(now)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(RenameOutcome::Renamed),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(RenameOutcome::DuplicateVersion)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn set_changelog(
        &self,
        patch_id: PatchId,
        changelog: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE patches SET changelog = $2 WHERE id = $1")
            .bind(patch_id)
            .bind(changelog)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_artifact_object(
        &self,
        patch_id: PatchId,
        object_key: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE patches SET filename = $2, updated_at = $3 WHERE id = $1")
            .bind(patch_id)
            .bind(object_key)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_download(
        &self,
        patch_id: PatchId,
        device_key: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO patch_downloads (patch, device_id) VALUES ($1, $2) \
             ON CONFLICT (patch, device_id) DO NOTHING",
        )
        .bind(patch_id)
        .bind(device_key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn download_count(&self, patch_id: PatchId) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patch_downloads WHERE patch = $1")
            .bind(patch_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
