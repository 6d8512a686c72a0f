use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub type PatchId = i64;

/// Default bucket for patch artifacts whose records carry no explicit bucket.
pub const PATCHES_BUCKET: &str = "patches";

/// Parent content item that patch versions attach to.
///
/// The lifecycle engine mutates hacks only through `current_patch`
/// reassignment; creation and deletion happen elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Hack {
    pub slug: String,
    pub title: String,
    pub created_by: Uuid,
    /// Attributed author of an archival entry, when the uploader is not the
    /// original creator.
    pub original_author: Option<String>,
    /// Actor the original author delegated version management to.
    pub permission_from: Option<Uuid>,
    pub current_patch: Option<PatchId>,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One uploaded, versioned patch artifact.
///
/// `created_at` is immutable and is the sole ordering key between sibling
/// versions. Patches are never hard-deleted; removal is archiving.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patch {
    pub id: PatchId,
    pub parent_hack: String,
    pub version: String,
    pub changelog: Option<String>,
    pub bucket: Option<String>,
    pub filename: String,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patch {
    pub fn artifact_bucket(&self) -> &str {
        self.bucket.as_deref().unwrap_or(PATCHES_BUCKET)
    }
}

/// Public projection of a patch for version listings. Storage coordinates
/// stay internal.
#[derive(Debug, Clone, Serialize)]
pub struct VersionEntry {
    pub id: PatchId,
    pub version: String,
    pub changelog: Option<String>,
    pub published: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Patch> for VersionEntry {
    fn from(patch: Patch) -> Self {
        Self {
            id: patch.id,
            version: patch.version,
            changelog: patch.changelog,
            published: patch.published,
            archived: patch.archived,
            created_at: patch.created_at,
            updated_at: patch.updated_at,
        }
    }
}

/// One public changelog row.
#[derive(Debug, Clone, Serialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub changelog: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Patch> for ChangelogEntry {
    fn from(patch: Patch) -> Self {
        Self {
            version: patch.version,
            changelog: patch.changelog,
            created_at: patch.created_at,
        }
    }
}
