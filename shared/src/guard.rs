//! Pure permission checks over a hack snapshot.
//!
//! Both predicates are free of I/O and must be re-run against a freshly
//! loaded hack record on every privileged call; results are never cached
//! across operations.

use uuid::Uuid;

use crate::models::Hack;

/// Whether the actor may manage this hack's patch versions.
///
/// The creator always may. Attributed entries (those carrying an
/// `original_author`) additionally record the editor the original author
/// delegated to in `permission_from`.
pub fn can_edit_as_creator(hack: &Hack, actor_id: Uuid) -> bool {
    if hack.created_by == actor_id {
        return true;
    }
    hack.original_author.is_some() && hack.permission_from == Some(actor_id)
}

/// Attributed archival entries without a delegation chain exist for the
/// record only and carry no distributable patch artifact.
pub fn is_informational_archive(hack: &Hack) -> bool {
    hack.original_author.is_some() && hack.permission_from.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hack(original_author: Option<&str>, permission_from: Option<Uuid>) -> Hack {
        Hack {
            slug: "example".to_string(),
            title: "Example".to_string(),
            created_by: Uuid::from_u128(1),
            original_author: original_author.map(str::to_string),
            permission_from,
            current_patch: None,
            approved: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn creator_can_edit() {
        let hack = hack(None, None);
        assert!(can_edit_as_creator(&hack, Uuid::from_u128(1)));
        assert!(!can_edit_as_creator(&hack, Uuid::from_u128(2)));
    }

    #[test]
    fn delegate_can_edit_attributed_hack() {
        let delegate = Uuid::from_u128(7);
        let hack = hack(Some("original author"), Some(delegate));
        assert!(can_edit_as_creator(&hack, delegate));
        assert!(can_edit_as_creator(&hack, Uuid::from_u128(1)));
        assert!(!can_edit_as_creator(&hack, Uuid::from_u128(2)));
    }

    #[test]
    fn delegation_requires_attribution() {
        // a stray permission_from on a normal hack grants nothing
        let other = Uuid::from_u128(7);
        let hack = hack(None, Some(other));
        assert!(!can_edit_as_creator(&hack, other));
    }

    #[test]
    fn informational_archive_detection() {
        assert!(is_informational_archive(&hack(Some("lost author"), None)));
        assert!(!is_informational_archive(&hack(
            Some("reachable author"),
            Some(Uuid::from_u128(7))
        )));
        assert!(!is_informational_archive(&hack(None, None)));
    }
}
