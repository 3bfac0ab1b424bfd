//! Conflict taxonomy for rejected commands.
//!
//! Conflicts are response values, not errors: every reason is recoverable by
//! the caller and none of them is fatal to the service.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::{coordination::LockConflict, tree::TreeError};

/// HTTP-equivalent status of a successful command.
pub const STATUS_OK: u16 = 200;

/// Closed set of reasons a command can be rejected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictReason {
    /// Target, parent, or id does not resolve. Permanent until re-queried.
    NotFound,
    /// Another owner holds a lease on the path. Retry after the TTL.
    Locked,
    /// The caller's base revision is stale.
    RevisionMismatch,
    /// Malformed command or rejected value. Permanent until input changes.
    ValidationFailed,
}

impl ConflictReason {
    #[must_use]
    pub const fn status(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Locked => 423,
            Self::RevisionMismatch => 409,
            Self::ValidationFailed => 400,
        }
    }

    /// Rank used to pick the overall status of a partially failed batch.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Locked => 4,
            Self::RevisionMismatch => 3,
            Self::ValidationFailed => 2,
            Self::NotFound => 1,
        }
    }
}

/// `{reason, expected, actual}` payload of a rejected command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub reason: ConflictReason,
    /// What the caller asked for, derived from the command's identifying fields.
    pub expected: Value,
    /// State that explains the rejection.
    pub actual: Value,
}

impl Conflict {
    #[must_use]
    pub fn new(reason: ConflictReason, expected: Value, actual: Value) -> Self {
        Self {
            reason,
            expected,
            actual,
        }
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.reason.status()
    }

    #[must_use]
    pub fn validation(expected: Value, message: impl Into<String>, revision: u64) -> Self {
        Self::new(
            ConflictReason::ValidationFailed,
            expected,
            json!({ "message": message.into(), "revision": revision }),
        )
    }

    #[must_use]
    pub fn not_found(expected: Value, message: impl Into<String>, revision: u64) -> Self {
        Self::new(
            ConflictReason::NotFound,
            expected,
            json!({ "message": message.into(), "revision": revision }),
        )
    }

    #[must_use]
    pub fn revision_mismatch(base_revision: u64, current: u64) -> Self {
        Self::new(
            ConflictReason::RevisionMismatch,
            json!({ "baseRevision": base_revision }),
            json!({ "revision": current }),
        )
    }

    #[must_use]
    pub fn locked(expected: Value, lock: &LockConflict, revision: u64) -> Self {
        Self::new(
            ConflictReason::Locked,
            expected,
            json!({
                "owner": lock.owner,
                "path": lock.path,
                "requestedPath": lock.requested_path,
                "expiresAt": lock.expires_at,
                "revision": revision,
            }),
        )
    }

    /// Map a tree rejection onto the taxonomy.
    #[must_use]
    pub fn from_tree_error(expected: Value, error: &TreeError, revision: u64) -> Self {
        if error.is_not_found() {
            Self::not_found(expected, error.to_string(), revision)
        } else {
            Self::validation(expected, error.to_string(), revision)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ConflictReason::NotFound.status(), 404);
        assert_eq!(ConflictReason::Locked.status(), 423);
        assert_eq!(ConflictReason::RevisionMismatch.status(), 409);
        assert_eq!(ConflictReason::ValidationFailed.status(), 400);
    }

    #[test]
    fn test_reason_wire_names() -> Result<(), strum::ParseError> {
        assert_eq!(ConflictReason::RevisionMismatch.to_string(), "revision_mismatch");
        assert_eq!(ConflictReason::from_str("locked")?, ConflictReason::Locked);
        Ok(())
    }

    #[test]
    fn test_locked_outranks_everything() {
        let mut reasons = [
            ConflictReason::NotFound,
            ConflictReason::Locked,
            ConflictReason::ValidationFailed,
            ConflictReason::RevisionMismatch,
        ];
        reasons.sort_by_key(|reason| std::cmp::Reverse(reason.severity()));
        assert_eq!(reasons[0], ConflictReason::Locked);
        assert_eq!(reasons[3], ConflictReason::NotFound);
    }

    #[test]
    fn test_tree_error_classification() {
        let not_found = Conflict::from_tree_error(
            json!({}),
            &TreeError::PathNotFound(crate::domain::InstancePath::from_dotted("W.X")),
            3,
        );
        let invalid = Conflict::from_tree_error(
            json!({}),
            &TreeError::ReadOnlyProperty("ClassName".into()),
            3,
        );
        assert_eq!(not_found.status(), 404);
        assert_eq!(invalid.reason, ConflictReason::ValidationFailed);
        assert_eq!(invalid.actual["revision"], json!(3));
    }
}
