//! Tree mutation errors.

use thiserror::Error;

use crate::domain::{IdentifierError, InstanceId, InstancePath};

/// Why a tree mutation was rejected.
///
/// The command layer maps these onto the conflict taxonomy: the `*NotFound`
/// variants become `not_found`, everything else `validation_failed`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    /// No instance lives at the path.
    #[error("path not found: {0}")]
    PathNotFound(InstancePath),

    /// No instance has the id.
    #[error("instance not found: {0}")]
    IdNotFound(InstanceId),

    /// Destination is the node itself or lies inside its subtree.
    #[error("cannot move {path} into itself or its descendant {new_parent_path}")]
    Cycle {
        path: InstancePath,
        new_parent_path: InstancePath,
    },

    /// Requested name breaks the naming rules.
    #[error("invalid name: {0}")]
    InvalidName(#[from] IdentifierError),

    /// A create reused an id that is already live.
    #[error("duplicate instance id: {0}")]
    DuplicateId(InstanceId),

    /// The property is part of the record and cannot be written this way.
    #[error("property '{0}' is read-only")]
    ReadOnlyProperty(String),

    /// The value cannot be written to the property.
    #[error("invalid value for '{property}': {reason}")]
    InvalidValue { property: String, reason: String },
}

impl TreeError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound(_) | Self::IdNotFound(_))
    }

    /// Exit code scheme shared with the crate-level error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_not_found() {
            3
        } else {
            1
        }
    }
}
