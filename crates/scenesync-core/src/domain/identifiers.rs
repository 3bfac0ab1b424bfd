//! Semantic newtypes for domain identifiers
//!
//! # Parse-at-Boundaries Pattern
//!
//! Each identifier type:
//! - Validates its input on construction (parse-once pattern)
//! - Cannot represent invalid states
//! - Implements serde deserialization with validation (`try_from = "String"`)
//!
//! Instance names are not identifiers (they change on rename and are resolved
//! against siblings) but share the same error taxonomy, so their validation
//! lives here too.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length for opaque identifiers (instance ids, lock owners, run ids).
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Maximum length for instance names.
pub const MAX_NAME_LEN: usize = 100;

// ============================================================================
// UNIFIED IDENTIFIER ERROR
// ============================================================================

/// Unified error type for identifier and name validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// Identifier is empty or contains only whitespace
    #[error("identifier cannot be empty")]
    Empty,

    /// Identifier exceeds maximum length
    #[error("identifier too long: {actual} characters (max {max})")]
    TooLong {
        /// The maximum allowed length
        max: usize,
        /// The actual length provided
        actual: usize,
    },

    /// Identifier contains invalid characters
    #[error("identifier contains invalid characters: {details}")]
    InvalidCharacters {
        /// Human-readable explanation of what's invalid
        details: String,
    },
}

impl IdentifierError {
    /// Create a `TooLong` error variant
    #[must_use]
    pub const fn too_long(max: usize, actual: usize) -> Self {
        Self::TooLong { max, actual }
    }

    /// Create an `InvalidCharacters` error variant
    #[must_use]
    pub fn invalid_characters(details: impl Into<String>) -> Self {
        Self::InvalidCharacters {
            details: details.into(),
        }
    }
}

// ============================================================================
// VALIDATION HELPERS
// ============================================================================

fn validate_opaque(value: &str) -> Result<(), IdentifierError> {
    if value.trim().is_empty() {
        return Err(IdentifierError::Empty);
    }
    let len = value.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(IdentifierError::too_long(MAX_IDENTIFIER_LEN, len));
    }
    if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(IdentifierError::invalid_characters(
            "whitespace and control characters are not allowed",
        ));
    }
    Ok(())
}

/// Validate an instance name.
///
/// Names must be non-empty after trimming, at most [`MAX_NAME_LEN`]
/// characters, and free of control characters. Interior spaces and dots are
/// allowed: paths are name sequences, not joined strings.
///
/// # Errors
///
/// Returns `IdentifierError` describing the first rule the name breaks.
pub fn validate_instance_name(name: &str) -> Result<(), IdentifierError> {
    if name.trim().is_empty() {
        return Err(IdentifierError::Empty);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(IdentifierError::too_long(MAX_NAME_LEN, len));
    }
    if name.chars().any(char::is_control) {
        return Err(IdentifierError::invalid_characters(
            "control characters are not allowed in names",
        ));
    }
    Ok(())
}

macro_rules! opaque_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate the identifier.
            ///
            /// # Errors
            ///
            /// Returns `IdentifierError` if the value is empty, too long, or
            /// contains whitespace/control characters.
            pub fn parse(s: impl Into<String>) -> Result<Self, IdentifierError> {
                let s = s.into();
                validate_opaque(&s)?;
                Ok(Self(s))
            }

            /// Get the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Convert into an owned String
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdentifierError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdentifierError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_identifier!(
    /// Stable, globally unique instance identity.
    ///
    /// Survives renames and moves; callers use it to address instances when
    /// paths may have changed underneath them.
    InstanceId
);

opaque_identifier!(
    /// Owner of one or more lock leases.
    LockOwner
);

opaque_identifier!(
    /// Identifier of a scripted test run.
    RunId
);

impl InstanceId {
    /// Generate a fresh random instance id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl LockOwner {
    /// Synthesize the owner identity for one pipeline request.
    #[must_use]
    pub fn for_request(sequence: u64) -> Self {
        Self(format!("cmd-{sequence}"))
    }
}

impl RunId {
    /// Build the id assigned to the `sequence`-th enqueued run.
    #[must_use]
    pub fn from_sequence(sequence: u64) -> Self {
        Self(format!("run-{sequence}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_rejects_empty_and_whitespace() {
        assert_eq!(InstanceId::parse(""), Err(IdentifierError::Empty));
        assert_eq!(InstanceId::parse("   "), Err(IdentifierError::Empty));
        assert!(matches!(
            InstanceId::parse("a b"),
            Err(IdentifierError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn test_instance_id_too_long() {
        let long = "x".repeat(MAX_IDENTIFIER_LEN + 1);
        assert_eq!(
            InstanceId::parse(long),
            Err(IdentifierError::too_long(MAX_IDENTIFIER_LEN, MAX_IDENTIFIER_LEN + 1))
        );
    }

    #[test]
    fn test_generated_ids_are_distinct_and_valid() {
        let a = InstanceId::generate();
        let b = InstanceId::generate();
        assert_ne!(a, b);
        assert!(InstanceId::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_identifier_deserialization_validates() {
        let ok: Result<LockOwner, _> = serde_json::from_str("\"agent-7\"");
        assert!(ok.is_ok());
        let bad: Result<LockOwner, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_instance_name_rules() {
        assert!(validate_instance_name("Folder").is_ok());
        assert!(validate_instance_name("Spawn Point.v2").is_ok());
        assert_eq!(validate_instance_name(" "), Err(IdentifierError::Empty));
        assert!(validate_instance_name("bad\nname").is_err());
        assert!(validate_instance_name(&"n".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_sequence_constructors() {
        assert_eq!(RunId::from_sequence(3).as_str(), "run-3");
        assert_eq!(LockOwner::for_request(12).as_str(), "cmd-12");
    }
}
