//! Typed property values.
//!
//! Engine properties arrive as loosely-typed JSON; they are parsed once into
//! [`PropertyValue`] and every later decision (schema derivation, write
//! validation, change coalescing) works on the sum type.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// One property value, tagged by kind.
///
/// JSON form is adjacently tagged: `{"kind": "number", "value": 4}`,
/// `{"kind": "enum", "value": {"enumType": "Material", "item": "Plastic"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    Enum {
        #[serde(rename = "enumType")]
        enum_type: String,
        item: String,
    },
    Struct {
        #[serde(rename = "typeName")]
        type_name: String,
        fields: BTreeMap<String, f64>,
    },
    /// A value the engine reported but this core cannot represent or write.
    Unsupported {
        #[serde(rename = "typeName")]
        type_name: String,
    },
}

/// Kind of a property, as reported by the schema read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Number,
    String,
    Enum,
    Struct,
    Unsupported,
    /// Observed with more than one kind across instances of a class.
    Mixed,
}

impl PropertyValue {
    #[must_use]
    pub const fn kind(&self) -> PropertyKind {
        match self {
            Self::Bool(_) => PropertyKind::Bool,
            Self::Number(_) => PropertyKind::Number,
            Self::String(_) => PropertyKind::String,
            Self::Enum { .. } => PropertyKind::Enum,
            Self::Struct { .. } => PropertyKind::Struct,
            Self::Unsupported { .. } => PropertyKind::Unsupported,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// True when `other` can replace `self` without changing the property's
    /// shape: same kind, and for enums/structs the same declared type.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Enum { enum_type: a, .. }, Self::Enum { enum_type: b, .. })
            | (Self::Struct { type_name: a, .. }, Self::Struct { type_name: b, .. }) => a == b,
            _ => self.kind() == other.kind(),
        }
    }

    /// Check that this value may be written by a command.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for unsupported or non-finite values.
    pub fn check_writable(&self) -> Result<(), String> {
        match self {
            Self::Unsupported { type_name } => {
                Err(format!("values of type '{type_name}' are not writable"))
            }
            Self::Number(n) if !n.is_finite() => Err("numbers must be finite".to_string()),
            Self::Struct { type_name, fields } if fields.values().any(|f| !f.is_finite()) => Err(
                format!("struct '{type_name}' has a non-finite field"),
            ),
            _ => Ok(()),
        }
    }
}
