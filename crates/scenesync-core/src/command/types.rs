//! Declarative mutation commands as callers send them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    domain::{validate_instance_name, InstanceId, InstancePath, PropertyValue},
    tree::{is_reserved_property, TreeError, TreeStore, CLASS_NAME_PROPERTY, NAME_PROPERTY},
};

/// Addresses an existing instance by stable id or by current path.
///
/// When both are given the id wins; it survives renames and moves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<InstancePath>,
}

/// Why a target could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    Missing,
    Unresolved(String),
}

impl Target {
    #[must_use]
    pub fn by_id(id: InstanceId) -> Self {
        Self {
            target_id: Some(id),
            target_path: None,
        }
    }

    #[must_use]
    pub fn by_path(path: InstancePath) -> Self {
        Self {
            target_id: None,
            target_path: Some(path),
        }
    }

    /// Current path of the addressed instance.
    pub fn resolve(&self, tree: &TreeStore) -> Result<InstancePath, TargetError> {
        match (&self.target_id, &self.target_path) {
            (Some(id), _) => tree
                .get_path_by_id(id)
                .cloned()
                .ok_or_else(|| TargetError::Unresolved(format!("instance not found: {id}"))),
            (None, Some(path)) if path.is_root() => {
                Err(TargetError::Unresolved("the root is not an instance".to_string()))
            }
            (None, Some(path)) => tree
                .get_instance(path)
                .map(|_| path.clone())
                .ok_or_else(|| TargetError::Unresolved(format!("path not found: {path}"))),
            (None, None) => Err(TargetError::Missing),
        }
    }

    fn write_ref(&self, out: &mut Map<String, Value>) {
        if let Some(id) = &self.target_id {
            out.insert("targetId".into(), json!(id));
        }
        if let Some(path) = &self.target_path {
            out.insert("targetPath".into(), json!(path));
        }
    }
}

/// One mutation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Command {
    Create {
        parent_path: InstancePath,
        class_name: String,
        name: String,
        #[serde(default)]
        properties: BTreeMap<String, PropertyValue>,
    },
    Update {
        #[serde(flatten)]
        target: Target,
        property: String,
        value: PropertyValue,
    },
    Rename {
        #[serde(flatten)]
        target: Target,
        name: String,
    },
    Delete {
        #[serde(flatten)]
        target: Target,
    },
    Reparent {
        #[serde(flatten)]
        target: Target,
        new_parent_path: InstancePath,
    },
}

impl Command {
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Rename { .. } => "rename",
            Self::Delete { .. } => "delete",
            Self::Reparent { .. } => "reparent",
        }
    }

    #[must_use]
    pub const fn target(&self) -> Option<&Target> {
        match self {
            Self::Create { .. } => None,
            Self::Update { target, .. }
            | Self::Rename { target, .. }
            | Self::Delete { target }
            | Self::Reparent { target, .. } => Some(target),
        }
    }

    /// Checks that need no tree state: names, class name, property values.
    ///
    /// # Errors
    ///
    /// Returns the `TreeError` the store would raise for the same input.
    pub fn validate_shape(&self) -> Result<(), TreeError> {
        match self {
            Self::Create {
                class_name,
                name,
                properties,
                ..
            } => {
                if class_name.trim().is_empty() {
                    return Err(TreeError::InvalidValue {
                        property: CLASS_NAME_PROPERTY.to_string(),
                        reason: "className cannot be empty".to_string(),
                    });
                }
                validate_instance_name(name)?;
                properties
                    .iter()
                    .try_for_each(|(key, value)| check_property(key, value))
            }
            Self::Update {
                property, value, ..
            } if property == NAME_PROPERTY => {
                let name = value.as_str().ok_or_else(|| TreeError::InvalidValue {
                    property: property.clone(),
                    reason: "Name must be a string".to_string(),
                })?;
                validate_instance_name(name).map_err(TreeError::from)
            }
            Self::Update {
                property, value, ..
            } => check_property(property, value),
            Self::Rename { name, .. } => validate_instance_name(name).map_err(TreeError::from),
            Self::Delete { .. } | Self::Reparent { .. } => Ok(()),
        }
    }

    /// The caller's identifying fields, echoed as `expected` in conflicts.
    #[must_use]
    pub fn expected_ref(&self) -> Value {
        let mut out = Map::new();
        out.insert("op".into(), json!(self.op()));
        if let Some(target) = self.target() {
            target.write_ref(&mut out);
        }
        match self {
            Self::Create {
                parent_path, name, ..
            } => {
                out.insert("parentPath".into(), json!(parent_path));
                out.insert("name".into(), json!(name));
            }
            Self::Update { property, .. } => {
                out.insert("property".into(), json!(property));
            }
            Self::Rename { name, .. } => {
                out.insert("name".into(), json!(name));
            }
            Self::Delete { .. } => {}
            Self::Reparent {
                new_parent_path, ..
            } => {
                out.insert("newParentPath".into(), json!(new_parent_path));
            }
        }
        Value::Object(out)
    }
}

fn check_property(key: &str, value: &PropertyValue) -> Result<(), TreeError> {
    if is_reserved_property(key) {
        return Err(TreeError::ReadOnlyProperty(key.to_string()));
    }
    value
        .check_writable()
        .map_err(|reason| TreeError::InvalidValue {
            property: key.to_string(),
            reason,
        })
}

/// Best-effort `expected` for input that did not parse as a [`Command`].
#[must_use]
pub fn expected_ref_from_raw(raw: &Value) -> Value {
    let mut out = Map::new();
    if let Some(object) = raw.as_object() {
        for key in ["op", "targetId", "targetPath", "parentPath", "name", "property", "newParentPath"] {
            if let Some(value) = object.get(key) {
                out.insert(key.to_string(), value.clone());
            }
        }
    }
    Value::Object(out)
}

/// Body of a single-command request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<u64>,
    /// Kept raw so a stale revision short-circuits before the body is parsed.
    #[serde(default)]
    pub command: Value,
}

/// Body of a batch request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_revision: Option<u64>,
    #[serde(default)]
    pub transactional: bool,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub commands: Vec<Value>,
}

/// How a batch treats failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Snapshot first; roll back on the first failure.
    Transactional,
    /// Run everything; report partial success.
    ContinueOnError,
    /// Stop at the first failure, keep what was applied.
    StopOnError,
}

impl BatchRequest {
    /// Transactional wins when both flags are set.
    #[must_use]
    pub const fn mode(&self) -> BatchMode {
        if self.transactional {
            BatchMode::Transactional
        } else if self.continue_on_error {
            BatchMode::ContinueOnError
        } else {
            BatchMode::StopOnError
        }
    }
}
