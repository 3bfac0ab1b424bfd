//! Instance records owned by the tree store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{InstanceId, InstancePath, PropertyValue};

/// Property keys that are part of the instance record itself, never of the
/// free-form property map.
pub const NAME_PROPERTY: &str = "Name";
pub const CLASS_NAME_PROPERTY: &str = "ClassName";
pub const PARENT_PROPERTY: &str = "Parent";

/// True for keys that address record fields rather than the property map.
#[must_use]
pub fn is_reserved_property(key: &str) -> bool {
    matches!(key, NAME_PROPERTY | CLASS_NAME_PROPERTY | PARENT_PROPERTY)
}

/// One node of the scene graph.
///
/// Only the tree store constructs or mutates these; everything else sees
/// shared references or clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: InstanceId,
    pub class_name: String,
    pub name: String,
    pub parent: Option<InstanceId>,
    pub properties: BTreeMap<String, PropertyValue>,
    /// Insertion order; significant for read models, not for identity.
    pub children: Vec<InstanceId>,
}

/// Payload of a `create` change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInstance {
    /// Caller-chosen id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InstanceId>,
    pub class_name: String,
    pub name: String,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// One instance as reported by the engine bridge during a full resync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncRecord {
    pub id: InstanceId,
    pub class_name: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<InstanceId>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

/// Flattened `(path, instance)` pair of the indexed view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedInstance {
    pub path: InstancePath,
    pub instance: Instance,
}
