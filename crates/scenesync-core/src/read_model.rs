//! Derived read models: the flattened snapshot and the observed schema.
//!
//! Both are built from the store's indexed view, so they are consistent with
//! a single revision.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::Serialize;

use crate::{
    domain::{InstanceId, InstancePath, PropertyKind, PropertyValue, MAX_NAME_LEN},
    tree::{IndexedInstance, CLASS_NAME_PROPERTY, NAME_PROPERTY},
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SNAPSHOT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInstance {
    pub id: InstanceId,
    pub class_name: String,
    pub name: String,
    pub path: InstancePath,
    pub path_string: String,
    /// `None` when the parent path is not itself indexed (top-level nodes).
    pub parent_id: Option<InstanceId>,
    pub child_ids: Vec<InstanceId>,
    pub properties: BTreeMap<String, PropertyValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub instances: Vec<SnapshotInstance>,
}

/// Flatten the indexed view into the snapshot read model.
#[must_use]
pub fn build_snapshot(
    indexed: &[IndexedInstance],
    revision: u64,
    generated_at: DateTime<Utc>,
) -> SnapshotView {
    let by_path: HashMap<&InstancePath, &InstanceId> = indexed
        .iter()
        .map(|entry| (&entry.path, &entry.instance.id))
        .collect();
    let ids: HashSet<&InstanceId> = by_path.values().copied().collect();

    let instances = indexed
        .iter()
        .map(|entry| {
            let parent_id = entry
                .path
                .parent()
                .and_then(|parent| by_path.get(&parent).map(|id| (*id).clone()));
            SnapshotInstance {
                id: entry.instance.id.clone(),
                class_name: entry.instance.class_name.clone(),
                name: entry.instance.name.clone(),
                path: entry.path.clone(),
                path_string: entry.path.path_string(),
                parent_id,
                child_ids: entry
                    .instance
                    .children
                    .iter()
                    .filter(|child| ids.contains(child))
                    .cloned()
                    .collect(),
                properties: entry.instance.properties.clone(),
            }
        })
        .collect();

    SnapshotView {
        revision,
        generated_at,
        instances,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SCHEMA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Constraints observed for one property.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Constraints {
    Number {
        min: f64,
        max: f64,
    },
    #[serde(rename_all = "camelCase")]
    String {
        max_length: usize,
    },
    #[serde(rename_all = "camelCase")]
    Enum {
        enum_type: String,
        options: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Struct {
        type_name: String,
        fields: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    pub kind: PropertyKind,
    pub writable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Constraints>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchema {
    pub instance_count: usize,
    pub properties: BTreeMap<String, PropertySchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaView {
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub classes: BTreeMap<String, ClassSchema>,
}

/// Everything seen for one `(class, property)` pair.
#[derive(Debug, Default)]
struct Observed<'a> {
    values: Vec<&'a PropertyValue>,
}

impl Observed<'_> {
    fn into_schema(self) -> PropertySchema {
        let shapes_agree = self
            .values
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.same_shape(b));
        let Some(first) = self.values.first().filter(|_| shapes_agree) else {
            return PropertySchema {
                kind: PropertyKind::Mixed,
                writable: false,
                constraints: None,
            };
        };

        let kind = first.kind();
        let constraints = match first {
            PropertyValue::Bool(_) | PropertyValue::Unsupported { .. } => None,
            PropertyValue::Number(_) => {
                let numbers = self.values.iter().filter_map(|value| match value {
                    PropertyValue::Number(n) => Some(*n),
                    _ => None,
                });
                numbers
                    .minmax_by(f64::total_cmp)
                    .into_option()
                    .map(|(min, max)| Constraints::Number { min, max })
            }
            PropertyValue::String(_) => Some(Constraints::String {
                max_length: self
                    .values
                    .iter()
                    .filter_map(|value| value.as_str())
                    .map(|s| s.chars().count())
                    .max()
                    .unwrap_or(0),
            }),
            PropertyValue::Enum { enum_type, .. } => Some(Constraints::Enum {
                enum_type: enum_type.clone(),
                options: self
                    .values
                    .iter()
                    .filter_map(|value| match value {
                        PropertyValue::Enum { item, .. } => Some(item.clone()),
                        _ => None,
                    })
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            }),
            PropertyValue::Struct { type_name, .. } => Some(Constraints::Struct {
                type_name: type_name.clone(),
                fields: self
                    .values
                    .iter()
                    .filter_map(|value| match value {
                        PropertyValue::Struct { fields, .. } => Some(fields.keys().cloned()),
                        _ => None,
                    })
                    .flatten()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            }),
        };

        PropertySchema {
            kind,
            writable: !matches!(kind, PropertyKind::Unsupported | PropertyKind::Mixed),
            constraints,
        }
    }
}

fn record_schema(writable: bool, max_length: usize) -> PropertySchema {
    PropertySchema {
        kind: PropertyKind::String,
        writable,
        constraints: Some(Constraints::String { max_length }),
    }
}

/// Derive per-class property metadata from the instances currently observed.
#[must_use]
pub fn build_schema(
    indexed: &[IndexedInstance],
    class_filter: Option<&str>,
    revision: u64,
    generated_at: DateTime<Utc>,
) -> SchemaView {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut observed: BTreeMap<(&str, &str), Observed<'_>> = BTreeMap::new();

    for entry in indexed {
        let class = entry.instance.class_name.as_str();
        if class_filter.is_some_and(|filter| filter != class) {
            continue;
        }
        *counts.entry(class).or_default() += 1;
        for (key, value) in &entry.instance.properties {
            observed
                .entry((class, key.as_str()))
                .or_default()
                .values
                .push(value);
        }
    }

    let mut classes: BTreeMap<String, ClassSchema> = counts
        .into_iter()
        .map(|(class, instance_count)| {
            let mut properties = BTreeMap::new();
            properties.insert(NAME_PROPERTY.to_string(), record_schema(true, MAX_NAME_LEN));
            properties.insert(
                CLASS_NAME_PROPERTY.to_string(),
                record_schema(false, class.chars().count()),
            );
            (
                class.to_string(),
                ClassSchema {
                    instance_count,
                    properties,
                },
            )
        })
        .collect();

    for ((class, key), seen) in observed {
        if let Some(schema) = classes.get_mut(class) {
            schema.properties.insert(key.to_string(), seen.into_schema());
        }
    }

    SchemaView {
        revision,
        generated_at,
        classes,
    }
}
