//! Change messages flowing into and out of the tree store.
//!
//! - [`ChangeMessage`]: a requested mutation (from the filesystem projection,
//!   the command pipeline, or a test).
//! - [`ChangeEvent`]: what actually happened, broadcast to observers. Paths
//!   address the target as it was immediately before the event; names are the
//!   resolved names, never the requested ones.
//! - [`PendingChange`]: a message rewritten with resolved names and queued
//!   for the engine bridge, which polls slower than everyone else.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::instance::{Instance, NewInstance, NAME_PROPERTY};
use crate::domain::{InstanceId, InstancePath, PropertyValue};

/// Requested mutation at a target path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeMessage {
    Create {
        #[serde(rename = "parentPath")]
        parent_path: InstancePath,
        instance: NewInstance,
    },
    Update {
        path: InstancePath,
        property: String,
        value: PropertyValue,
    },
    Delete {
        path: InstancePath,
    },
    Reparent {
        path: InstancePath,
        #[serde(rename = "newParentPath")]
        new_parent_path: InstancePath,
        /// Desired name at the destination; defaults to the current name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ChangeMessage {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Reparent { .. } => "reparent",
        }
    }
}

/// Which collaborator a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeOrigin {
    /// The engine-side bridge. Never echoed back as a pending change.
    Bridge,
    /// The filesystem projection.
    Projection,
    /// The agent/editor command surface.
    Agent,
}

impl ChangeOrigin {
    #[must_use]
    pub const fn needs_bridge_delivery(self) -> bool {
        !matches!(self, Self::Bridge)
    }
}

/// Observable change, in application order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChangeEvent {
    Create {
        id: InstanceId,
        path: InstancePath,
        instance: Instance,
    },
    Update {
        id: InstanceId,
        path: InstancePath,
        property: String,
        /// `None` when a resync removed the property.
        value: Option<PropertyValue>,
    },
    Delete {
        id: InstanceId,
        path: InstancePath,
    },
    Reparent {
        id: InstanceId,
        path: InstancePath,
        new_parent_path: InstancePath,
        name: String,
    },
}

impl ChangeEvent {
    #[must_use]
    pub const fn id(&self) -> &InstanceId {
        match self {
            Self::Create { id, .. }
            | Self::Update { id, .. }
            | Self::Delete { id, .. }
            | Self::Reparent { id, .. } => id,
        }
    }
}

/// A change queued for the engine bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub sequence: u64,
    pub target: InstanceId,
    pub message: ChangeMessage,
}

impl PendingChange {
    fn coalesce_key(&self) -> Option<(&InstanceId, &str)> {
        match &self.message {
            // Renames are structural: later pending paths depend on them.
            ChangeMessage::Update { property, .. } if property != NAME_PROPERTY => {
                Some((&self.target, property.as_str()))
            }
            _ => None,
        }
    }
}

/// FIFO of changes awaiting bridge delivery.
///
/// Property updates coalesce in place: a newer value for the same property of
/// the same target replaces the queued one and keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    entries: Vec<PendingChange>,
    next_sequence: u64,
}

impl PendingChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a change, coalescing with an earlier update of the same property.
    pub fn push(&mut self, target: InstanceId, message: ChangeMessage) {
        let change = PendingChange {
            sequence: self.next_sequence,
            target,
            message,
        };
        self.next_sequence += 1;

        let existing = change.coalesce_key().and_then(|key| {
            self.entries
                .iter()
                .position(|queued| queued.coalesce_key() == Some(key))
        });

        match existing {
            Some(index) => {
                if let (
                    ChangeMessage::Update { value: queued, .. },
                    ChangeMessage::Update { value, .. },
                ) = (&mut self.entries[index].message, change.message)
                {
                    *queued = value;
                }
            }
            None => self.entries.push(change),
        }
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain(&mut self) -> Vec<PendingChange> {
        std::mem::take(&mut self.entries)
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, PendingChange> {
        self.entries.iter()
    }
}

/// Result of a successful `apply_change`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedChange {
    pub kind: &'static str,
    pub id: InstanceId,
    /// Resulting path (for deletes, the removed path).
    pub path: InstancePath,
    /// Name actually applied, after collision resolution.
    pub name: String,
    pub revision: u64,
}

/// Outcome of `apply_change`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    Applied(AppliedChange),
    /// The change was tolerated but not applied (create under a vanished parent).
    Dropped { reason: String },
}
