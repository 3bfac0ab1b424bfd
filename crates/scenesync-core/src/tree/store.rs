//! Authoritative scene-graph store.
//!
//! The tree is an arena of [`Instance`]s keyed by id, with ordered child-id
//! lists instead of back-pointers. Paths are derived from ancestor names and
//! cached in a bidirectional index (`path -> id`, `id -> path`) that every
//! mutation keeps exactly in sync with the arena.
//!
//! All maps are persistent (`im`), so a snapshot is a structural-sharing
//! value copy and restoring it is a pointer swap.
//!
//! # Invariants
//!
//! - Siblings never share a name.
//! - The index and a fresh traversal agree on every `(path, id)` pair.
//! - Every applied mutation bumps the revision by exactly one.
//! - Mutations run to completion; no partial mutation is observable.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use tracing::{debug, warn};

use super::{
    change::{AppliedChange, ChangeEvent, ChangeMessage, ChangeOrigin, ChangeOutcome, PendingChange, PendingChanges},
    error::TreeError,
    instance::{
        is_reserved_property, IndexedInstance, Instance, NewInstance, CLASS_NAME_PROPERTY,
        NAME_PROPERTY, PARENT_PROPERTY,
    },
    name_resolver::resolve_name,
};
use crate::domain::{validate_instance_name, InstanceId, InstancePath, PropertyValue};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TREE STATE (arena + index + revision)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, PartialEq)]
pub(super) struct TreeState {
    pub(super) nodes: im::HashMap<InstanceId, Instance>,
    pub(super) roots: Vec<InstanceId>,
    pub(super) paths: im::HashMap<InstancePath, InstanceId>,
    pub(super) ids: im::HashMap<InstanceId, InstancePath>,
    pub(super) revision: u64,
}

impl TreeState {
    pub(super) fn children(&self, parent: Option<&InstanceId>) -> &[InstanceId] {
        match parent {
            None => &self.roots,
            Some(id) => self
                .nodes
                .get(id)
                .map_or(&[][..], |node| node.children.as_slice()),
        }
    }

    /// Names of the children of `parent`, skipping `exclude`.
    pub(super) fn sibling_names(
        &self,
        parent: Option<&InstanceId>,
        exclude: Option<&InstanceId>,
    ) -> Vec<&str> {
        self.children(parent)
            .iter()
            .filter(|child| Some(*child) != exclude)
            .filter_map(|child| self.nodes.get(child))
            .map(|node| node.name.as_str())
            .collect()
    }

    /// `Some(None)` for the root, `Some(Some(id))` for a live path.
    fn resolve_parent(&self, parent_path: &InstancePath) -> Option<Option<InstanceId>> {
        if parent_path.is_root() {
            Some(None)
        } else {
            self.paths.get(parent_path).cloned().map(Some)
        }
    }

    fn attach(&mut self, id: &InstanceId, parent: Option<&InstanceId>) {
        match parent {
            None => self.roots.push(id.clone()),
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(parent_id) {
                    parent_node.children.push(id.clone());
                }
            }
        }
    }

    fn detach(&mut self, id: &InstanceId, parent: Option<&InstanceId>) {
        match parent {
            None => self.roots.retain(|root| root != id),
            Some(parent_id) => {
                if let Some(parent_node) = self.nodes.get_mut(parent_id) {
                    parent_node.children.retain(|child| child != id);
                }
            }
        }
    }

    /// Insert a childless node whose name is already resolved.
    pub(super) fn insert(&mut self, parent_path: &InstancePath, node: Instance) -> InstancePath {
        let id = node.id.clone();
        let path = parent_path.child(node.name.clone());
        let parent = node.parent.clone();
        self.nodes.insert(id.clone(), node);
        self.attach(&id, parent.as_ref());
        self.paths.insert(path.clone(), id.clone());
        self.ids.insert(id, path.clone());
        path
    }

    /// Ids of `root` and all its descendants, preorder.
    fn subtree_ids(&self, root: &InstanceId) -> Vec<InstanceId> {
        let mut out = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(id);
        }
        out
    }

    pub(super) fn remove_subtree(&mut self, id: &InstanceId) -> Option<Instance> {
        let removed = self.nodes.get(id)?.clone();
        self.detach(id, removed.parent.as_ref());
        for member in self.subtree_ids(id) {
            if let Some(path) = self.ids.remove(&member) {
                self.paths.remove(&path);
            }
            self.nodes.remove(&member);
        }
        Some(removed)
    }

    /// Put `id` under `parent` as `name` (already resolved) and re-derive the
    /// subtree's paths. A changed parent appends to its child list.
    pub(super) fn relocate(
        &mut self,
        id: &InstanceId,
        parent: Option<&InstanceId>,
        name: &str,
    ) -> Option<InstancePath> {
        let parent_path = match parent {
            None => InstancePath::root(),
            Some(parent_id) => self.ids.get(parent_id)?.clone(),
        };
        let old_parent = self.nodes.get(id)?.parent.clone();
        if old_parent.as_ref() != parent {
            self.detach(id, old_parent.as_ref());
            self.attach(id, parent);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = parent.cloned();
            node.name = name.to_string();
        }
        let new_path = parent_path.child(name);
        self.reindex_subtree(id, &new_path);
        Some(new_path)
    }

    /// Re-derive the paths of `id`'s subtree after a rename or move.
    fn reindex_subtree(&mut self, id: &InstanceId, new_path: &InstancePath) {
        let Some(old_path) = self.ids.get(id).cloned() else {
            return;
        };
        let moves: Vec<(InstanceId, InstancePath)> = self
            .subtree_ids(id)
            .into_iter()
            .filter_map(|member| {
                self.ids
                    .get(&member)
                    .and_then(|path| path.rebase(&old_path, new_path))
                    .map(|path| (member, path))
            })
            .collect();

        for (member, _) in &moves {
            if let Some(path) = self.ids.get(member) {
                self.paths.remove(path);
            }
        }
        for (member, path) in moves {
            self.paths.insert(path.clone(), member.clone());
            self.ids.insert(member, path);
        }
    }

    /// Preorder traversal with paths derived from names, not from the index.
    pub(super) fn traverse(&self) -> Vec<(InstancePath, InstanceId)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(InstancePath, InstanceId)> = self
            .roots
            .iter()
            .rev()
            .filter_map(|id| {
                self.nodes
                    .get(id)
                    .map(|node| (InstancePath::root().child(node.name.clone()), id.clone()))
            })
            .collect();

        while let Some((path, id)) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                for child in node.children.iter().rev() {
                    if let Some(child_node) = self.nodes.get(child) {
                        stack.push((path.child(child_node.name.clone()), child.clone()));
                    }
                }
            }
            out.push((path, id));
        }
        out
    }

    fn check_invariants(&self) -> Result<(), String> {
        let traversal = self.traverse();
        if traversal.len() != self.nodes.len() {
            return Err(format!(
                "{} nodes reachable but {} stored",
                traversal.len(),
                self.nodes.len()
            ));
        }
        if self.ids.len() != self.nodes.len() || self.paths.len() != self.nodes.len() {
            return Err(format!(
                "index sizes diverged: {} ids, {} paths, {} nodes",
                self.ids.len(),
                self.paths.len(),
                self.nodes.len()
            ));
        }
        for (path, id) in &traversal {
            if self.ids.get(id) != Some(path) || self.paths.get(path) != Some(id) {
                return Err(format!("index disagrees with traversal at {path} ({id})"));
            }
        }

        let parents = std::iter::once(None).chain(self.nodes.keys().map(Some));
        for parent in parents {
            let mut seen = HashSet::new();
            for child in self.children(parent) {
                let Some(node) = self.nodes.get(child) else {
                    return Err(format!("dangling child id {child}"));
                };
                if node.parent.as_ref() != parent {
                    return Err(format!("parent pointer of {child} is stale"));
                }
                if !seen.insert(node.name.as_str()) {
                    return Err(format!("duplicate sibling name '{}'", node.name));
                }
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SNAPSHOT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Full copy of the tree, index, revision, and undelivered changes.
///
/// Used for in-request rollback only; it is not a durability mechanism.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    state: TreeState,
    pending: PendingChanges,
    outbox_len: usize,
}

impl TreeSnapshot {
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.state.revision
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TREE STORE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Single source of truth for the scene graph.
#[derive(Debug, Default)]
pub struct TreeStore {
    pub(super) state: TreeState,
    pending: PendingChanges,
    pub(super) outbox: Vec<ChangeEvent>,
    indexed: OnceLock<Arc<[IndexedInstance]>>,
}

impl TreeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.state.revision
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.nodes.is_empty()
    }

    #[must_use]
    pub fn get_instance(&self, path: &InstancePath) -> Option<&Instance> {
        self.state
            .paths
            .get(path)
            .and_then(|id| self.state.nodes.get(id))
    }

    #[must_use]
    pub fn get_instance_by_id(&self, id: &InstanceId) -> Option<&Instance> {
        self.state.nodes.get(id)
    }

    #[must_use]
    pub fn get_path_by_id(&self, id: &InstanceId) -> Option<&InstancePath> {
        self.state.ids.get(id)
    }

    #[must_use]
    pub fn get_id_by_path(&self, path: &InstancePath) -> Option<&InstanceId> {
        self.state.paths.get(path)
    }

    /// True when the path is the root or a live instance.
    #[must_use]
    pub fn path_exists(&self, path: &InstancePath) -> bool {
        self.state.resolve_parent(path).is_some()
    }

    /// Every `(path, id)` pair from a fresh traversal (ignores the index).
    #[must_use]
    pub fn traverse(&self) -> Vec<(InstancePath, InstanceId)> {
        self.state.traverse()
    }

    /// Verify sibling uniqueness and index/tree agreement.
    ///
    /// # Errors
    ///
    /// Returns a description of the first divergence found.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.state.check_invariants()
    }

    pub(super) fn debug_assert_consistent(&self) {
        debug_assert!(
            self.state.check_invariants().is_ok(),
            "tree invariant violated: {:?}",
            self.state.check_invariants()
        );
    }

    pub(super) fn bump(&mut self) -> u64 {
        self.state.revision += 1;
        self.indexed = OnceLock::new();
        self.state.revision
    }

    // ─── Read models ─────────────────────────────────────────────────────

    /// Flattened preorder `(path, instance)` view.
    ///
    /// Cached per revision: repeated calls without an intervening mutation
    /// return the same allocation.
    pub fn get_indexed_instances(&self) -> Arc<[IndexedInstance]> {
        Arc::clone(self.indexed.get_or_init(|| {
            self.state
                .traverse()
                .into_iter()
                .filter_map(|(path, id)| {
                    self.state.nodes.get(&id).map(|instance| IndexedInstance {
                        path,
                        instance: instance.clone(),
                    })
                })
                .collect::<Vec<_>>()
                .into()
        }))
    }

    // ─── Snapshots ───────────────────────────────────────────────────────

    #[must_use]
    pub fn create_snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            state: self.state.clone(),
            pending: self.pending.clone(),
            outbox_len: self.outbox.len(),
        }
    }

    /// Restore exactly: tree, index, revision, and the change queues.
    pub fn restore_snapshot(&mut self, snapshot: &TreeSnapshot) {
        self.state = snapshot.state.clone();
        self.pending = snapshot.pending.clone();
        self.outbox.truncate(snapshot.outbox_len);
        self.indexed = OnceLock::new();
        debug!(revision = self.state.revision, "Restored tree snapshot");
    }

    // ─── Change delivery ─────────────────────────────────────────────────

    /// Drain observable events, oldest first.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.outbox)
    }

    #[must_use]
    pub const fn pending_changes(&self) -> &PendingChanges {
        &self.pending
    }

    /// Drain changes awaiting the engine bridge, oldest first.
    pub fn take_pending_changes(&mut self) -> Vec<PendingChange> {
        self.pending.drain()
    }

    // ─── Mutations ───────────────────────────────────────────────────────

    /// Apply one change to completion.
    ///
    /// A create under a parent that no longer resolves is dropped, not
    /// rejected: collaborators race against deletes and must not insert
    /// orphans. Every other unresolved target is an error.
    ///
    /// # Errors
    ///
    /// Returns `TreeError` when the target is missing, the move would create
    /// a cycle, or the name/value is invalid. The tree is untouched on error.
    pub fn apply_change(
        &mut self,
        message: ChangeMessage,
        origin: ChangeOrigin,
    ) -> Result<ChangeOutcome, TreeError> {
        let outcome = match message {
            ChangeMessage::Create {
                parent_path,
                instance,
            } => self.apply_create(parent_path, instance, origin)?,
            ChangeMessage::Update {
                path,
                property,
                value,
            } => ChangeOutcome::Applied(self.apply_update(&path, property, value, origin)?),
            ChangeMessage::Delete { path } => {
                ChangeOutcome::Applied(self.apply_delete(&path, origin)?)
            }
            ChangeMessage::Reparent {
                path,
                new_parent_path,
                name,
            } => ChangeOutcome::Applied(self.apply_reparent(&path, new_parent_path, name, origin)?),
        };
        self.debug_assert_consistent();
        Ok(outcome)
    }

    fn lookup(&self, path: &InstancePath) -> Result<InstanceId, TreeError> {
        self.state
            .paths
            .get(path)
            .cloned()
            .ok_or_else(|| TreeError::PathNotFound(path.clone()))
    }

    fn apply_create(
        &mut self,
        parent_path: InstancePath,
        instance: NewInstance,
        origin: ChangeOrigin,
    ) -> Result<ChangeOutcome, TreeError> {
        let Some(parent) = self.state.resolve_parent(&parent_path) else {
            warn!(
                parent = %parent_path,
                name = %instance.name,
                %origin,
                "Dropping create under missing parent"
            );
            return Ok(ChangeOutcome::Dropped {
                reason: format!("parent {parent_path} does not exist"),
            });
        };

        validate_instance_name(&instance.name)?;
        for (key, value) in &instance.properties {
            if is_reserved_property(key) {
                return Err(TreeError::ReadOnlyProperty(key.clone()));
            }
            value
                .check_writable()
                .map_err(|reason| TreeError::InvalidValue {
                    property: key.clone(),
                    reason,
                })?;
        }

        let id = instance.id.clone().unwrap_or_else(InstanceId::generate);
        if self.state.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateId(id));
        }

        let resolved = resolve_name(
            &instance.name,
            self.state.sibling_names(parent.as_ref(), None),
        );
        let node = Instance {
            id: id.clone(),
            class_name: instance.class_name.clone(),
            name: resolved.clone(),
            parent,
            properties: instance.properties.clone(),
            children: Vec::new(),
        };
        let path = self.state.insert(&parent_path, node.clone());
        let revision = self.bump();

        self.outbox.push(ChangeEvent::Create {
            id: id.clone(),
            path: path.clone(),
            instance: node,
        });
        if origin.needs_bridge_delivery() {
            self.pending.push(
                id.clone(),
                ChangeMessage::Create {
                    parent_path,
                    instance: NewInstance {
                        id: Some(id.clone()),
                        name: resolved.clone(),
                        ..instance
                    },
                },
            );
        }

        debug!(%id, %path, revision, %origin, "Created instance");
        Ok(ChangeOutcome::Applied(AppliedChange {
            kind: "create",
            id,
            path,
            name: resolved,
            revision,
        }))
    }

    fn apply_update(
        &mut self,
        path: &InstancePath,
        property: String,
        value: PropertyValue,
        origin: ChangeOrigin,
    ) -> Result<AppliedChange, TreeError> {
        let id = self.lookup(path)?;
        match property.as_str() {
            NAME_PROPERTY => {
                let desired = value
                    .as_str()
                    .ok_or_else(|| TreeError::InvalidValue {
                        property: property.clone(),
                        reason: "Name must be a string".to_string(),
                    })?
                    .to_string();
                return self.rename(id, path, desired, origin);
            }
            CLASS_NAME_PROPERTY | PARENT_PROPERTY => {
                return Err(TreeError::ReadOnlyProperty(property));
            }
            _ => {}
        }

        value
            .check_writable()
            .map_err(|reason| TreeError::InvalidValue {
                property: property.clone(),
                reason,
            })?;

        let node = self
            .state
            .nodes
            .get(&id)
            .ok_or_else(|| TreeError::IdNotFound(id.clone()))?;
        if let Some(existing) = node.properties.get(&property) {
            if !existing.same_shape(&value) {
                return Err(TreeError::InvalidValue {
                    property,
                    reason: format!("expected a {} value", existing.kind()),
                });
            }
        }
        let name = node.name.clone();

        if let Some(node) = self.state.nodes.get_mut(&id) {
            node.properties.insert(property.clone(), value.clone());
        }
        let revision = self.bump();

        self.outbox.push(ChangeEvent::Update {
            id: id.clone(),
            path: path.clone(),
            property: property.clone(),
            value: Some(value.clone()),
        });
        if origin.needs_bridge_delivery() {
            self.pending.push(
                id.clone(),
                ChangeMessage::Update {
                    path: path.clone(),
                    property: property.clone(),
                    value,
                },
            );
        }

        debug!(%id, %path, %property, revision, "Updated property");
        Ok(AppliedChange {
            kind: "update",
            id,
            path: path.clone(),
            name,
            revision,
        })
    }

    /// `Name` updates are structural: re-resolve and re-derive descendants.
    fn rename(
        &mut self,
        id: InstanceId,
        path: &InstancePath,
        desired: String,
        origin: ChangeOrigin,
    ) -> Result<AppliedChange, TreeError> {
        validate_instance_name(&desired)?;
        let parent = self
            .state
            .nodes
            .get(&id)
            .ok_or_else(|| TreeError::IdNotFound(id.clone()))?
            .parent
            .clone();
        let resolved = resolve_name(
            &desired,
            self.state.sibling_names(parent.as_ref(), Some(&id)),
        );
        let new_path = path.parent().unwrap_or_default().child(resolved.clone());

        if let Some(node) = self.state.nodes.get_mut(&id) {
            node.name.clone_from(&resolved);
        }
        self.state.reindex_subtree(&id, &new_path);
        let revision = self.bump();

        let value = PropertyValue::String(resolved.clone());
        self.outbox.push(ChangeEvent::Update {
            id: id.clone(),
            path: path.clone(),
            property: NAME_PROPERTY.to_string(),
            value: Some(value.clone()),
        });
        if origin.needs_bridge_delivery() {
            self.pending.push(
                id.clone(),
                ChangeMessage::Update {
                    path: path.clone(),
                    property: NAME_PROPERTY.to_string(),
                    value,
                },
            );
        }

        debug!(%id, from = %path, to = %new_path, revision, "Renamed instance");
        Ok(AppliedChange {
            kind: "update",
            id,
            path: new_path,
            name: resolved,
            revision,
        })
    }

    fn apply_delete(
        &mut self,
        path: &InstancePath,
        origin: ChangeOrigin,
    ) -> Result<AppliedChange, TreeError> {
        let id = self.lookup(path)?;
        let removed = self
            .state
            .remove_subtree(&id)
            .ok_or_else(|| TreeError::IdNotFound(id.clone()))?;
        let revision = self.bump();

        self.outbox.push(ChangeEvent::Delete {
            id: id.clone(),
            path: path.clone(),
        });
        if origin.needs_bridge_delivery() {
            self.pending
                .push(id.clone(), ChangeMessage::Delete { path: path.clone() });
        }

        debug!(%id, %path, revision, "Deleted subtree");
        Ok(AppliedChange {
            kind: "delete",
            id,
            path: path.clone(),
            name: removed.name,
            revision,
        })
    }

    fn apply_reparent(
        &mut self,
        path: &InstancePath,
        new_parent_path: InstancePath,
        name: Option<String>,
        origin: ChangeOrigin,
    ) -> Result<AppliedChange, TreeError> {
        let id = self.lookup(path)?;
        if new_parent_path == *path || new_parent_path.is_descendant_of(path) {
            return Err(TreeError::Cycle {
                path: path.clone(),
                new_parent_path,
            });
        }
        let new_parent = self
            .state
            .resolve_parent(&new_parent_path)
            .ok_or_else(|| TreeError::PathNotFound(new_parent_path.clone()))?;

        let node = self
            .state
            .nodes
            .get(&id)
            .ok_or_else(|| TreeError::IdNotFound(id.clone()))?;
        let old_parent = node.parent.clone();
        let desired = name.unwrap_or_else(|| node.name.clone());
        validate_instance_name(&desired)?;

        let resolved = resolve_name(
            &desired,
            self.state.sibling_names(new_parent.as_ref(), Some(&id)),
        );

        if old_parent != new_parent {
            self.state.detach(&id, old_parent.as_ref());
            self.state.attach(&id, new_parent.as_ref());
        }
        if let Some(node) = self.state.nodes.get_mut(&id) {
            node.parent.clone_from(&new_parent);
            node.name.clone_from(&resolved);
        }
        let new_path = new_parent_path.child(resolved.clone());
        self.state.reindex_subtree(&id, &new_path);
        let revision = self.bump();

        self.outbox.push(ChangeEvent::Reparent {
            id: id.clone(),
            path: path.clone(),
            new_parent_path: new_parent_path.clone(),
            name: resolved.clone(),
        });
        if origin.needs_bridge_delivery() {
            self.pending.push(
                id.clone(),
                ChangeMessage::Reparent {
                    path: path.clone(),
                    new_parent_path,
                    name: Some(resolved.clone()),
                },
            );
        }

        debug!(%id, from = %path, to = %new_path, revision, "Reparented subtree");
        Ok(AppliedChange {
            kind: "reparent",
            id,
            path: new_path,
            name: resolved,
            revision,
        })
    }
}
