//! Full resync from the engine bridge.
//!
//! The bridge periodically reports every instance it knows. The store
//! rebuilds the target tree from those records, then emits an event stream
//! that, applied in order to the prior tree, reproduces it: moves and
//! renames, then deletes, then creates, then property updates.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::{
    change::ChangeEvent,
    instance::{is_reserved_property, Instance, ResyncRecord, NAME_PROPERTY},
    name_resolver::resolve_name,
    store::{TreeState, TreeStore},
};
use crate::domain::{validate_instance_name, InstanceId, InstancePath, PropertyValue};

/// Summary of one `replace_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResyncReport {
    /// False when the records described the current state exactly.
    pub changed: bool,
    pub revision: u64,
    pub created: usize,
    pub deleted: usize,
    pub moved: usize,
    pub updated: usize,
    /// Records that could not be placed (unknown parent, duplicate id, cycle).
    pub dropped_records: usize,
}

impl TreeStore {
    /// Replace the whole tree with the bridge's view.
    ///
    /// Does not bump the revision when the records describe the current tree,
    /// ignoring sibling order. Never queues pending changes: the bridge
    /// already has them.
    pub fn replace_all(&mut self, records: Vec<ResyncRecord>) -> ResyncReport {
        let (next, dropped_records) = build_state(records, self.state.revision);

        if next == self.state {
            debug!(revision = self.state.revision, "Resync matched current tree");
            return ResyncReport {
                revision: self.state.revision,
                dropped_records,
                ..ResyncReport::default()
            };
        }

        let (state, events) = diff_states(&self.state, &next);
        if events.is_empty() {
            debug!(revision = self.state.revision, "Resync only reordered siblings");
            return ResyncReport {
                revision: self.state.revision,
                dropped_records,
                ..ResyncReport::default()
            };
        }

        let mut report = ResyncReport {
            changed: true,
            dropped_records,
            ..ResyncReport::default()
        };
        for event in &events {
            match event {
                ChangeEvent::Create { .. } => report.created += 1,
                ChangeEvent::Delete { .. } => report.deleted += 1,
                ChangeEvent::Reparent { .. } => report.moved += 1,
                ChangeEvent::Update { property, .. } if property == NAME_PROPERTY => {
                    report.moved += 1;
                }
                ChangeEvent::Update { .. } => report.updated += 1,
            }
        }

        self.state = state;
        report.revision = self.bump();
        self.outbox.extend(events);
        self.debug_assert_consistent();

        info!(
            revision = report.revision,
            created = report.created,
            deleted = report.deleted,
            moved = report.moved,
            updated = report.updated,
            dropped = report.dropped_records,
            "Applied resync"
        );
        report
    }
}

/// Rebuild an arena from flat records, roots and siblings in record order.
fn build_state(records: Vec<ResyncRecord>, revision: u64) -> (TreeState, usize) {
    let total = records.len();
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(total);
    for record in records {
        if seen.insert(record.id.clone()) {
            unique.push(record);
        } else {
            warn!(id = %record.id, "Duplicate id in resync, keeping the first record");
        }
    }

    let mut children: HashMap<Option<InstanceId>, Vec<usize>> = HashMap::new();
    for (index, record) in unique.iter().enumerate() {
        match &record.parent_id {
            Some(parent) if !seen.contains(parent) => {
                warn!(id = %record.id, parent = %parent, "Dropping orphaned resync record");
            }
            parent => children.entry(parent.clone()).or_default().push(index),
        }
    }

    let mut state = TreeState {
        revision,
        ..TreeState::default()
    };

    let mut stack: Vec<(usize, InstancePath)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|&i| (i, InstancePath::root())).collect())
        .unwrap_or_default();

    while let Some((index, parent_path)) = stack.pop() {
        let record = &unique[index];
        let name = if validate_instance_name(&record.name).is_ok() {
            record.name.clone()
        } else {
            warn!(id = %record.id, name = %record.name, "Invalid name in resync, using class name");
            record.class_name.clone()
        };
        let parent = record.parent_id.clone();
        let resolved = resolve_name(&name, state.sibling_names(parent.as_ref(), None));
        let properties = record
            .properties
            .iter()
            .filter(|(key, _)| !is_reserved_property(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let path = state.insert(
            &parent_path,
            Instance {
                id: record.id.clone(),
                class_name: record.class_name.clone(),
                name: resolved,
                parent,
                properties,
                children: Vec::new(),
            },
        );

        if let Some(kids) = children.get(&Some(record.id.clone())) {
            stack.extend(kids.iter().rev().map(|&i| (i, path.clone())));
        }
    }

    let dropped = total - state.nodes.len();
    (state, dropped)
}

/// Ids present in both trees with the same class, reached through a chain
/// of such ids in the new tree. Everything else is deleted and recreated.
fn survivors(old: &TreeState, new: &TreeState) -> HashSet<InstanceId> {
    let mut out = HashSet::new();
    for (_, id) in new.traverse() {
        let (Some(before), Some(after)) = (old.nodes.get(&id), new.nodes.get(&id)) else {
            continue;
        };
        let parent_ok = after.parent.as_ref().map_or(true, |p| out.contains(p));
        if before.class_name == after.class_name && parent_ok {
            out.insert(id);
        }
    }
    out
}

/// Plan the event stream against a scratch copy of the prior state.
///
/// Every event is applied to the scratch tree as it is emitted, so each path
/// it carries addresses the target exactly as an observer holding the prior
/// tree will see it at that point. Returns the scratch tree, which then
/// matches what observers end up with, sibling order included.
fn diff_states(old: &TreeState, new: &TreeState) -> (TreeState, Vec<ChangeEvent>) {
    let surviving = survivors(old, new);
    let order = new.traverse();
    let mut plan = EventPlan {
        target: new,
        scratch: old.clone(),
        events: Vec::new(),
    };

    // Parents first, so every destination already sits at its final path.
    for (_, id) in order.iter().filter(|(_, id)| surviving.contains(id)) {
        plan.place(id);
    }
    plan.delete_doomed(&surviving);
    for (_, id) in order.iter().filter(|(_, id)| !surviving.contains(id)) {
        plan.create(id);
    }
    for (_, id) in order.iter().filter(|(_, id)| surviving.contains(id)) {
        plan.update_properties(id);
    }

    (plan.scratch, plan.events)
}

struct EventPlan<'a> {
    target: &'a TreeState,
    scratch: TreeState,
    events: Vec<ChangeEvent>,
}

impl EventPlan<'_> {
    /// Move or rename a surviving instance to its final parent and name.
    fn place(&mut self, id: &InstanceId) {
        let (Some(current), Some(target)) = (self.scratch.nodes.get(id), self.target.nodes.get(id))
        else {
            return;
        };
        if current.parent == target.parent && current.name == target.name {
            return;
        }
        let from_parent = current.parent.clone();
        let parent = target.parent.clone();
        let name = target.name.clone();

        self.park(parent.as_ref(), &name, id);
        let Some(path) = self.scratch.ids.get(id).cloned() else {
            return;
        };
        let Some(new_path) = self.scratch.relocate(id, parent.as_ref(), &name) else {
            return;
        };

        let event = if from_parent == parent {
            rename_event(id, path, &name)
        } else {
            ChangeEvent::Reparent {
                id: id.clone(),
                path,
                new_parent_path: new_path.parent().unwrap_or_default(),
                name,
            }
        };
        self.events.push(event);
    }

    /// Rename whichever other child of `parent` holds `name` to a free name.
    ///
    /// The holder is either leaving or being deleted; a swap of two sibling
    /// names goes through this temporary name.
    fn park(&mut self, parent: Option<&InstanceId>, name: &str, keep: &InstanceId) {
        let holder = self
            .scratch
            .children(parent)
            .iter()
            .find(|child| {
                *child != keep
                    && self
                        .scratch
                        .nodes
                        .get(*child)
                        .is_some_and(|node| node.name == name)
            })
            .cloned();
        let Some(holder) = holder else {
            return;
        };
        let temporary = resolve_name(name, self.scratch.sibling_names(parent, None));
        let Some(path) = self.scratch.ids.get(&holder).cloned() else {
            return;
        };
        if self.scratch.relocate(&holder, parent, &temporary).is_some() {
            debug!(id = %holder, from = %path, to = %temporary, "Parked instance during resync");
            self.events.push(rename_event(&holder, path, &temporary));
        }
    }

    /// Delete the topmost instances that did not survive.
    ///
    /// Runs after `place`, so no survivor is left inside a doomed subtree.
    fn delete_doomed(&mut self, surviving: &HashSet<InstanceId>) {
        for (path, id) in self.scratch.traverse() {
            let Some(node) = self.scratch.nodes.get(&id) else {
                continue;
            };
            let under_doomed = node
                .parent
                .as_ref()
                .is_some_and(|parent| !surviving.contains(parent));
            if surviving.contains(&id) || under_doomed {
                continue;
            }
            self.scratch.remove_subtree(&id);
            self.events.push(ChangeEvent::Delete { id, path });
        }
    }

    fn create(&mut self, id: &InstanceId) {
        let Some(target) = self.target.nodes.get(id) else {
            return;
        };
        let parent_path = match &target.parent {
            None => InstancePath::root(),
            Some(parent) => match self.scratch.ids.get(parent) {
                Some(path) => path.clone(),
                None => return,
            },
        };
        let instance = Instance {
            children: Vec::new(),
            ..target.clone()
        };
        let path = self.scratch.insert(&parent_path, instance.clone());
        self.events.push(ChangeEvent::Create {
            id: id.clone(),
            path,
            instance,
        });
    }

    fn update_properties(&mut self, id: &InstanceId) {
        let (Some(current), Some(target), Some(path)) = (
            self.scratch.nodes.get(id),
            self.target.nodes.get(id),
            self.scratch.ids.get(id).cloned(),
        ) else {
            return;
        };
        let keys: BTreeSet<&String> = current
            .properties
            .keys()
            .chain(target.properties.keys())
            .collect();
        let changes: Vec<(String, Option<PropertyValue>)> = keys
            .into_iter()
            .filter(|key| current.properties.get(*key) != target.properties.get(*key))
            .map(|key| (key.clone(), target.properties.get(key).cloned()))
            .collect();
        if changes.is_empty() {
            return;
        }

        let properties = target.properties.clone();
        if let Some(node) = self.scratch.nodes.get_mut(id) {
            node.properties = properties;
        }
        self.events
            .extend(changes.into_iter().map(|(property, value)| ChangeEvent::Update {
                id: id.clone(),
                path: path.clone(),
                property,
                value,
            }));
    }
}

fn rename_event(id: &InstanceId, path: InstancePath, name: &str) -> ChangeEvent {
    ChangeEvent::Update {
        id: id.clone(),
        path,
        property: NAME_PROPERTY.to_string(),
        value: Some(PropertyValue::String(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::tree::{
        change::{ChangeMessage, ChangeOrigin},
        error::TreeError,
        instance::NewInstance,
        store::TreeSnapshot,
    };

    fn id(s: &str) -> InstanceId {
        InstanceId::parse(s).unwrap_or_else(|_| InstanceId::generate())
    }

    fn record(rid: &str, class: &str, name: &str, parent: Option<&str>) -> ResyncRecord {
        ResyncRecord {
            id: id(rid),
            class_name: class.to_string(),
            name: name.to_string(),
            parent_id: parent.map(id),
            properties: BTreeMap::new(),
        }
    }

    fn base() -> Vec<ResyncRecord> {
        vec![
            record("ws", "Workspace", "Workspace", None),
            record("a", "Folder", "A", Some("ws")),
            record("b", "Folder", "B", Some("ws")),
            record("p", "Part", "Part", Some("a")),
        ]
    }

    #[test]
    fn test_identical_resync_does_not_bump_revision() {
        // GIVEN a store seeded from a resync
        let mut store = TreeStore::new();
        store.replace_all(base());
        let revision = store.revision();
        store.take_events();

        // WHEN the same records arrive again
        let report = store.replace_all(base());

        // THEN nothing changes
        assert!(!report.changed);
        assert_eq!(store.revision(), revision);
        assert!(store.take_events().is_empty());
    }

    #[test]
    fn test_initial_resync_emits_creates_in_preorder() {
        let mut store = TreeStore::new();
        let report = store.replace_all(base());

        let paths: Vec<String> = store
            .take_events()
            .iter()
            .filter_map(|event| match event {
                ChangeEvent::Create { path, .. } => Some(path.path_string()),
                _ => None,
            })
            .collect();
        assert_eq!(report.created, 4);
        assert_eq!(
            paths,
            vec!["Workspace", "Workspace.A", "Workspace.A.Part", "Workspace.B"]
        );
        assert!(store.pending_changes().is_empty());
    }

    /// Apply `events` to a copy of `prior` the way an observer would.
    fn replay(prior: &TreeSnapshot, events: Vec<ChangeEvent>) -> Result<TreeStore, TreeError> {
        let mut observer = TreeStore::new();
        observer.restore_snapshot(prior);
        for event in events {
            let message = match event {
                ChangeEvent::Create { path, instance, .. } => ChangeMessage::Create {
                    parent_path: path.parent().unwrap_or_default(),
                    instance: NewInstance {
                        id: Some(instance.id),
                        class_name: instance.class_name,
                        name: instance.name,
                        properties: instance.properties,
                    },
                },
                ChangeEvent::Update {
                    path,
                    property,
                    value,
                    ..
                } => ChangeMessage::Update {
                    path,
                    property,
                    value: value.unwrap(),
                },
                ChangeEvent::Delete { path, .. } => ChangeMessage::Delete { path },
                ChangeEvent::Reparent {
                    path,
                    new_parent_path,
                    name,
                    ..
                } => ChangeMessage::Reparent {
                    path,
                    new_parent_path,
                    name: Some(name),
                },
            };
            observer.apply_change(message, ChangeOrigin::Bridge)?;
        }
        Ok(observer)
    }

    /// Resync `store` to `next` and check an observer replaying the events
    /// ends up with the same tree.
    fn assert_replay_converges(store: &mut TreeStore, next: Vec<ResyncRecord>) -> Vec<ChangeEvent> {
        store.take_events();
        let prior = store.create_snapshot();
        store.replace_all(next);
        let events = store.take_events();

        let observer = replay(&prior, events.clone()).unwrap();
        assert_eq!(observer.traverse(), store.traverse());
        assert_eq!(observer.check_invariants(), Ok(()));
        events
    }

    #[test]
    fn test_move_and_rename_emit_structural_events_first() {
        // GIVEN Workspace.A.Part
        let mut store = TreeStore::new();
        store.replace_all(base());

        // WHEN A is renamed and Part moves to B in one resync
        let mut next = base();
        next[3] = record("p", "Part", "Part", Some("b"));
        next[1] = record("a", "Folder", "Renamed", Some("ws"));
        let events = assert_replay_converges(&mut store, next);

        // THEN the rename comes first and the move addresses the renamed parent
        assert!(matches!(
            &events[0],
            ChangeEvent::Update { path, property, .. }
                if path.path_string() == "Workspace.A" && property == NAME_PROPERTY
        ));
        assert!(matches!(
            &events[1],
            ChangeEvent::Reparent { path, new_parent_path, .. }
                if path.path_string() == "Workspace.Renamed.Part"
                    && new_parent_path.path_string() == "Workspace.B"
        ));
    }

    #[test]
    fn test_delete_under_renamed_parent_uses_current_path() {
        // GIVEN Workspace.A.Part
        let mut store = TreeStore::new();
        store.replace_all(base());

        // WHEN A is renamed and its child removed
        let next = vec![
            record("ws", "Workspace", "Workspace", None),
            record("a", "Folder", "R", Some("ws")),
            record("b", "Folder", "B", Some("ws")),
        ];
        let events = assert_replay_converges(&mut store, next);

        // THEN the delete addresses Part under its renamed parent
        assert!(matches!(
            events.last(),
            Some(ChangeEvent::Delete { path, .. }) if path.path_string() == "Workspace.R.Part"
        ));
    }

    #[test]
    fn test_move_into_renamed_parent_converges() {
        let mut store = TreeStore::new();
        store.replace_all(base());

        let next = vec![
            record("ws", "Workspace", "Workspace", None),
            record("a", "Folder", "A", Some("ws")),
            record("b", "Folder", "C", Some("ws")),
            record("p", "Part", "Part", Some("b")),
        ];
        let events = assert_replay_converges(&mut store, next);

        assert!(events.iter().any(|event| matches!(
            event,
            ChangeEvent::Reparent { new_parent_path, .. }
                if new_parent_path.path_string() == "Workspace.C"
        )));
    }

    #[test]
    fn test_sibling_name_swap_goes_through_free_name() {
        // GIVEN siblings A and B
        let mut store = TreeStore::new();
        store.replace_all(base());

        // WHEN they swap names
        let next = vec![
            record("ws", "Workspace", "Workspace", None),
            record("a", "Folder", "B", Some("ws")),
            record("b", "Folder", "A", Some("ws")),
            record("p", "Part", "Part", Some("a")),
        ];
        let events = assert_replay_converges(&mut store, next);

        // THEN neither ends up suffixed
        assert_eq!(
            store.get_path_by_id(&id("a")).map(InstancePath::path_string),
            Some("Workspace.B".to_string())
        );
        assert_eq!(
            store.get_path_by_id(&id("b")).map(InstancePath::path_string),
            Some("Workspace.A".to_string())
        );
        assert_eq!(events.len(), 3);
    }

    #[test]
    fn test_child_rescued_before_parent_is_deleted() {
        // GIVEN Workspace.A.Part
        let mut store = TreeStore::new();
        store.replace_all(base());

        // WHEN A disappears but Part survives under B, and a new A takes the name
        let next = vec![
            record("ws", "Workspace", "Workspace", None),
            record("b", "Folder", "B", Some("ws")),
            record("p", "Part", "Part", Some("b")),
            record("a2", "Folder", "A", Some("ws")),
        ];
        let events = assert_replay_converges(&mut store, next);

        let kinds: Vec<&str> = events
            .iter()
            .map(|event| match event {
                ChangeEvent::Create { .. } => "create",
                ChangeEvent::Update { .. } => "update",
                ChangeEvent::Delete { .. } => "delete",
                ChangeEvent::Reparent { .. } => "reparent",
            })
            .collect();
        assert_eq!(kinds, ["reparent", "delete", "create"]);
    }

    #[test]
    fn test_removed_subtree_emits_only_topmost_delete() {
        let mut store = TreeStore::new();
        store.replace_all(base());
        store.take_events();

        let next = vec![
            record("ws", "Workspace", "Workspace", None),
            record("b", "Folder", "B", Some("ws")),
        ];
        let report = store.replace_all(next);

        assert_eq!(report.deleted, 1);
        assert!(matches!(
            store.take_events().as_slice(),
            [ChangeEvent::Delete { path, .. }] if path.path_string() == "Workspace.A"
        ));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_orphans_dropped_and_duplicate_names_resolved() {
        let mut store = TreeStore::new();
        let report = store.replace_all(vec![
            record("ws", "Workspace", "Workspace", None),
            record("x", "Folder", "Folder", Some("ws")),
            record("y", "Folder", "Folder", Some("ws")),
            record("z", "Part", "Lost", Some("missing")),
        ]);

        assert_eq!(report.dropped_records, 1);
        assert_eq!(
            store.get_path_by_id(&id("y")).map(InstancePath::path_string),
            Some("Workspace.Folder_2".to_string())
        );
    }

    #[test]
    fn test_property_changes_emit_updates_last() {
        let mut store = TreeStore::new();
        store.replace_all(base());
        store.take_events();

        let mut next = base();
        next[3]
            .properties
            .insert("Anchored".into(), PropertyValue::Bool(true));
        store.replace_all(next);

        assert!(matches!(
            store.take_events().as_slice(),
            [ChangeEvent::Update { property, value: Some(PropertyValue::Bool(true)), .. }]
                if property == "Anchored"
        ));
    }
}
