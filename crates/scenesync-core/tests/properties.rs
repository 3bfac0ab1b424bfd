//! Property tests for the tree store and name resolver.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;
use scenesync_core::{
    domain::{InstanceId, InstancePath, PropertyValue},
    tree::{
        base_name, resolve_name, ChangeEvent, ChangeMessage, ChangeOrigin, ChangeOutcome,
        NewInstance, ResyncRecord, TreeStore,
    },
};

/// One abstract mutation; indices pick among the paths live at apply time.
#[derive(Debug, Clone)]
enum Op {
    Create { parent: usize, name: String },
    Rename { target: usize, name: String },
    Update { target: usize, size: f64 },
    Delete { target: usize },
    Reparent { target: usize, parent: usize },
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Node".to_string()),
        Just("Node_2".to_string()),
        Just("Node_3".to_string()),
        Just("Part".to_string()),
        "[A-Z][a-z]{0,3}",
    ]
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (any::<usize>(), name_strategy()).prop_map(|(parent, name)| Op::Create { parent, name }),
        1 => (any::<usize>(), name_strategy()).prop_map(|(target, name)| Op::Rename { target, name }),
        1 => (any::<usize>(), -100.0f64..100.0).prop_map(|(target, size)| Op::Update { target, size }),
        1 => any::<usize>().prop_map(|target| Op::Delete { target }),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(target, parent)| Op::Reparent { target, parent }),
    ]
}

/// Root first, then every live path in traversal order.
fn live_paths(store: &TreeStore) -> Vec<InstancePath> {
    std::iter::once(InstancePath::root())
        .chain(store.traverse().into_iter().map(|(path, _)| path))
        .collect()
}

fn pick(paths: &[InstancePath], index: usize) -> InstancePath {
    paths[index % paths.len()].clone()
}

fn to_message(store: &TreeStore, op: &Op) -> Option<ChangeMessage> {
    let paths = live_paths(store);
    let non_root = &paths[1..];
    match op {
        Op::Create { parent, name } => Some(ChangeMessage::Create {
            parent_path: pick(&paths, *parent),
            instance: NewInstance {
                id: None,
                class_name: "Part".to_string(),
                name: name.clone(),
                properties: BTreeMap::new(),
            },
        }),
        _ if non_root.is_empty() => None,
        Op::Rename { target, name } => Some(ChangeMessage::Update {
            path: pick(non_root, *target),
            property: "Name".to_string(),
            value: PropertyValue::String(name.clone()),
        }),
        Op::Update { target, size } => Some(ChangeMessage::Update {
            path: pick(non_root, *target),
            property: "Size".to_string(),
            value: PropertyValue::Number(*size),
        }),
        Op::Delete { target } => Some(ChangeMessage::Delete {
            path: pick(non_root, *target),
        }),
        Op::Reparent { target, parent } => Some(ChangeMessage::Reparent {
            path: pick(non_root, *target),
            new_parent_path: pick(&paths, *parent),
            name: None,
        }),
    }
}

fn apply_all(store: &mut TreeStore, ops: &[Op]) {
    for op in ops {
        if let Some(message) = to_message(store, op) {
            // Cycles and the like are rejected; the store must stay consistent either way.
            let _ = store.apply_change(message, ChangeOrigin::Agent);
        }
    }
}

/// Edit to the current records that forms the next resync.
#[derive(Debug, Clone)]
enum Edit {
    Rename { target: usize, name: String },
    Move { target: usize, parent: usize },
    Remove { target: usize },
    Add { parent: usize, name: String },
    Resize { target: usize, size: f64 },
    Reclass { target: usize },
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (any::<usize>(), name_strategy()).prop_map(|(target, name)| Edit::Rename { target, name }),
        3 => (any::<usize>(), any::<usize>()).prop_map(|(target, parent)| Edit::Move { target, parent }),
        2 => any::<usize>().prop_map(|target| Edit::Remove { target }),
        2 => (any::<usize>(), name_strategy()).prop_map(|(parent, name)| Edit::Add { parent, name }),
        1 => (any::<usize>(), -100.0f64..100.0).prop_map(|(target, size)| Edit::Resize { target, size }),
        1 => any::<usize>().prop_map(|target| Edit::Reclass { target }),
    ]
}

fn records_of(store: &TreeStore) -> Vec<ResyncRecord> {
    store
        .get_indexed_instances()
        .iter()
        .map(|entry| ResyncRecord {
            id: entry.instance.id.clone(),
            class_name: entry.instance.class_name.clone(),
            name: entry.instance.name.clone(),
            parent_id: entry.instance.parent.clone(),
            properties: entry.instance.properties.clone(),
        })
        .collect()
}

/// `None` (a root) for one index past the end.
fn parent_id(records: &[ResyncRecord], index: usize) -> Option<InstanceId> {
    let slot = index % (records.len() + 1);
    records.get(slot).map(|record| record.id.clone())
}

fn apply_edits(mut records: Vec<ResyncRecord>, edits: &[Edit]) -> Vec<ResyncRecord> {
    for (n, edit) in edits.iter().enumerate() {
        let len = records.len();
        match edit {
            Edit::Add { parent, name } => {
                let parent_id = parent_id(&records, *parent);
                records.push(ResyncRecord {
                    id: InstanceId::parse(format!("added-{n}")).unwrap(),
                    class_name: "Part".to_string(),
                    name: name.clone(),
                    parent_id,
                    properties: BTreeMap::new(),
                });
            }
            _ if len == 0 => {}
            Edit::Rename { target, name } => records[target % len].name = name.clone(),
            Edit::Move { target, parent } => {
                records[target % len].parent_id = parent_id(&records, *parent);
            }
            Edit::Remove { target } => {
                records.remove(target % len);
            }
            Edit::Resize { target, size } => {
                records[target % len]
                    .properties
                    .insert("Size".to_string(), PropertyValue::Number(*size));
            }
            Edit::Reclass { target } => records[target % len].class_name = "Folder".to_string(),
        }
    }
    records
}

/// What an observer holding the prior tree does with one event.
fn as_message(event: ChangeEvent) -> ChangeMessage {
    match event {
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
            value: value.expect("edits never remove a property"),
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
    }
}

fn sibling_names_unique(store: &TreeStore) -> bool {
    let mut seen: HashSet<(Option<InstancePath>, String)> = HashSet::new();
    store.traverse().into_iter().all(|(path, _)| {
        let name = path.name().unwrap_or_default().to_string();
        seen.insert((path.parent(), name))
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn repeated_creates_keep_siblings_unique(names in prop::collection::vec(name_strategy(), 1..40)) {
        let mut store = TreeStore::new();
        for name in &names {
            let message = ChangeMessage::Create {
                parent_path: InstancePath::root(),
                instance: NewInstance {
                    id: None,
                    class_name: "Part".to_string(),
                    name: name.clone(),
                    properties: BTreeMap::new(),
                },
            };
            prop_assert!(store.apply_change(message, ChangeOrigin::Agent).is_ok());
        }

        prop_assert!(sibling_names_unique(&store));
        prop_assert_eq!(store.len(), names.len());
        for (path, _) in store.traverse() {
            let name = path.name().unwrap_or_default();
            prop_assert!(!base_name(name).contains("_2_"), "stacked suffix in {}", name);
        }
    }

    #[test]
    fn index_agrees_with_traversal(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut store = TreeStore::new();
        apply_all(&mut store, &ops);

        let traversal = store.traverse();
        let indexed: Vec<_> = store
            .get_indexed_instances()
            .iter()
            .map(|entry| (entry.path.clone(), entry.instance.id.clone()))
            .collect();

        prop_assert_eq!(&indexed, &traversal);
        for (path, id) in &traversal {
            prop_assert_eq!(store.get_path_by_id(id), Some(path));
            prop_assert_eq!(store.get_id_by_path(path), Some(id));
        }
        prop_assert!(sibling_names_unique(&store));
        prop_assert_eq!(store.check_invariants(), Ok(()));
    }

    #[test]
    fn applied_changes_strictly_increase_revision(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let mut store = TreeStore::new();
        for op in &ops {
            let Some(message) = to_message(&store, op) else { continue };
            let before = store.revision();
            match store.apply_change(message, ChangeOrigin::Agent) {
                Ok(ChangeOutcome::Applied(applied)) => {
                    prop_assert!(store.revision() > before);
                    prop_assert_eq!(applied.revision, store.revision());
                }
                Ok(ChangeOutcome::Dropped { .. }) | Err(_) => {
                    prop_assert_eq!(store.revision(), before);
                }
            }
        }
    }

    #[test]
    fn snapshot_restore_reverts_everything(
        setup in prop::collection::vec(op_strategy(), 0..30),
        later in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let mut store = TreeStore::new();
        apply_all(&mut store, &setup);
        let snapshot = store.create_snapshot();
        let traversal = store.traverse();
        let revision = store.revision();

        store.restore_snapshot(&snapshot);
        prop_assert_eq!(store.traverse(), traversal.clone());

        apply_all(&mut store, &later);
        store.restore_snapshot(&snapshot);

        prop_assert_eq!(store.traverse(), traversal);
        prop_assert_eq!(store.revision(), revision);
        prop_assert_eq!(store.check_invariants(), Ok(()));
    }

    #[test]
    fn resync_of_current_state_is_a_no_op(ops in prop::collection::vec(op_strategy(), 0..40)) {
        let mut store = TreeStore::new();
        apply_all(&mut store, &ops);
        let records = records_of(&store);
        let revision = store.revision();

        let report = store.replace_all(records);

        prop_assert!(!report.changed);
        prop_assert_eq!(store.revision(), revision);
    }

    #[test]
    fn observer_replaying_resync_events_converges(
        ops in prop::collection::vec(op_strategy(), 0..30),
        edits in prop::collection::vec(edit_strategy(), 0..12),
    ) {
        // GIVEN a server and an observer holding the same tree
        let mut server = TreeStore::new();
        apply_all(&mut server, &ops);
        server.take_events();
        let mut observer = TreeStore::new();
        observer.restore_snapshot(&server.create_snapshot());

        // WHEN the server takes an edited resync and the observer replays its events
        let next = apply_edits(records_of(&server), &edits);
        server.replace_all(next);
        for event in server.take_events() {
            let message = as_message(event.clone());
            prop_assert!(
                observer.apply_change(message, ChangeOrigin::Bridge).is_ok(),
                "event did not apply: {:?}",
                event
            );
        }

        // THEN both hold the same tree
        prop_assert_eq!(observer.traverse(), server.traverse());
        for entry in server.get_indexed_instances().iter() {
            prop_assert_eq!(
                observer.get_instance_by_id(&entry.instance.id).map(|i| &i.properties),
                Some(&entry.instance.properties)
            );
        }
        prop_assert_eq!(observer.check_invariants(), Ok(()));
    }

    #[test]
    fn resolved_name_is_free_and_keeps_base(
        desired in name_strategy(),
        taken in prop::collection::hash_set(name_strategy(), 0..12),
    ) {
        let resolved = resolve_name(&desired, taken.iter().map(String::as_str));

        prop_assert!(!taken.contains(&resolved));
        if !taken.contains(&desired) {
            prop_assert_eq!(&resolved, &desired);
        } else {
            prop_assert_eq!(base_name(&resolved), base_name(&desired));
        }
    }
}
