//! Translate parsed commands into tree mutations.

use tracing::debug;

use super::{
    conflict::Conflict,
    response::CommandOutput,
    types::{Command, Target, TargetError},
};
use crate::{
    domain::{InstancePath, PropertyValue},
    tree::{AppliedChange, ChangeMessage, ChangeOrigin, ChangeOutcome, NewInstance, TreeStore, NAME_PROPERTY},
};

fn resolve_target(tree: &TreeStore, target: &Target, expected: &serde_json::Value) -> Result<InstancePath, Conflict> {
    target.resolve(tree).map_err(|err| match err {
        TargetError::Missing => Conflict::validation(
            expected.clone(),
            "command needs targetId or targetPath",
            tree.revision(),
        ),
        TargetError::Unresolved(message) => {
            Conflict::not_found(expected.clone(), message, tree.revision())
        }
    })
}

/// Paths a command must hold leases on, root excluded, without duplicates.
///
/// # Errors
///
/// Returns `not_found` when the command's target does not resolve, and
/// `validation_failed` when it names no target at all.
pub fn lock_paths(tree: &TreeStore, command: &Command) -> Result<Vec<InstancePath>, Conflict> {
    let expected = command.expected_ref();
    let mut paths = match command {
        Command::Create {
            parent_path, name, ..
        } => vec![parent_path.clone(), parent_path.child(name.clone())],
        Command::Update { target, .. } | Command::Rename { target, .. } | Command::Delete { target } => {
            vec![resolve_target(tree, target, &expected)?]
        }
        Command::Reparent {
            target,
            new_parent_path,
        } => {
            let path = resolve_target(tree, target, &expected)?;
            let old_parent = path.parent().unwrap_or_default();
            vec![path, old_parent, new_parent_path.clone()]
        }
    };
    paths.retain(|path| !path.is_root());
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Apply one command as an agent-originated change.
///
/// # Errors
///
/// Returns the conflict describing why the tree rejected the command.
pub fn execute(tree: &mut TreeStore, command: Command) -> Result<CommandOutput, Conflict> {
    let op = command.op();
    let expected = command.expected_ref();
    let revision = tree.revision();

    let message = match command {
        Command::Create {
            parent_path,
            class_name,
            name,
            properties,
        } => {
            if !tree.path_exists(&parent_path) {
                return Err(Conflict::not_found(
                    expected,
                    format!("parent path not found: {parent_path}"),
                    revision,
                ));
            }
            ChangeMessage::Create {
                parent_path,
                instance: NewInstance {
                    id: None,
                    class_name,
                    name,
                    properties,
                },
            }
        }
        Command::Update {
            target,
            property,
            value,
        } => ChangeMessage::Update {
            path: resolve_target(tree, &target, &expected)?,
            property,
            value,
        },
        Command::Rename { target, name } => ChangeMessage::Update {
            path: resolve_target(tree, &target, &expected)?,
            property: NAME_PROPERTY.to_string(),
            value: PropertyValue::String(name),
        },
        Command::Delete { target } => ChangeMessage::Delete {
            path: resolve_target(tree, &target, &expected)?,
        },
        Command::Reparent {
            target,
            new_parent_path,
        } => ChangeMessage::Reparent {
            path: resolve_target(tree, &target, &expected)?,
            new_parent_path,
            name: None,
        },
    };

    match tree.apply_change(message, ChangeOrigin::Agent) {
        Ok(ChangeOutcome::Applied(applied)) => {
            debug!(op, id = %applied.id, path = %applied.path, "Command applied");
            Ok(output(op, applied))
        }
        Ok(ChangeOutcome::Dropped { reason }) => Err(Conflict::not_found(expected, reason, revision)),
        Err(err) => Err(Conflict::from_tree_error(expected, &err, revision)),
    }
}

fn output(op: &'static str, applied: AppliedChange) -> CommandOutput {
    CommandOutput {
        op,
        path_string: applied.path.path_string(),
        id: applied.id,
        path: applied.path,
        name: applied.name,
        revision: applied.revision,
    }
}
