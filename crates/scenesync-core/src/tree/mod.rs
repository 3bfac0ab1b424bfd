//! The authoritative scene graph.
//!
//! - [`TreeStore`]: arena, path/id index, revision, snapshots
//! - [`resolve_name`]: collision-safe sibling naming
//! - [`ChangeMessage`] in, [`ChangeEvent`] / [`PendingChange`] out

mod change;
mod error;
mod instance;
mod name_resolver;
mod resync;
mod store;

pub use change::{
    AppliedChange, ChangeEvent, ChangeMessage, ChangeOrigin, ChangeOutcome, PendingChange,
    PendingChanges,
};
pub use error::TreeError;
pub use instance::{
    is_reserved_property, IndexedInstance, Instance, NewInstance, ResyncRecord,
    CLASS_NAME_PROPERTY, NAME_PROPERTY, PARENT_PROPERTY,
};
pub use name_resolver::{base_name, resolve_name};
pub use resync::ResyncReport;
pub use store::{TreeSnapshot, TreeStore};
