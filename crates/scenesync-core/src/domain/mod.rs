//! Domain vocabulary shared by every component: identifiers, paths, values.

pub mod identifiers;
pub mod path;
pub mod value;

pub use identifiers::{
    validate_instance_name, IdentifierError, InstanceId, LockOwner, RunId, MAX_IDENTIFIER_LEN,
    MAX_NAME_LEN,
};
pub use path::InstancePath;
pub use value::{PropertyKind, PropertyValue};
