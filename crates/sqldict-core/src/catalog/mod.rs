//! Schema dictionary object graph.
//!
//! The catalog holds tables, fields and constraints, the handles linking
//! them, and the deferred references used before a link can be bound.

mod constraint;
mod database;
mod entity_ref;
mod field;
mod ids;
mod table;
mod types;

pub use constraint::{
    field_ref, Constraint, ConstraintData, ConstraintKind, FkAction, FkPair, RemoteField,
};
pub use database::{new_shared_database, Database, SharedDatabase, TableSet};
pub use entity_ref::{EntityRef, RefBy, RefHandle, RefKind, RefState, Resolver};
pub use field::Field;
pub use ids::{ConstraintId, FieldId, TableId};
pub use table::Table;
pub use types::{DataType, DataTypeRegistry, DefaultValue, FieldAttributes, ValueType};
