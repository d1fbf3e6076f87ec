//! sqldict core - in-memory schema dictionary.
//!
//! Models the tables, fields and constraints of a relational database,
//! reconciles the model with introspected schema data, and persists it as
//! XML.

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod sync;
pub mod xml;

pub use catalog::{
    Constraint, ConstraintData, ConstraintId, ConstraintKind, DataType, DataTypeRegistry,
    Database, DefaultValue, EntityRef, Field, FieldAttributes, FieldId, FkAction, FkPair,
    RefKind, RemoteField, SharedDatabase, Table, TableId, ValueType, new_shared_database,
};
pub use config::DictConfig;
pub use error::{Error, Result};
pub use events::{
    DictEvent, DictEventKind, EventSink, MemoryEventSink, NullEventSink, SharedEventSink,
    TracingEventSink,
};
pub use sync::{
    Cell, ColumnRow, IntrospectionSource, SchemaSnapshot, SchemaSync, SyncHandle, SyncReport,
    TableRow,
};
pub use xml::{load_from_xml, save_to_xml};
