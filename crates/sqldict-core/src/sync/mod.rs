//! Schema synchronization.
//!
//! An [`IntrospectionSource`] reports the tables, views and columns of a
//! live database. [`SchemaSync`] reconciles a [`Database`](crate::Database)
//! with those rows while keeping the identity of objects that still exist.

mod reconcile;
mod rows;

pub use reconcile::{SchemaSync, SyncHandle, SyncReport, TABLES_LABEL};
pub use rows::{Cell, ColumnRow, IntrospectionSource, RawSnapshot, SchemaSnapshot, TableRow};
