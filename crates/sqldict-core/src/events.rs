//! Change notifications.
//!
//! A [`Database`](crate::Database) reports every structural change and every
//! sync pass to an [`EventSink`].

use crate::catalog::{ConstraintId, ConstraintKind, FieldId, TableId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Counter for generating unique event IDs.
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(1);

fn generate_event_id() -> u64 {
    EVENT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Types of dictionary events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictEventKind {
    /// Table or view added.
    TableAdded { table: TableId, name: String },
    /// Table or view destroyed.
    TableRemoved { table: TableId, name: String },
    /// Table properties changed.
    TableUpdated { table: TableId, name: String },
    /// Field added to a table.
    FieldAdded {
        table: TableId,
        field: FieldId,
        name: String,
    },
    /// Field destroyed.
    FieldRemoved {
        table: TableId,
        field: FieldId,
        name: String,
    },
    /// Field properties changed.
    FieldUpdated {
        table: TableId,
        field: FieldId,
        name: String,
    },
    /// Constraint added.
    ConstraintAdded {
        constraint: ConstraintId,
        table: TableId,
        kind: ConstraintKind,
    },
    /// Constraint destroyed.
    ConstraintRemoved {
        constraint: ConstraintId,
        table: TableId,
        kind: ConstraintKind,
    },
    /// Constraint name, description or owner changed.
    ConstraintUpdated {
        constraint: ConstraintId,
        table: TableId,
        kind: ConstraintKind,
    },
    /// Sync pass started.
    SyncStarted,
    /// Sync pass progress.
    SyncProgress {
        /// What is being reconciled.
        label: String,
        /// Items done so far.
        done: usize,
        /// Total items.
        total: usize,
    },
    /// Sync pass finished, successfully or not.
    SyncFinished,
}

/// A dictionary event with its sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictEvent {
    /// Unique, increasing event ID.
    pub id: u64,
    /// Event details.
    pub kind: DictEventKind,
}

impl DictEvent {
    /// Create a new event.
    pub fn new(kind: DictEventKind) -> Self {
        Self {
            id: generate_event_id(),
            kind,
        }
    }

    /// Check if the event reports an added, removed or updated object.
    pub fn is_change(&self) -> bool {
        !matches!(
            self.kind,
            DictEventKind::SyncStarted
                | DictEventKind::SyncProgress { .. }
                | DictEventKind::SyncFinished
        )
    }

    /// Format the event as a log line.
    pub fn to_log_line(&self) -> String {
        let desc = match &self.kind {
            DictEventKind::TableAdded { table, name } => {
                format!("TABLE_ADDED {} name={}", table, name)
            }
            DictEventKind::TableRemoved { table, name } => {
                format!("TABLE_REMOVED {} name={}", table, name)
            }
            DictEventKind::TableUpdated { table, name } => {
                format!("TABLE_UPDATED {} name={}", table, name)
            }
            DictEventKind::FieldAdded { table, field, name } => {
                format!("FIELD_ADDED {} {} name={}", table, field, name)
            }
            DictEventKind::FieldRemoved { table, field, name } => {
                format!("FIELD_REMOVED {} {} name={}", table, field, name)
            }
            DictEventKind::FieldUpdated { table, field, name } => {
                format!("FIELD_UPDATED {} {} name={}", table, field, name)
            }
            DictEventKind::ConstraintAdded {
                constraint,
                table,
                kind,
            } => format!("CONSTRAINT_ADDED {} {} type={}", constraint, table, kind.code()),
            DictEventKind::ConstraintRemoved {
                constraint,
                table,
                kind,
            } => format!(
                "CONSTRAINT_REMOVED {} {} type={}",
                constraint,
                table,
                kind.code()
            ),
            DictEventKind::ConstraintUpdated {
                constraint,
                table,
                kind,
            } => format!(
                "CONSTRAINT_UPDATED {} {} type={}",
                constraint,
                table,
                kind.code()
            ),
            DictEventKind::SyncStarted => "SYNC_STARTED".to_string(),
            DictEventKind::SyncProgress { label, done, total } => {
                format!("SYNC_PROGRESS {} {}/{}", label, done, total)
            }
            DictEventKind::SyncFinished => "SYNC_FINISHED".to_string(),
        };
        format!("id={} {}", self.id, desc)
    }
}

/// Receiver of dictionary events.
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    fn emit(&self, event: DictEvent);
}

/// Event sink shared between a database and its observers.
pub type SharedEventSink = Arc<dyn EventSink>;

/// In-memory event sink for testing.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DictEvent>>,
}

impl MemoryEventSink {
    /// Create a new memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all received events.
    pub fn events(&self) -> Vec<DictEvent> {
        self.events.lock().clone()
    }

    /// Get the received events that report object changes.
    pub fn changes(&self) -> Vec<DictEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.is_change())
            .cloned()
            .collect()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DictEvent) {
        self.events.lock().push(event);
    }
}

/// Event sink that discards all events.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: DictEvent) {}
}

/// Event sink that writes events to the `tracing` log.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DictEvent) {
        debug!(target: "sqldict::events", "{}", event.to_log_line());
    }
}
