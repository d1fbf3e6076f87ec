//! Reconciliation of the dictionary with introspected schema data.

use super::rows::{ColumnRow, IntrospectionSource, TableRow};
use crate::catalog::{
    Constraint, ConstraintId, Database, DataType, DefaultValue, EntityRef, Field,
    FieldAttributes, FieldId, FkPair, RefKind, Table, TableId,
};
use crate::error::{Error, Result};
use crate::events::{DictEvent, DictEventKind, EventSink, SharedEventSink};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress label of the table pass.
pub const TABLES_LABEL: &str = "TABLES";

/// Cooperative cancellation flag for a sync pass.
///
/// Clones share the flag. The pass checks it between tables.
#[derive(Debug, Clone, Default)]
pub struct SyncHandle {
    cancelled: Arc<AtomicBool>,
}

impl SyncHandle {
    /// Create a handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the running pass to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if a stop was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous stop request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Counts of the changes a sync pass made.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tables_added: usize,
    pub tables_updated: usize,
    pub tables_removed: usize,
    pub fields_added: usize,
    pub fields_updated: usize,
    pub fields_removed: usize,
    pub constraints_added: usize,
    pub constraints_updated: usize,
    pub constraints_removed: usize,
}

impl SyncReport {
    /// Check if the pass changed nothing.
    pub fn is_unchanged(&self) -> bool {
        *self == SyncReport::default()
    }

    fn record(&mut self, kind: &DictEventKind) {
        match kind {
            DictEventKind::TableAdded { .. } => self.tables_added += 1,
            DictEventKind::TableUpdated { .. } => self.tables_updated += 1,
            DictEventKind::TableRemoved { .. } => self.tables_removed += 1,
            DictEventKind::FieldAdded { .. } => self.fields_added += 1,
            DictEventKind::FieldUpdated { .. } => self.fields_updated += 1,
            DictEventKind::FieldRemoved { .. } => self.fields_removed += 1,
            DictEventKind::ConstraintAdded { .. } => self.constraints_added += 1,
            DictEventKind::ConstraintUpdated { .. } => self.constraints_updated += 1,
            DictEventKind::ConstraintRemoved { .. } => self.constraints_removed += 1,
            _ => {}
        }
    }
}

/// Sink that tallies events into a report and forwards them.
struct ReportingSink {
    inner: SharedEventSink,
    report: Mutex<SyncReport>,
}

impl EventSink for ReportingSink {
    fn emit(&self, event: DictEvent) {
        self.report.lock().record(&event.kind);
        self.inner.emit(event);
    }
}

/// Constraints derived from column flags, waiting to be merged.
struct Staged {
    table: TableId,
    constraints: Vec<Constraint>,
}

/// One reconciliation pass.
pub struct SchemaSync<'a, S: IntrospectionSource + ?Sized> {
    source: &'a S,
    handle: SyncHandle,
}

impl<'a, S: IntrospectionSource + ?Sized> SchemaSync<'a, S> {
    /// Create a pass reading from `source`.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            handle: SyncHandle::new(),
        }
    }

    /// Use a shared cancellation handle.
    pub fn with_handle(mut self, handle: SyncHandle) -> Self {
        self.handle = handle;
        self
    }

    /// Cancellation handle of this pass.
    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Reconcile `db` with the source.
    ///
    /// Tables and fields are matched by name and updated in place, so
    /// handles held by callers stay valid. Objects missing from the source
    /// are destroyed along with their dependent constraints.
    pub fn run(&self, db: &mut Database) -> Result<SyncReport> {
        let previous = db.event_sink();
        let recorder = Arc::new(ReportingSink {
            inner: Arc::clone(&previous),
            report: Mutex::new(SyncReport::default()),
        });
        db.set_event_sink(recorder.clone());

        db.emit(DictEventKind::SyncStarted);
        let result = self.reconcile(db);
        db.emit(DictEventKind::SyncFinished);
        db.set_event_sink(previous);

        let report = recorder.report.lock().clone();
        match result {
            Ok(()) => {
                info!(
                    tables_added = report.tables_added,
                    tables_removed = report.tables_removed,
                    fields_added = report.fields_added,
                    fields_removed = report.fields_removed,
                    constraints_added = report.constraints_added,
                    constraints_removed = report.constraints_removed,
                    "schema sync finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "schema sync aborted");
                Err(e)
            }
        }
    }

    fn reconcile(&self, db: &mut Database) -> Result<()> {
        let mut rows: Vec<(TableRow, bool)> = self
            .source
            .tables()?
            .into_iter()
            .map(|row| (row, false))
            .collect();
        if db.config().sync_views {
            rows.extend(self.source.views()?.into_iter().map(|row| (row, true)));
        }
        rows.sort_by(|a, b| a.0.name.cmp(&b.0.name));

        let total = rows.len();
        let mut updated = HashSet::new();
        let mut staged = Vec::new();
        let mut failure = None;

        for (done, (row, is_view)) in rows.iter().enumerate() {
            if self.handle.is_cancelled() {
                failure = Some(Error::SyncCancelled);
                break;
            }
            match sync_one(self.source, db, row, *is_view) {
                Ok(batch) => {
                    updated.insert(batch.table);
                    staged.push(batch);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
            db.emit(DictEventKind::SyncProgress {
                label: TABLES_LABEL.to_string(),
                done: done + 1,
                total,
            });
        }

        // Tables finished before a stop keep their constraints.
        for batch in staged {
            merge_constraints(db, batch)?;
        }

        if let Some(e) = failure {
            db.activate_pending();
            return Err(e);
        }

        let sync_views = db.config().sync_views;
        let stale: Vec<TableId> = db
            .tables()
            .filter(|t| !updated.contains(&t.id()) && (sync_views || !t.is_view))
            .map(|t| t.id())
            .collect();
        for id in stale {
            db.remove_table(id)?;
        }

        let pruned = db.prune_inactive_constraints();
        if !pruned.is_empty() {
            debug!(count = pruned.len(), "destroyed constraints that could not be activated");
        }
        Ok(())
    }
}

/// Reconcile one table. Its columns are checked before the graph is
/// touched, and a table created here is dropped again if its fields cannot
/// be built.
fn sync_one<S: IntrospectionSource + ?Sized>(
    source: &S,
    db: &mut Database,
    row: &TableRow,
    is_view: bool,
) -> Result<Staged> {
    let columns = source.columns(&row.name)?;
    for column in &columns {
        column_type(&row.name, column)?;
    }

    let (table, created) = sync_table(db, row, is_view)?;
    match sync_fields(db, table, &row.name, &columns) {
        Ok(constraints) => Ok(Staged { table, constraints }),
        Err(e) => {
            if created {
                db.remove_table(table)?;
            }
            Err(e)
        }
    }
}

fn column_type<'c>(table_name: &str, column: &'c ColumnRow) -> Result<&'c str> {
    column
        .type_name
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::Introspection(format!(
                "can't find data type for {}.{}",
                table_name, column.name
            ))
        })
}

/// Find or create the table for `row` and update its properties. The flag
/// is set when the table is new.
fn sync_table(db: &mut Database, row: &TableRow, is_view: bool) -> Result<(TableId, bool)> {
    let description = row.description.clone().filter(|s| !s.is_empty());
    let owner = row.owner.clone().filter(|s| !s.is_empty());

    match db.table_by_name(&row.name).map(|t| t.id()) {
        Some(id) => {
            db.update_table(id, |t| {
                t.description = description;
                t.owner = owner;
                t.is_view = is_view;
            })?;
            Ok((id, false))
        }
        None => {
            let mut table = Table::new(row.name.clone()).as_view(is_view);
            table.description = description;
            table.owner = owner;
            Ok((db.insert_table_sorted(table)?, true))
        }
    }
}

fn apply_column(field: &mut Field, column: &ColumnRow, data_type: DataType) {
    field.data_type = Some(data_type);
    field.length = column.size;
    field.scale = column.scale;
    field.default = column
        .default_value
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(DefaultValue::string);
    field.attributes = column
        .extra_attrs
        .as_deref()
        .map(FieldAttributes::parse)
        .unwrap_or_default();
}

/// Reconcile the fields of one table and stage the constraints their
/// flags describe.
fn sync_fields(
    db: &mut Database,
    table: TableId,
    table_name: &str,
    columns: &[ColumnRow],
) -> Result<Vec<Constraint>> {
    let case_insensitive = db.config().case_insensitive_names;
    let mut position = 0;
    let mut seen = HashSet::new();
    let mut pk_fields = Vec::new();
    let mut single = Vec::new();
    let mut fk_groups: IndexMap<String, Vec<FkPair>> = IndexMap::new();

    for column in columns {
        let type_name = column_type(table_name, column)?;
        let data_type = db
            .data_types_mut()
            .get_or_declare(type_name, table_name, &column.name);

        let existing = db
            .table(table)
            .and_then(|t| t.find_field(&column.name, case_insensitive))
            .map(|f| f.id());
        let field = match existing {
            Some(id) => {
                if let Some(index) = db.table(table).and_then(|t| t.field_index(id)) {
                    position = index + 1;
                }
                db.update_field(id, |f| apply_column(f, column, data_type))?;
                id
            }
            None => {
                let mut field = Field::new(column.name.clone());
                apply_column(&mut field, column, data_type);
                let id = db.add_field_at(table, field, position)?;
                position += 1;
                id
            }
        };
        seen.insert(field);

        if column.not_null {
            single.push(Constraint::not_null(table, field));
        }
        if column.primary_key {
            pk_fields.push(field);
        }
        if column.unique {
            single.push(Constraint::unique(table).with_fields(vec![field]));
        }
        if let Some(target) = column.foreign_key.as_deref().filter(|s| !s.is_empty()) {
            match target.rsplit_once('.') {
                Some((ref_table, _)) => fk_groups
                    .entry(ref_table.to_string())
                    .or_default()
                    .push(FkPair::deferred(field, EntityRef::by_name(RefKind::Field, target))),
                None => warn!(
                    table = %table_name,
                    field = %column.name,
                    target = %target,
                    "ignoring foreign key target without table part"
                ),
            }
        }
    }

    let orphans: Vec<FieldId> = db
        .table(table)
        .map(|t| t.field_ids().filter(|id| !seen.contains(id)).collect())
        .unwrap_or_default();
    for id in orphans {
        db.remove_field(id)?;
    }

    let mut staged = Vec::new();
    if !pk_fields.is_empty() {
        staged.push(Constraint::primary_key(table).with_fields(pk_fields));
    }
    staged.extend(single);
    for (_, pairs) in fk_groups {
        staged.push(Constraint::foreign_key(table).with_pairs(pairs));
    }
    Ok(staged)
}

/// Merge staged constraints, then drop introspected constraints of the
/// table that the source no longer reports.
fn merge_constraints(db: &mut Database, batch: Staged) -> Result<()> {
    let mut kept: HashSet<ConstraintId> = HashSet::new();
    for constraint in batch.constraints {
        match db.insert_constraint(constraint, true) {
            Ok(id) => {
                kept.insert(id);
            }
            Err(e) => warn!(table = %batch.table, error = %e, "skipping introspected constraint"),
        }
    }

    let stale: Vec<ConstraintId> = db
        .table_constraints(batch.table)
        .into_iter()
        .filter(|c| !c.user_defined && !kept.contains(&c.id()))
        .map(|c| c.id())
        .collect();
    for id in stale {
        db.remove_constraint(id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ConstraintKind;
    use crate::events::MemoryEventSink;
    use crate::sync::SchemaSnapshot;

    fn orders_snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new()
            .with_table(
                TableRow::new("orders").with_owner("shop"),
                vec![
                    ColumnRow::new("id", "int4").with_not_null().with_primary_key(),
                    ColumnRow::new("customer_id", "int4").with_foreign_key("customers.id"),
                    ColumnRow::new("note", "text").with_default("none"),
                ],
            )
            .with_table(
                TableRow::new("customers"),
                vec![ColumnRow::new("id", "int4")
                    .with_not_null()
                    .with_primary_key()
                    .with_extra_attrs("AUTO_INCREMENT")],
            )
    }

    #[test]
    fn test_sync_builds_sorted_tables() {
        let mut db = Database::default();
        let report = SchemaSync::new(&orders_snapshot()).run(&mut db).unwrap();

        let names: Vec<_> = db.tables().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["customers", "orders"]);
        assert_eq!(report.tables_added, 2);
        assert_eq!(report.fields_added, 4);

        let orders = db.table_by_name("orders").unwrap();
        assert_eq!(orders.owner.as_deref(), Some("shop"));
        let fields: Vec<_> = orders.fields().map(|f| f.name().to_string()).collect();
        assert_eq!(fields, vec!["id", "customer_id", "note"]);

        let id = db.field_by_name("customers.id").unwrap();
        assert!(id.is_auto_increment());
        db.verify_integrity().unwrap();
    }

    #[test]
    fn test_sync_activates_forward_foreign_key() {
        let mut db = Database::default();
        SchemaSync::new(&orders_snapshot()).run(&mut db).unwrap();

        let orders = db.table_by_name("orders").unwrap().id();
        let customers = db.table_by_name("customers").unwrap().id();
        let fks = db.tables_fk_constraints(Some(orders), Some(customers), true);
        assert_eq!(fks.len(), 1);
        assert!(fks[0].is_active());
        assert!(!fks[0].user_defined);
    }

    #[test]
    fn test_second_sync_is_silent() {
        let sink = Arc::new(MemoryEventSink::new());
        let mut db = Database::default().with_event_sink(sink.clone());
        let snapshot = orders_snapshot();
        SchemaSync::new(&snapshot).run(&mut db).unwrap();
        sink.clear();

        let report = SchemaSync::new(&snapshot).run(&mut db).unwrap();
        assert!(report.is_unchanged());
        assert!(sink.changes().is_empty());
        assert!(matches!(
            sink.events().first().map(|e| &e.kind),
            Some(DictEventKind::SyncStarted)
        ));
        assert!(matches!(
            sink.events().last().map(|e| &e.kind),
            Some(DictEventKind::SyncFinished)
        ));
    }

    #[test]
    fn test_missing_type_aborts() {
        let snapshot = SchemaSnapshot::new().with_table(
            TableRow::new("t"),
            vec![ColumnRow {
                type_name: None,
                ..ColumnRow::new("x", "")
            }],
        );
        let mut db = Database::default();
        let err = SchemaSync::new(&snapshot).run(&mut db).unwrap_err();
        assert!(matches!(err, Error::Introspection(_)));
    }

    #[test]
    fn test_failed_sync_leaves_no_partial_table() {
        let pk_column = || ColumnRow::new("id", "int4").with_not_null().with_primary_key();
        let mut db = Database::default();
        SchemaSync::new(&SchemaSnapshot::new().with_table(TableRow::new("keep"), vec![pk_column()]))
            .run(&mut db)
            .unwrap();
        let keep = db.table_by_name("keep").unwrap().id();
        let keep_id = db.field_by_name("keep.id").unwrap().id();
        let before: Vec<_> = db.table_constraints(keep).iter().map(|c| c.id()).collect();

        let broken = SchemaSnapshot::new()
            .with_table(TableRow::new("a"), vec![pk_column()])
            .with_table(TableRow::new("keep"), vec![pk_column()])
            .with_table(
                TableRow::new("z"),
                vec![
                    ColumnRow::new("ok", "int4"),
                    ColumnRow {
                        type_name: None,
                        ..ColumnRow::new("bad", "")
                    },
                ],
            );
        let err = SchemaSync::new(&broken).run(&mut db).unwrap_err();
        assert!(matches!(err, Error::Introspection(_)));

        assert!(db.table_by_name("z").is_none());
        assert!(db.field_by_name("z.ok").is_none());

        // Tables reconciled before the failure carry their constraints.
        let a = db.table_by_name("a").unwrap().id();
        assert!(db.table_pk_constraint(a).is_some());
        assert_eq!(db.table_constraints(a).len(), 2);

        assert_eq!(db.field_by_name("keep.id").map(|f| f.id()), Some(keep_id));
        let after: Vec<_> = db.table_constraints(keep).iter().map(|c| c.id()).collect();
        assert_eq!(after, before);
        db.verify_integrity().unwrap();
    }

    #[test]
    fn test_unknown_type_is_declared() {
        let snapshot = SchemaSnapshot::new().with_table(
            TableRow::new("places"),
            vec![ColumnRow::new("location", "geometry")],
        );
        let mut db = Database::default();
        SchemaSync::new(&snapshot).run(&mut db).unwrap();
        let dt = db
            .field_by_name("places.location")
            .and_then(|f| f.data_type.clone())
            .unwrap();
        assert!(dt.custom);
        assert!(db.data_types().get("geometry").is_some());
    }

    #[test]
    fn test_dropped_column_flag_removes_constraint() {
        let mut db = Database::default();
        SchemaSync::new(&orders_snapshot()).run(&mut db).unwrap();
        let orders = db.table_by_name("orders").unwrap().id();
        let id_field = db.field_by_name("orders.id").unwrap().id();
        assert!(!db.field_is_null_allowed(id_field));

        let relaxed = SchemaSnapshot::new()
            .with_table(
                TableRow::new("orders").with_owner("shop"),
                vec![
                    ColumnRow::new("id", "int4").with_primary_key(),
                    ColumnRow::new("customer_id", "int4").with_foreign_key("customers.id"),
                    ColumnRow::new("note", "text").with_default("none"),
                ],
            )
            .with_table(
                TableRow::new("customers"),
                vec![ColumnRow::new("id", "int4")
                    .with_not_null()
                    .with_primary_key()
                    .with_extra_attrs("AUTO_INCREMENT")],
            );
        SchemaSync::new(&relaxed).run(&mut db).unwrap();
        assert!(db.field_is_null_allowed(id_field));
        assert!(db
            .table_constraints(orders)
            .iter()
            .all(|c| c.kind() != ConstraintKind::NotNull));
    }

    #[test]
    fn test_user_constraints_survive_sync() {
        let mut db = Database::default();
        let snapshot = orders_snapshot();
        SchemaSync::new(&snapshot).run(&mut db).unwrap();
        let orders = db.table_by_name("orders").unwrap().id();
        let note = db.field_by_name("orders.note").unwrap().id();
        let unique = db
            .add_constraint(Constraint::unique(orders).with_fields(vec![note]))
            .unwrap();

        SchemaSync::new(&snapshot).run(&mut db).unwrap();
        assert!(db.constraint(unique).is_some());
    }

    #[test]
    fn test_cancelled_sync_keeps_partial_state() {
        let handle = SyncHandle::new();
        handle.cancel();
        let mut db = Database::default();
        db.add_table(Table::new("legacy")).unwrap();

        let err = SchemaSync::new(&orders_snapshot())
            .with_handle(handle.clone())
            .run(&mut db)
            .unwrap_err();
        assert!(matches!(err, Error::SyncCancelled));
        // Nothing after the stop request is touched, including stale tables.
        assert!(db.table_by_name("legacy").is_some());

        handle.reset();
        SchemaSync::new(&orders_snapshot())
            .with_handle(handle)
            .run(&mut db)
            .unwrap();
        assert!(db.table_by_name("legacy").is_none());
    }

    #[test]
    fn test_views_are_kept_when_not_synced() {
        let mut db = Database::new(crate::DictConfig::default().with_sync_views(false));
        db.add_table(Table::view("active_orders")).unwrap();
        SchemaSync::new(&orders_snapshot()).run(&mut db).unwrap();
        assert!(db.table_by_name("active_orders").is_some());
    }
}
