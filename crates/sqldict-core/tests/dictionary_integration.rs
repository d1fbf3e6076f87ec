//! Integration tests for the dictionary: sync, cascades and XML persistence.

use sqldict_core::catalog::field_ref;
use sqldict_core::{
    load_from_xml, save_to_xml, ColumnRow, Constraint, ConstraintKind, Database, DictConfig,
    DictEventKind, Error, Field, FkPair, MemoryEventSink, SchemaSnapshot, SchemaSync, SyncHandle,
    Table, TableRow,
};
use std::sync::Arc;

struct TestContext {
    db: Database,
    sink: Arc<MemoryEventSink>,
}

impl TestContext {
    fn new() -> Self {
        Self::with_config(DictConfig::default())
    }

    fn with_config(config: DictConfig) -> Self {
        let sink = Arc::new(MemoryEventSink::new());
        let db = Database::new(config).with_event_sink(sink.clone());
        Self { db, sink }
    }

    fn sync(&mut self, snapshot: &SchemaSnapshot) {
        SchemaSync::new(snapshot).run(&mut self.db).unwrap();
    }

    fn changes(&self) -> Vec<DictEventKind> {
        self.sink.changes().into_iter().map(|e| e.kind).collect()
    }
}

fn table_a() -> (TableRow, Vec<ColumnRow>) {
    (
        TableRow::new("a"),
        vec![
            ColumnRow::new("id", "int4").with_not_null().with_primary_key(),
            ColumnRow::new("b_id", "int4").with_foreign_key("b.id"),
            ColumnRow::new("label", "varchar").with_size(32),
        ],
    )
}

fn table_b() -> (TableRow, Vec<ColumnRow>) {
    (
        TableRow::new("b").with_description("referenced"),
        vec![ColumnRow::new("id", "int4").with_not_null().with_primary_key()],
    )
}

fn snapshot_ab() -> SchemaSnapshot {
    let (a, a_cols) = table_a();
    let (b, b_cols) = table_b();
    SchemaSnapshot::new().with_table(a, a_cols).with_table(b, b_cols)
}

fn snapshot_ba() -> SchemaSnapshot {
    let (a, a_cols) = table_a();
    let (b, b_cols) = table_b();
    SchemaSnapshot::new().with_table(b, b_cols).with_table(a, a_cols)
}

#[test]
fn test_resync_preserves_identity() {
    let mut ctx = TestContext::new();
    let snapshot = snapshot_ab();
    ctx.sync(&snapshot);

    let tables: Vec<_> = ctx.db.tables().map(|t| t.id()).collect();
    let fields: Vec<_> = ctx
        .db
        .tables()
        .flat_map(|t| t.field_ids().collect::<Vec<_>>())
        .collect();
    let constraints: Vec<_> = ctx.db.constraints().map(|c| c.id()).collect();
    ctx.sink.clear();

    let report = SchemaSync::new(&snapshot).run(&mut ctx.db).unwrap();
    assert!(report.is_unchanged());
    assert!(ctx.changes().is_empty());

    assert_eq!(ctx.db.tables().map(|t| t.id()).collect::<Vec<_>>(), tables);
    let after: Vec<_> = ctx
        .db
        .tables()
        .flat_map(|t| t.field_ids().collect::<Vec<_>>())
        .collect();
    assert_eq!(after, fields);
    assert_eq!(ctx.db.constraints().map(|c| c.id()).collect::<Vec<_>>(), constraints);
}

#[test]
fn test_forward_reference_in_either_order() {
    for snapshot in [snapshot_ab(), snapshot_ba()] {
        let mut ctx = TestContext::new();
        ctx.sync(&snapshot);

        let a = ctx.db.table_by_name("a").unwrap().id();
        let b = ctx.db.table_by_name("b").unwrap().id();
        let fks = ctx.db.tables_fk_constraints(Some(a), Some(b), true);
        assert_eq!(fks.len(), 1);
        assert!(fks[0].is_active());
        assert_eq!(fks[0].ref_table(), Some(b));
    }
}

#[test]
fn test_forward_reference_built_by_hand() {
    let mut ctx = TestContext::new();
    let a = ctx.db.add_table(Table::new("a")).unwrap();
    let b_id = ctx.db.add_field(a, Field::new("b_id")).unwrap();
    let fk = ctx
        .db
        .add_constraint(
            Constraint::foreign_key(a).with_pairs(vec![FkPair::deferred(b_id, field_ref("b", "id"))]),
        )
        .unwrap();
    assert!(!ctx.db.constraint(fk).unwrap().is_active());

    let b = ctx.db.add_table(Table::new("b")).unwrap();
    let id = ctx.db.add_field(b, Field::new("id")).unwrap();
    let fk = ctx.db.constraint(fk).unwrap();
    assert!(fk.is_active());
    assert!(fk.references_field(id));
}

#[test]
fn test_destroying_referenced_table_cascades() {
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    let a = ctx.db.table_by_name("a").unwrap().id();
    let b = ctx.db.table_by_name("b").unwrap().id();
    ctx.sink.clear();

    ctx.db.remove_table(b).unwrap();

    assert!(ctx.db.fk_constraints().is_empty());
    let table_a = ctx.db.table(a).unwrap();
    assert_eq!(table_a.field_count(), 3);
    assert!(ctx.db.table_pk_constraint(a).is_some());
    assert!(ctx
        .changes()
        .iter()
        .any(|k| matches!(k, DictEventKind::ConstraintRemoved { kind: ConstraintKind::ForeignKey, .. })));
    ctx.db.verify_integrity().unwrap();
}

#[test]
fn test_xml_round_trip() {
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    let saved = save_to_xml(&ctx.db).unwrap();

    let mut reloaded = Database::default();
    load_from_xml(&mut reloaded, &saved).unwrap();
    assert_eq!(save_to_xml(&reloaded).unwrap(), saved);
    assert_eq!(reloaded.table_count(), 2);
    assert_eq!(reloaded.constraint_count(), ctx.db.constraint_count());
    assert!(reloaded.constraints().all(|c| c.is_active()));
}

#[test]
fn test_tables_sorted_and_fields_in_column_order() {
    let snapshot = SchemaSnapshot::new()
        .with_table(
            TableRow::new("zebra"),
            vec![
                ColumnRow::new("z", "int4"),
                ColumnRow::new("a", "int4"),
                ColumnRow::new("m", "int4"),
            ],
        )
        .with_table(TableRow::new("apple"), vec![ColumnRow::new("id", "int4")])
        .with_table(TableRow::new("mango"), vec![ColumnRow::new("id", "int4")]);
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot);

    let names: Vec<_> = ctx.db.tables().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["apple", "mango", "zebra"]);
    let fields: Vec<_> = ctx
        .db
        .table_by_name("zebra")
        .unwrap()
        .fields()
        .map(|f| f.name().to_string())
        .collect();
    assert_eq!(fields, vec!["z", "a", "m"]);
}

#[test]
fn test_equivalent_foreign_key_merges() {
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    let a = ctx.db.table_by_name("a").unwrap().id();
    let b_id = ctx.db.field_by_name("a.b_id").unwrap().id();
    let b_pk = ctx.db.field_by_name("b.id").unwrap().id();
    let original = ctx.db.fk_constraints()[0].id();
    ctx.sink.clear();

    let merged = ctx
        .db
        .add_constraint(
            Constraint::foreign_key(a)
                .with_pairs(vec![FkPair::new(b_id, b_pk)])
                .with_name("a_b_fkey")
                .with_description("a points at b"),
        )
        .unwrap();

    assert_eq!(merged, original);
    assert_eq!(ctx.db.fk_constraints().len(), 1);
    let fk = ctx.db.constraint(original).unwrap();
    assert_eq!(fk.name.as_deref(), Some("a_b_fkey"));
    assert_eq!(fk.description.as_deref(), Some("a points at b"));
    assert!(matches!(
        ctx.changes().as_slice(),
        [DictEventKind::ConstraintUpdated { .. }]
    ));

    // A re-sync without names keeps the adopted name.
    ctx.sync(&snapshot_ab());
    assert_eq!(
        ctx.db.constraint(original).unwrap().name.as_deref(),
        Some("a_b_fkey")
    );
}

#[test]
fn test_absent_objects_are_removed() {
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    let label = ctx.db.field_by_name("a.label").unwrap().id();

    // b disappears and a loses its label column.
    let shrunk = SchemaSnapshot::new().with_table(
        TableRow::new("a"),
        vec![
            ColumnRow::new("id", "int4").with_not_null().with_primary_key(),
            ColumnRow::new("b_id", "int4"),
        ],
    );
    let report = SchemaSync::new(&shrunk).run(&mut ctx.db).unwrap();

    assert_eq!(report.tables_removed, 1);
    assert_eq!(report.fields_removed, 2);
    assert!(ctx.db.table_by_name("b").is_none());
    assert!(ctx.db.field(label).is_none());
    assert!(ctx.db.fk_constraints().is_empty());
    ctx.db.verify_integrity().unwrap();
}

#[test]
fn test_cancelled_sync_reports_and_stops() {
    let mut ctx = TestContext::new();
    let handle = SyncHandle::new();
    handle.cancel();

    let err = SchemaSync::new(&snapshot_ab())
        .with_handle(handle)
        .run(&mut ctx.db)
        .unwrap_err();
    assert!(matches!(err, Error::SyncCancelled));
    let events: Vec<_> = ctx.sink.events().into_iter().map(|e| e.kind).collect();
    assert_eq!(events, vec![DictEventKind::SyncStarted, DictEventKind::SyncFinished]);
    assert!(ctx.db.is_empty());
}

#[test]
fn test_progress_events() {
    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    let progress: Vec<_> = ctx
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e.kind {
            DictEventKind::SyncProgress { done, total, .. } => Some((done, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(1, 2), (2, 2)]);
}

#[test]
fn test_case_insensitive_names() {
    let mut ctx = TestContext::with_config(DictConfig::new().with_case_insensitive_names(true));
    ctx.sync(&snapshot_ab());
    assert!(ctx.db.table_by_name("A").is_some());
    assert!(ctx.db.field_by_name("B.ID").is_some());
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dict.xml");

    let mut ctx = TestContext::new();
    ctx.sync(&snapshot_ab());
    std::fs::write(&path, save_to_xml(&ctx.db).unwrap()).unwrap();

    let xml = std::fs::read_to_string(&path).unwrap();
    let mut reloaded = Database::default();
    load_from_xml(&mut reloaded, &xml).unwrap();
    assert_eq!(reloaded.dump(), ctx.db.dump());
}
