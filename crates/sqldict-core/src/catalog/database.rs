//! The database dictionary.
//!
//! [`Database`] owns every table and constraint. Cross references are plain
//! handles; removing an object walks the constraint index and destroys
//! every constraint that depended on it, so no handle held by a live
//! constraint ever dangles.

use super::constraint::{Constraint, ConstraintKind, FkAction, FkPair, RemoteField};
use super::entity_ref::{RefBy, RefHandle, RefKind, Resolver};
use super::field::Field;
use super::ids::{ConstraintId, FieldId, TableId};
use super::table::Table;
use super::types::DataTypeRegistry;
use crate::config::DictConfig;
use crate::error::{Error, Result};
use crate::events::{DictEvent, DictEventKind, NullEventSink, SharedEventSink};
use crate::xml::ids;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered tables with name and XML-id indexes.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: IndexMap<TableId, Table>,
    by_name: HashMap<String, TableId>,
    by_xml_id: HashMap<String, TableId>,
    case_insensitive: bool,
}

impl TableSet {
    fn new(case_insensitive: bool) -> Self {
        Self {
            case_insensitive,
            ..Self::default()
        }
    }

    /// Get a table by handle.
    pub fn get(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id)
    }

    fn get_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(&id)
    }

    /// Get a table by name, with the configured case fallback.
    pub fn by_name(&self, name: &str) -> Option<&Table> {
        if let Some(t) = self.by_name.get(name).and_then(|id| self.tables.get(id)) {
            return Some(t);
        }
        if !self.case_insensitive {
            return None;
        }
        let lower = name.to_lowercase();
        self.tables.values().find(|t| t.name().to_lowercase() == lower)
    }

    /// Get a table by its document-local id.
    pub fn by_xml_id(&self, xml_id: &str) -> Option<&Table> {
        self.by_xml_id.get(xml_id).and_then(|id| self.tables.get(id))
    }

    /// Tables in order.
    pub fn iter(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Position of a table.
    pub fn position(&self, id: TableId) -> Option<usize> {
        self.tables.get_index_of(&id)
    }

    /// Get a field of any table.
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.tables.values().find_map(|t| t.field(id))
    }

    fn insert_at(&mut self, position: usize, table: Table) -> TableId {
        let id = table.id();
        self.by_name.insert(table.name().to_string(), id);
        self.by_xml_id.insert(table.xml_id(), id);
        let position = position.min(self.tables.len());
        self.tables.shift_insert(position, id, table);
        id
    }

    fn remove(&mut self, id: TableId) -> Option<Table> {
        let table = self.tables.shift_remove(&id)?;
        self.by_name.remove(table.name());
        self.by_xml_id.remove(&table.xml_id());
        Some(table)
    }
}

impl Resolver for TableSet {
    fn lookup(&self, kind: RefKind, by: RefBy, target: &str) -> Option<RefHandle> {
        match (kind, by) {
            (RefKind::Table, RefBy::Name) => self.by_name(target).map(|t| RefHandle::Table(t.id())),
            (RefKind::Table, RefBy::XmlId) => {
                self.by_xml_id(target).map(|t| RefHandle::Table(t.id()))
            }
            (RefKind::Field, RefBy::Name) => {
                let (table, field) = target.rsplit_once('.')?;
                self.by_name(table)?
                    .find_field(field, self.case_insensitive)
                    .map(|f| RefHandle::Field(f.id()))
            }
            (RefKind::Field, RefBy::XmlId) => {
                let (table, field) = ids::split_field_xml_id(target)?;
                self.by_xml_id(table)?
                    .field_by_name(&field)
                    .map(|f| RefHandle::Field(f.id()))
            }
        }
    }

    fn field_table(&self, field: FieldId) -> Option<TableId> {
        self.tables
            .values()
            .find(|t| t.contains_field(field))
            .map(|t| t.id())
    }
}

/// Database shared behind a read/write lock.
pub type SharedDatabase = Arc<RwLock<Database>>;

/// Wrap a database for shared access.
pub fn new_shared_database(database: Database) -> SharedDatabase {
    Arc::new(RwLock::new(database))
}

/// The schema dictionary of one database.
pub struct Database {
    config: DictConfig,
    tables: TableSet,
    constraints: IndexMap<ConstraintId, Constraint>,
    table_constraints: HashMap<TableId, Vec<ConstraintId>>,
    data_types: DataTypeRegistry,
    sink: SharedEventSink,
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DictConfig::default())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config)
            .field("tables", &self.tables.len())
            .field("constraints", &self.constraints.len())
            .finish()
    }
}

impl Database {
    /// Create an empty database.
    pub fn new(config: DictConfig) -> Self {
        Self {
            tables: TableSet::new(config.case_insensitive_names),
            config,
            constraints: IndexMap::new(),
            table_constraints: HashMap::new(),
            data_types: DataTypeRegistry::with_standard_types(),
            sink: Arc::new(NullEventSink),
        }
    }

    /// Set the event sink.
    pub fn with_event_sink(mut self, sink: SharedEventSink) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the event sink.
    pub fn set_event_sink(&mut self, sink: SharedEventSink) {
        self.sink = sink;
    }

    /// Current event sink.
    pub fn event_sink(&self) -> SharedEventSink {
        Arc::clone(&self.sink)
    }

    /// Configuration.
    pub fn config(&self) -> &DictConfig {
        &self.config
    }

    /// Known data types.
    pub fn data_types(&self) -> &DataTypeRegistry {
        &self.data_types
    }

    /// Known data types, mutable.
    pub fn data_types_mut(&mut self) -> &mut DataTypeRegistry {
        &mut self.data_types
    }

    /// Check if the database holds neither tables nor constraints.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.constraints.is_empty()
    }

    pub(crate) fn emit(&self, kind: DictEventKind) {
        self.sink.emit(DictEvent::new(kind));
    }

    // --- tables ---

    /// Tables as a resolver for references.
    pub fn table_set(&self) -> &TableSet {
        &self.tables
    }

    /// Tables in order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    /// Number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Get a table by handle.
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(id)
    }

    /// Position of a table in the table sequence.
    pub fn table_index(&self, id: TableId) -> Option<usize> {
        self.tables.position(id)
    }

    /// Get a table by name.
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.by_name(name)
    }

    /// Get a table by its document-local id.
    pub fn table_by_xml_id(&self, xml_id: &str) -> Option<&Table> {
        self.tables.by_xml_id(xml_id)
    }

    /// Append a table.
    pub fn add_table(&mut self, table: Table) -> Result<TableId> {
        let position = self.tables.len();
        self.insert_table_at(table, position)
    }

    /// Insert a table keeping the sequence sorted by name.
    pub fn insert_table_sorted(&mut self, table: Table) -> Result<TableId> {
        let position = self.sorted_position(table.name());
        self.insert_table_at(table, position)
    }

    pub(crate) fn sorted_position(&self, name: &str) -> usize {
        self.tables
            .iter()
            .position(|t| t.name() > name)
            .unwrap_or(self.tables.len())
    }

    /// Insert a table at `position`, clamped to the table count.
    pub fn insert_table_at(&mut self, table: Table, position: usize) -> Result<TableId> {
        if self.tables.get(table.id()).is_some() {
            return Err(Error::Structural(format!(
                "table '{}' is already in the database",
                table.name()
            )));
        }
        if self.tables.by_name.contains_key(table.name()) {
            return Err(Error::Structural(format!(
                "database already has a table named '{}'",
                table.name()
            )));
        }
        if let Some(parent) = table.parents().iter().find(|p| self.tables.get(**p).is_none()) {
            return Err(Error::NotFound(format!("parent {}", parent)));
        }

        let name = table.name().to_string();
        let id = self.tables.insert_at(position, table);
        debug!(table = %name, position, "table added");
        self.emit(DictEventKind::TableAdded { table: id, name });
        self.activate_pending();
        Ok(id)
    }

    /// Change table properties through `update`, emitting an update event
    /// if the description, owner or view flag changed.
    ///
    /// Fields of a stored table only change through the database:
    ///
    /// ```compile_fail
    /// use sqldict_core::{Database, Field, Table};
    ///
    /// let mut db = Database::default();
    /// let t = db.add_table(Table::new("users")).unwrap();
    /// db.update_table(t, |t| {
    ///     t.add_field(Field::new("id")).unwrap();
    /// })
    /// .unwrap();
    /// ```
    pub fn update_table<F>(&mut self, id: TableId, update: F) -> Result<bool>
    where
        F: FnOnce(&mut Table),
    {
        let table = self
            .tables
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let before = (
            table.description.clone(),
            table.owner.clone(),
            table.is_view,
        );
        update(table);
        let changed = before != (table.description.clone(), table.owner.clone(), table.is_view);
        if changed {
            let name = table.name().to_string();
            self.emit(DictEventKind::TableUpdated { table: id, name });
        }
        Ok(changed)
    }

    /// Set the parent tables of a table.
    pub fn set_table_parents(&mut self, id: TableId, parents: Vec<TableId>) -> Result<()> {
        if self.tables.get(id).is_none() {
            return Err(Error::NotFound(id.to_string()));
        }
        let mut seen = HashSet::new();
        for parent in &parents {
            if *parent == id {
                return Err(Error::Structural(format!("{} cannot inherit from itself", id)));
            }
            if self.tables.get(*parent).is_none() {
                return Err(Error::NotFound(format!("parent {}", parent)));
            }
            if !seen.insert(*parent) {
                return Err(Error::Structural(format!("duplicate parent {}", parent)));
            }
        }
        if let Some(table) = self.tables.get_mut(id) {
            if table.parents() != parents.as_slice() {
                table.set_parents(parents);
                let name = table.name().to_string();
                self.emit(DictEventKind::TableUpdated { table: id, name });
            }
        }
        Ok(())
    }

    /// Destroy a table, its fields and every constraint that depends on it.
    pub fn remove_table(&mut self, id: TableId) -> Result<Table> {
        let table = self
            .tables
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let fields: HashSet<FieldId> = table.field_ids().collect();

        let dependents: Vec<ConstraintId> = self
            .constraints
            .values()
            .filter(|c| {
                c.table() == id
                    || c.references_table(id)
                    || c.pairs()
                        .iter()
                        .any(|p| p.remote.field().is_some_and(|f| fields.contains(&f)))
            })
            .map(|c| c.id())
            .collect();
        for cid in dependents {
            self.remove_constraint(cid)?;
        }

        let children: Vec<TableId> = self
            .tables
            .iter()
            .filter(|t| t.parents().contains(&id))
            .map(|t| t.id())
            .collect();
        for child in children {
            if let Some(t) = self.tables.get_mut(child) {
                t.remove_parent(id);
                let name = t.name().to_string();
                self.emit(DictEventKind::TableUpdated { table: child, name });
            }
        }

        let table = self
            .tables
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.table_constraints.remove(&id);
        for field in table.fields() {
            self.emit(DictEventKind::FieldRemoved {
                table: id,
                field: field.id(),
                name: field.name().to_string(),
            });
        }
        debug!(table = %table.name(), "table removed");
        self.emit(DictEventKind::TableRemoved {
            table: id,
            name: table.name().to_string(),
        });
        Ok(table)
    }

    /// Destroy every constraint, then every table.
    pub fn clear(&mut self) {
        let constraint_ids: Vec<ConstraintId> = self.constraints.keys().copied().collect();
        for id in constraint_ids {
            let _ = self.remove_constraint(id);
        }
        let table_ids: Vec<TableId> = self.tables.iter().map(|t| t.id()).collect();
        for id in table_ids {
            let _ = self.remove_table(id);
        }
    }

    // --- fields ---

    /// Get a field of any table.
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.tables.field(id)
    }

    /// Table owning a field.
    pub fn field_table(&self, id: FieldId) -> Option<TableId> {
        self.tables.field_table(id)
    }

    /// Get a field by `table.field` name.
    pub fn field_by_name(&self, full_name: &str) -> Option<&Field> {
        match self.tables.lookup(RefKind::Field, RefBy::Name, full_name)? {
            RefHandle::Field(id) => self.field(id),
            RefHandle::Table(_) => None,
        }
    }

    /// Get a field by its document-local id.
    pub fn field_by_xml_id(&self, xml_id: &str) -> Option<&Field> {
        match self.tables.lookup(RefKind::Field, RefBy::XmlId, xml_id)? {
            RefHandle::Field(id) => self.field(id),
            RefHandle::Table(_) => None,
        }
    }

    /// Append a field to a table.
    pub fn add_field(&mut self, table: TableId, field: Field) -> Result<FieldId> {
        self.attach_field(table, field, |t, f| t.add_field(f))
    }

    /// Insert a field into a table at `position`.
    pub fn add_field_at(&mut self, table: TableId, field: Field, position: usize) -> Result<FieldId> {
        self.attach_field(table, field, |t, f| t.add_field_at(f, position))
    }

    /// Insert a field before `before`, or append when `before` is `None`.
    pub fn add_field_before(
        &mut self,
        table: TableId,
        field: Field,
        before: Option<FieldId>,
    ) -> Result<FieldId> {
        self.attach_field(table, field, |t, f| t.add_field_before(f, before))
    }

    fn attach_field<F>(&mut self, table: TableId, field: Field, insert: F) -> Result<FieldId>
    where
        F: FnOnce(&mut Table, Field) -> Result<FieldId>,
    {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::NotFound(table.to_string()))?;
        let name = field.name().to_string();
        let id = insert(t, field)?;
        self.emit(DictEventKind::FieldAdded {
            table,
            field: id,
            name,
        });
        self.activate_pending();
        Ok(id)
    }

    /// Exchange the column positions of two fields of a table.
    pub fn swap_fields(&mut self, table: TableId, a: FieldId, b: FieldId) -> Result<()> {
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::NotFound(table.to_string()))?;
        t.swap_fields(a, b)?;
        let name = t.name().to_string();
        self.emit(DictEventKind::TableUpdated { table, name });
        Ok(())
    }

    /// Rename a field, keeping its handle and position.
    pub fn rename_field(&mut self, id: FieldId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let table = self
            .tables
            .field_table(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let t = self
            .tables
            .get_mut(table)
            .ok_or_else(|| Error::NotFound(table.to_string()))?;
        if t.field(id).is_some_and(|f| f.name() == name) {
            return Ok(());
        }
        t.rename_field(id, name.clone())?;
        self.emit(DictEventKind::FieldUpdated {
            table,
            field: id,
            name,
        });
        self.activate_pending();
        Ok(())
    }

    /// Change field properties through `update`, emitting an update event
    /// if anything changed.
    pub fn update_field<F>(&mut self, id: FieldId, update: F) -> Result<bool>
    where
        F: FnOnce(&mut Field),
    {
        let table = self
            .tables
            .field_table(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let field = self
            .tables
            .get_mut(table)
            .and_then(|t| t.field_mut(id))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let before = field.clone();
        update(field);
        let changed = !before.same_definition(field);
        if changed {
            let name = field.name().to_string();
            self.emit(DictEventKind::FieldUpdated {
                table,
                field: id,
                name,
            });
        }
        Ok(changed)
    }

    /// Destroy a field and every constraint that uses or references it.
    pub fn remove_field(&mut self, id: FieldId) -> Result<Field> {
        let table = self
            .tables
            .field_table(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let dependents: Vec<ConstraintId> = self
            .constraints
            .values()
            .filter(|c| c.uses_field(id) || c.references_field(id))
            .map(|c| c.id())
            .collect();
        for cid in dependents {
            self.remove_constraint(cid)?;
        }

        let field = self
            .tables
            .get_mut(table)
            .and_then(|t| t.take_field(id))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        debug!(field = %field.name(), table = %table, "field removed");
        self.emit(DictEventKind::FieldRemoved {
            table,
            field: id,
            name: field.name().to_string(),
        });
        Ok(field)
    }

    /// Check if a field accepts NULL (no not-null constraint on it).
    pub fn field_is_null_allowed(&self, field: FieldId) -> bool {
        !self.field_constraints(field).any(|c| {
            c.kind() == ConstraintKind::NotNull && c.uses_field(field)
        })
    }

    /// Check if a field is part of its table's primary key.
    pub fn field_is_pkey_part(&self, field: FieldId) -> bool {
        self.field_constraints(field)
            .any(|c| c.kind() == ConstraintKind::PrimaryKey && c.uses_field(field))
    }

    /// Check if a field is the whole primary key of its table.
    pub fn field_is_pkey_alone(&self, field: FieldId) -> bool {
        self.field_constraints(field)
            .any(|c| c.kind() == ConstraintKind::PrimaryKey && c.fields() == [field])
    }

    /// Check if a field is a local field of some foreign key.
    pub fn field_is_fkey_part(&self, field: FieldId) -> bool {
        self.field_constraints(field)
            .any(|c| c.kind() == ConstraintKind::ForeignKey && c.uses_field(field))
    }

    /// Check if a field is the only local field of some foreign key.
    pub fn field_is_fkey_alone(&self, field: FieldId) -> bool {
        self.field_constraints(field)
            .any(|c| c.kind() == ConstraintKind::ForeignKey && c.fields() == [field])
    }

    fn field_constraints(&self, field: FieldId) -> impl Iterator<Item = &Constraint> {
        let table = self.tables.field_table(field);
        table
            .and_then(|t| self.table_constraints.get(&t))
            .into_iter()
            .flatten()
            .filter_map(move |id| self.constraints.get(id))
    }

    // --- constraints ---

    /// All constraints, in insertion order.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.values()
    }

    /// Number of constraints.
    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Get a constraint by handle.
    pub fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id)
    }

    /// Constraints attached to a table.
    pub fn table_constraints(&self, table: TableId) -> Vec<&Constraint> {
        self.table_constraints
            .get(&table)
            .into_iter()
            .flatten()
            .filter_map(|id| self.constraints.get(id))
            .collect()
    }

    /// Primary key of a table.
    pub fn table_pk_constraint(&self, table: TableId) -> Option<&Constraint> {
        self.table_constraints(table)
            .into_iter()
            .find(|c| c.kind() == ConstraintKind::PrimaryKey)
    }

    /// All foreign keys.
    pub fn fk_constraints(&self) -> Vec<&Constraint> {
        self.constraints
            .values()
            .filter(|c| c.kind() == ConstraintKind::ForeignKey)
            .collect()
    }

    /// Foreign keys between two tables.
    ///
    /// With `t1_has_fk`, returns the foreign keys declared on `table1`
    /// (restricted to those referencing `table2` when given), or, without
    /// `table1`, every foreign key referencing `table2`. Otherwise returns
    /// the foreign keys linking the two tables in either direction, where
    /// a missing table matches any table. Returns nothing if both are
    /// missing.
    pub fn tables_fk_constraints(
        &self,
        table1: Option<TableId>,
        table2: Option<TableId>,
        t1_has_fk: bool,
    ) -> Vec<&Constraint> {
        if table1.is_none() && table2.is_none() {
            return Vec::new();
        }
        let fks = self.fk_constraints().into_iter();
        if t1_has_fk {
            match table1 {
                Some(t1) => fks
                    .filter(|c| c.table() == t1 && (table2.is_none() || c.ref_table() == table2))
                    .collect(),
                None => fks.filter(|c| c.ref_table() == table2).collect(),
            }
        } else {
            let accepts = |t: Option<TableId>, candidate: Option<TableId>| {
                t.is_none() || t == candidate
            };
            fks.filter(|c| {
                let fk_table = Some(c.table());
                let ref_table = c.ref_table();
                (accepts(table1, fk_table) && accepts(table2, ref_table))
                    || (accepts(table1, ref_table) && accepts(table2, fk_table))
            })
            .collect()
        }
    }

    /// Add a user-defined constraint.
    ///
    /// The constraint is activated, then merged into an equivalent existing
    /// constraint (which adopts its name, description and owner) or
    /// appended. Returns the handle of the constraint now in the database.
    pub fn add_constraint(&mut self, mut constraint: Constraint) -> Result<ConstraintId> {
        constraint.user_defined = true;
        self.insert_constraint(constraint, true)
    }

    pub(crate) fn insert_constraint(
        &mut self,
        mut constraint: Constraint,
        merge: bool,
    ) -> Result<ConstraintId> {
        let table = constraint.table();
        if self.tables.get(table).is_none() {
            return Err(Error::NotFound(format!("constraint table {}", table)));
        }
        if self.constraints.contains_key(&constraint.id()) {
            return Err(Error::Structural(format!(
                "{} is already in the database",
                constraint.id()
            )));
        }
        constraint.validate(&self.tables)?;
        constraint.activate(&self.tables)?;

        if merge {
            if let Some(existing) = self.find_equivalent_constraint(&constraint)? {
                let changed = self
                    .constraints
                    .get_mut(&existing)
                    .map(|c| c.adopt_metadata(&constraint))
                    .unwrap_or(false);
                if changed {
                    self.emit(DictEventKind::ConstraintUpdated {
                        constraint: existing,
                        table,
                        kind: constraint.kind(),
                    });
                }
                return Ok(existing);
            }
        }

        let id = constraint.id();
        let kind = constraint.kind();
        self.constraints.insert(id, constraint);
        self.table_constraints.entry(table).or_default().push(id);
        debug!(constraint = %id, table = %table, kind = kind.code(), "constraint added");
        self.emit(DictEventKind::ConstraintAdded {
            constraint: id,
            table,
            kind,
        });
        Ok(id)
    }

    /// Find a constraint of the same table equivalent to `candidate`.
    pub fn find_equivalent_constraint(
        &mut self,
        candidate: &Constraint,
    ) -> Result<Option<ConstraintId>> {
        let ids = self
            .table_constraints
            .get(&candidate.table())
            .cloned()
            .unwrap_or_default();
        for id in ids {
            let Some(existing) = self.constraints.get_mut(&id) else {
                continue;
            };
            if existing.kind() != candidate.kind() || existing.id() == candidate.id() {
                continue;
            }
            if let Err(e) = existing.activate(&self.tables) {
                warn!(constraint = %id, error = %e, "constraint failed to activate");
            }
            if existing.equivalent(candidate)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Destroy a constraint.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> Result<Constraint> {
        let constraint = self
            .constraints
            .shift_remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let table = constraint.table();
        if let Some(list) = self.table_constraints.get_mut(&table) {
            list.retain(|c| *c != id);
            if list.is_empty() {
                self.table_constraints.remove(&table);
            }
        }
        debug!(constraint = %id, table = %table, "constraint removed");
        self.emit(DictEventKind::ConstraintRemoved {
            constraint: id,
            table,
            kind: constraint.kind(),
        });
        Ok(constraint)
    }

    /// Replace the fields of a primary key, unique or not-null constraint.
    pub fn set_constraint_fields(&mut self, id: ConstraintId, fields: Vec<FieldId>) -> Result<()> {
        let constraint = self
            .constraints
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        constraint.set_fields(&self.tables, fields)
    }

    /// Replace the pairs of a foreign key. Returns whether it is active.
    pub fn set_constraint_pairs(&mut self, id: ConstraintId, pairs: Vec<FkPair>) -> Result<bool> {
        let constraint = self
            .constraints
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        constraint.set_fk_pairs(&self.tables, pairs)
    }

    /// Set the referential actions of a foreign key.
    pub fn set_constraint_actions(
        &mut self,
        id: ConstraintId,
        on_update: FkAction,
        on_delete: FkAction,
    ) -> Result<()> {
        let constraint = self
            .constraints
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        constraint.set_actions(on_update, on_delete);
        Ok(())
    }

    /// Activate one constraint.
    pub fn activate_constraint(&mut self, id: ConstraintId) -> Result<bool> {
        let constraint = self
            .constraints
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        constraint.activate(&self.tables)
    }

    /// Try to activate every inactive constraint. Returns how many became
    /// active.
    pub fn activate_pending(&mut self) -> usize {
        let mut activated = 0;
        for constraint in self.constraints.values_mut() {
            if constraint.is_active() {
                continue;
            }
            match constraint.activate(&self.tables) {
                Ok(true) => activated += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(constraint = %constraint.id(), error = %e, "constraint failed to activate")
                }
            }
        }
        activated
    }

    /// Activate every constraint and destroy those that cannot be
    /// activated. Returns the destroyed handles.
    pub fn prune_inactive_constraints(&mut self) -> Vec<ConstraintId> {
        let mut failed = Vec::new();
        for constraint in self.constraints.values_mut() {
            match constraint.activate(&self.tables) {
                Ok(true) => {}
                Ok(false) => failed.push(constraint.id()),
                Err(e) => {
                    warn!(constraint = %constraint.id(), error = %e, "constraint failed to activate");
                    failed.push(constraint.id());
                }
            }
        }
        for id in &failed {
            let _ = self.remove_constraint(*id);
        }
        failed
    }

    /// Check the internal indexes against the object graph.
    pub fn verify_integrity(&self) -> Result<()> {
        let mut indexed = 0;
        for (table, list) in &self.table_constraints {
            for id in list {
                let c = self.constraints.get(id).ok_or_else(|| {
                    Error::Structural(format!("{} indexed but not owned", id))
                })?;
                if c.table() != *table {
                    return Err(Error::Structural(format!("{} indexed under {}", id, table)));
                }
                indexed += 1;
            }
        }
        if indexed != self.constraints.len() {
            return Err(Error::Structural(format!(
                "{} constraints, {} index entries",
                self.constraints.len(),
                indexed
            )));
        }
        for c in self.constraints.values() {
            if self.tables.get(c.table()).is_none() {
                return Err(Error::Structural(format!("{} on missing table", c.id())));
            }
            c.validate(&self.tables)?;
            for pair in c.pairs() {
                if let Some(f) = pair.remote.field() {
                    if self.tables.field_table(f).is_none() {
                        return Err(Error::Structural(format!(
                            "{} references missing {}",
                            c.id(),
                            f
                        )));
                    }
                }
            }
        }
        for t in self.tables.iter() {
            if t.fields().any(|f| f.table() != Some(t.id())) {
                return Err(Error::Structural(format!(
                    "field of '{}' with wrong back-reference",
                    t.name()
                )));
            }
            if let Some(p) = t.parents().iter().find(|p| self.tables.get(**p).is_none()) {
                return Err(Error::Structural(format!("'{}' has missing parent {}", t.name(), p)));
            }
        }
        Ok(())
    }

    /// Human-readable listing of the dictionary.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Database: {} tables, {} constraints",
            self.tables.len(),
            self.constraints.len()
        );
        for table in self.tables.iter() {
            let kind = if table.is_view { "View" } else { "Table" };
            let _ = write!(out, "  {} {}", kind, table.name());
            if let Some(owner) = &table.owner {
                let _ = write!(out, " owner={}", owner);
            }
            let _ = writeln!(out);
            for (i, field) in table.fields().enumerate() {
                let type_name = field
                    .data_type
                    .as_ref()
                    .map(|dt| dt.sql_name.as_str())
                    .unwrap_or("?");
                let _ = write!(out, "    {}. {} {}", i + 1, field.name(), type_name);
                match (field.length, field.scale) {
                    (Some(l), Some(s)) if s > 0 => {
                        let _ = write!(out, "({},{})", l, s);
                    }
                    (Some(l), _) => {
                        let _ = write!(out, "({})", l);
                    }
                    _ => {}
                }
                if !self.field_is_null_allowed(field.id()) {
                    let _ = write!(out, " NOT NULL");
                }
                if let Some(default) = &field.default {
                    let _ = write!(out, " DEFAULT {}", default.text);
                }
                if field.is_auto_increment() {
                    let _ = write!(out, " AUTO_INCREMENT");
                }
                let _ = writeln!(out);
            }
        }
        for c in self.constraints.values() {
            let _ = writeln!(out, "  {}", self.describe_constraint(c));
        }
        out
    }

    fn describe_constraint(&self, c: &Constraint) -> String {
        let table_name = self
            .tables
            .get(c.table())
            .map(|t| t.name().to_string())
            .unwrap_or_default();
        let field_name = |id: FieldId| {
            self.field(id)
                .map(|f| f.name().to_string())
                .unwrap_or_else(|| id.to_string())
        };
        let locals: Vec<String> = c.fields().into_iter().map(&field_name).collect();
        let mut line = format!(
            "{} {} ({})",
            c.kind().code(),
            table_name,
            locals.join(", ")
        );
        if let Some(name) = &c.name {
            line.push_str(&format!(" name={}", name));
        }
        if c.kind() == ConstraintKind::ForeignKey {
            let remotes: Vec<String> = c
                .pairs()
                .iter()
                .map(|p| match &p.remote {
                    RemoteField::Field(f) => field_name(*f),
                    RemoteField::Ref(r) => match r.resolved_field() {
                        Some(f) => field_name(f),
                        None => format!("?{}", r.target()),
                    },
                })
                .collect();
            let ref_name = c
                .ref_table()
                .and_then(|t| self.tables.get(t))
                .map(|t| t.name().to_string())
                .unwrap_or_else(|| "?".to_string());
            line.push_str(&format!(" -> {} ({})", ref_name, remotes.join(", ")));
        }
        if !c.is_active() {
            line.push_str(" [inactive]");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::constraint::field_ref;
    use crate::events::MemoryEventSink;

    fn db_with_sink() -> (Database, Arc<MemoryEventSink>) {
        let sink = Arc::new(MemoryEventSink::new());
        let db = Database::default().with_event_sink(sink.clone());
        (db, sink)
    }

    fn two_tables(db: &mut Database) -> (TableId, TableId, FieldId, FieldId, FieldId) {
        let mut a = Table::new("a");
        let a_id = a.add_field(Field::new("id")).unwrap();
        let a_bid = a.add_field(Field::new("b_id")).unwrap();
        let mut b = Table::new("b");
        let b_id = b.add_field(Field::new("id")).unwrap();
        let ta = db.add_table(a).unwrap();
        let tb = db.add_table(b).unwrap();
        (ta, tb, a_id, a_bid, b_id)
    }

    #[test]
    fn test_sorted_insertion() {
        let mut db = Database::default();
        for name in ["orders", "accounts", "zones", "items"] {
            db.insert_table_sorted(Table::new(name)).unwrap();
        }
        let names: Vec<_> = db.tables().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["accounts", "items", "orders", "zones"]);
    }

    #[test]
    fn test_duplicate_table_name_rejected() {
        let mut db = Database::default();
        db.add_table(Table::new("users")).unwrap();
        assert!(matches!(
            db.add_table(Table::new("users")),
            Err(Error::Structural(_))
        ));
        assert_eq!(db.table_count(), 1);
    }

    #[test]
    fn test_table_lookups() {
        let mut db = Database::new(DictConfig::default().with_case_insensitive_names(true));
        let mut users = Table::new("Users");
        users.add_field(Field::new("Id")).unwrap();
        let id = db.add_table(users).unwrap();

        assert_eq!(db.table_by_name("Users").map(|t| t.id()), Some(id));
        assert_eq!(db.table_by_name("users").map(|t| t.id()), Some(id));
        assert_eq!(db.table_by_xml_id("TVUsers").map(|t| t.id()), Some(id));
        assert!(db.field_by_name("users.id").is_some());
        assert!(db.field_by_xml_id("TVUsers:FIId").is_some());
        assert!(db.field_by_name("nodot").is_none());

        let strict = Database::default();
        assert!(strict.table_by_name("users").is_none());
    }

    #[test]
    fn test_add_constraint_merges_equivalent() {
        let (mut db, sink) = db_with_sink();
        let (ta, _, a_id, _, _) = two_tables(&mut db);

        let first = db
            .add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]).with_name("pk_a"))
            .unwrap();
        sink.clear();

        let second = db
            .add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]).with_name("a_pkey"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(db.constraint_count(), 1);
        assert_eq!(db.constraint(first).and_then(|c| c.name.as_deref()), Some("a_pkey"));
        assert!(db.constraint(first).map(|c| c.user_defined).unwrap_or(false));
        assert!(matches!(
            sink.changes()[0].kind,
            DictEventKind::ConstraintUpdated { .. }
        ));
    }

    #[test]
    fn test_add_constraint_rejects_foreign_fields() {
        let mut db = Database::default();
        let (ta, _, _, _, b_id) = two_tables(&mut db);
        let result = db.add_constraint(Constraint::unique(ta).with_fields(vec![b_id]));
        assert!(matches!(result, Err(Error::Structural(_))));
        assert_eq!(db.constraint_count(), 0);
    }

    #[test]
    fn test_remove_field_cascades() {
        let mut db = Database::default();
        let (ta, _, a_id, a_bid, b_id) = two_tables(&mut db);
        let pk = db
            .add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]))
            .unwrap();
        let fk = db
            .add_constraint(Constraint::foreign_key(ta).with_pairs(vec![FkPair::new(a_bid, b_id)]))
            .unwrap();

        db.remove_field(b_id).unwrap();
        assert!(db.constraint(fk).is_none());
        assert!(db.constraint(pk).is_some());
        assert_eq!(db.table(ta).map(|t| t.field_count()), Some(2));
        db.verify_integrity().unwrap();
    }

    #[test]
    fn test_remove_table_cascades() {
        let (mut db, sink) = db_with_sink();
        let (ta, tb, a_id, a_bid, b_id) = two_tables(&mut db);
        db.add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]))
            .unwrap();
        let fk = db
            .add_constraint(Constraint::foreign_key(ta).with_pairs(vec![FkPair::new(a_bid, b_id)]))
            .unwrap();
        db.set_table_parents(ta, vec![tb]).unwrap();
        sink.clear();

        db.remove_table(tb).unwrap();
        assert!(db.constraint(fk).is_none());
        assert_eq!(db.constraint_count(), 1);
        assert!(db.table(ta).map(|t| t.parents().is_empty()).unwrap_or(false));
        assert!(db.field(a_bid).is_some());
        db.verify_integrity().unwrap();

        let kinds: Vec<_> = sink.changes().into_iter().map(|e| e.kind).collect();
        assert!(kinds
            .iter()
            .any(|k| matches!(k, DictEventKind::ConstraintRemoved { constraint, .. } if *constraint == fk)));
        assert!(matches!(kinds.last(), Some(DictEventKind::TableRemoved { table, .. }) if *table == tb));
    }

    #[test]
    fn test_deferred_fk_activates_when_table_appears() {
        let mut db = Database::default();
        let mut a = Table::new("a");
        let a_bid = a.add_field(Field::new("b_id")).unwrap();
        let ta = db.add_table(a).unwrap();

        let fk = db
            .add_constraint(
                Constraint::foreign_key(ta)
                    .with_pairs(vec![FkPair::deferred(a_bid, field_ref("b", "id"))]),
            )
            .unwrap();
        assert!(!db.constraint(fk).map(|c| c.is_active()).unwrap_or(true));

        let mut b = Table::new("b");
        b.add_field(Field::new("id")).unwrap();
        let tb = db.add_table(b).unwrap();

        let c = db.constraint(fk).unwrap();
        assert!(c.is_active());
        assert_eq!(c.ref_table(), Some(tb));
    }

    #[test]
    fn test_prune_inactive_constraints() {
        let mut db = Database::default();
        let mut a = Table::new("a");
        let a_bid = a.add_field(Field::new("b_id")).unwrap();
        let ta = db.add_table(a).unwrap();
        let fk = db
            .add_constraint(
                Constraint::foreign_key(ta)
                    .with_pairs(vec![FkPair::deferred(a_bid, field_ref("missing", "id"))]),
            )
            .unwrap();

        assert_eq!(db.prune_inactive_constraints(), vec![fk]);
        assert_eq!(db.constraint_count(), 0);
    }

    #[test]
    fn test_field_predicates() {
        let mut db = Database::default();
        let (ta, _, a_id, a_bid, b_id) = two_tables(&mut db);
        db.add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]))
            .unwrap();
        db.add_constraint(Constraint::not_null(ta, a_id)).unwrap();
        db.add_constraint(Constraint::foreign_key(ta).with_pairs(vec![FkPair::new(a_bid, b_id)]))
            .unwrap();

        assert!(db.field_is_pkey_part(a_id));
        assert!(db.field_is_pkey_alone(a_id));
        assert!(!db.field_is_null_allowed(a_id));
        assert!(db.field_is_null_allowed(a_bid));
        assert!(db.field_is_fkey_part(a_bid));
        assert!(db.field_is_fkey_alone(a_bid));
        assert!(!db.field_is_fkey_part(b_id));
        assert_eq!(
            db.table_pk_constraint(ta).map(|c| c.fields()),
            Some(vec![a_id])
        );
    }

    #[test]
    fn test_tables_fk_constraints() {
        let mut db = Database::default();
        let (ta, tb, _, a_bid, b_id) = two_tables(&mut db);
        let mut c = Table::new("c");
        let c_id = c.add_field(Field::new("id")).unwrap();
        let tc = db.add_table(c).unwrap();
        db.add_constraint(Constraint::foreign_key(ta).with_pairs(vec![FkPair::new(a_bid, b_id)]))
            .unwrap();
        db.add_constraint(Constraint::foreign_key(tc).with_pairs(vec![FkPair::new(c_id, b_id)]))
            .unwrap();

        assert!(db.tables_fk_constraints(None, None, false).is_empty());
        assert_eq!(db.tables_fk_constraints(Some(ta), None, true).len(), 1);
        assert_eq!(db.tables_fk_constraints(Some(ta), Some(tc), true).len(), 0);
        assert_eq!(db.tables_fk_constraints(None, Some(tb), true).len(), 2);
        assert_eq!(db.tables_fk_constraints(Some(tb), Some(ta), false).len(), 1);
        assert_eq!(db.tables_fk_constraints(Some(tb), None, false).len(), 2);
        assert_eq!(db.fk_constraints().len(), 2);
    }

    #[test]
    fn test_update_events_only_on_change() {
        let (mut db, sink) = db_with_sink();
        let (ta, _, a_id, _, _) = two_tables(&mut db);
        sink.clear();

        assert!(!db.update_table(ta, |t| t.description = None).unwrap());
        assert!(db.update_table(ta, |t| t.description = Some("A".into())).unwrap());
        assert!(!db.update_field(a_id, |f| f.length = None).unwrap());
        assert!(db.update_field(a_id, |f| f.length = Some(4)).unwrap());
        assert_eq!(sink.changes().len(), 2);
    }

    #[test]
    fn test_clear_destroys_constraints_first() {
        let (mut db, sink) = db_with_sink();
        let (ta, _, a_id, _, _) = two_tables(&mut db);
        db.add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]))
            .unwrap();
        sink.clear();

        db.clear();
        assert!(db.is_empty());
        assert!(matches!(
            sink.events()[0].kind,
            DictEventKind::ConstraintRemoved { .. }
        ));
    }

    #[test]
    fn test_field_reordering_through_database() {
        let (mut db, sink) = db_with_sink();
        let (ta, _, a_id, a_bid, _) = two_tables(&mut db);
        sink.clear();

        let note = db
            .add_field_before(ta, Field::new("note"), Some(a_bid))
            .unwrap();
        let names: Vec<_> = db.table(ta).unwrap().fields().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["id", "note", "b_id"]);
        assert!(matches!(
            db.add_field_before(ta, Field::new("x"), Some(FieldId::generate())),
            Err(Error::Structural(_))
        ));

        db.swap_fields(ta, a_id, note).unwrap();
        assert_eq!(db.table(ta).unwrap().field_index(note), Some(0));
        assert!(matches!(
            db.swap_fields(ta, a_id, FieldId::generate()),
            Err(Error::Structural(_))
        ));

        let kinds: Vec<_> = sink.changes().into_iter().map(|e| e.kind).collect();
        assert!(matches!(
            kinds.as_slice(),
            [DictEventKind::FieldAdded { .. }, DictEventKind::TableUpdated { .. }]
        ));
    }

    #[test]
    fn test_rename_binds_pending_reference() {
        let mut db = Database::default();
        let (ta, tb, _, a_bid, b_id) = two_tables(&mut db);
        let fk = db
            .add_constraint(
                Constraint::foreign_key(ta)
                    .with_pairs(vec![FkPair::deferred(a_bid, field_ref("b", "code"))]),
            )
            .unwrap();
        assert!(!db.constraint(fk).unwrap().is_active());

        db.rename_field(b_id, "code").unwrap();
        assert_eq!(db.table(tb).unwrap().field_by_name("code").map(|f| f.id()), Some(b_id));
        assert!(db.constraint(fk).unwrap().is_active());
        db.rename_field(b_id, "code").unwrap();
    }

    #[test]
    fn test_shared_database() {
        let shared = new_shared_database(Database::default());
        shared.write().add_table(Table::new("t")).unwrap();
        assert_eq!(shared.read().table_count(), 1);
    }

    #[test]
    fn test_dump() {
        let mut db = Database::default();
        let (ta, _, a_id, a_bid, b_id) = two_tables(&mut db);
        db.add_constraint(Constraint::primary_key(ta).with_fields(vec![a_id]))
            .unwrap();
        db.add_constraint(Constraint::foreign_key(ta).with_pairs(vec![FkPair::new(a_bid, b_id)]))
            .unwrap();
        let dump = db.dump();
        assert!(dump.starts_with("Database: 2 tables, 2 constraints"));
        assert!(dump.contains("PKEY a (id)"));
        assert!(dump.contains("FKEY a (b_id) -> b (id)"));
    }
}
