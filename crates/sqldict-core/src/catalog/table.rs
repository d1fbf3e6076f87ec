//! Table definitions.

use super::entity_ref::{RefBy, RefHandle, RefKind, Resolver};
use super::field::Field;
use super::ids::{FieldId, TableId};
use crate::error::{Error, Result};
use crate::xml::ids;
use indexmap::IndexMap;
use std::collections::HashMap;

/// A table or view: an ordered collection of fields.
#[derive(Debug, Clone)]
pub struct Table {
    id: TableId,
    name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Owner reported by the DBMS.
    pub owner: Option<String>,
    /// View rather than base table.
    pub is_view: bool,
    fields: IndexMap<FieldId, Field>,
    by_name: HashMap<String, FieldId>,
    parents: Vec<TableId>,
}

impl Table {
    /// Create an empty base table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TableId::generate(),
            name: name.into(),
            description: None,
            owner: None,
            is_view: false,
            fields: IndexMap::new(),
            by_name: HashMap::new(),
            parents: Vec::new(),
        }
    }

    /// Create an empty view.
    pub fn view(name: impl Into<String>) -> Self {
        Self::new(name).as_view(true)
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the view flag.
    pub fn as_view(mut self, is_view: bool) -> Self {
        self.is_view = is_view;
        self
    }

    /// Handle of this table.
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Document-local id (`TV<name>`).
    pub fn xml_id(&self) -> String {
        ids::table_xml_id(&self.name)
    }

    /// Views are read-only.
    pub fn is_writable(&self) -> bool {
        !self.is_view
    }

    /// Append a field.
    pub(crate) fn add_field(&mut self, field: Field) -> Result<FieldId> {
        let position = self.fields.len();
        self.add_field_at(field, position)
    }

    /// Insert a field at `position`, clamped to the field count.
    pub(crate) fn add_field_at(&mut self, mut field: Field, position: usize) -> Result<FieldId> {
        if let Some(owner) = field.table() {
            if owner != self.id {
                return Err(Error::Structural(format!(
                    "field '{}' already belongs to {}",
                    field.name(),
                    owner
                )));
            }
        }
        if self.fields.contains_key(&field.id()) {
            return Err(Error::Structural(format!(
                "field '{}' is already part of table '{}'",
                field.name(),
                self.name
            )));
        }
        if self.by_name.contains_key(field.name()) {
            return Err(Error::Structural(format!(
                "table '{}' already has a field named '{}'",
                self.name,
                field.name()
            )));
        }

        let id = field.id();
        field.attach(self.id);
        self.by_name.insert(field.name().to_string(), id);
        let position = position.min(self.fields.len());
        self.fields.shift_insert(position, id, field);
        Ok(id)
    }

    /// Insert a field before `before`, or append when `before` is `None`.
    pub(crate) fn add_field_before(
        &mut self,
        field: Field,
        before: Option<FieldId>,
    ) -> Result<FieldId> {
        let position = match before {
            Some(before) => self.field_index(before).ok_or_else(|| {
                Error::Structural(format!(
                    "{} is not a field of table '{}'",
                    before, self.name
                ))
            })?,
            None => self.fields.len(),
        };
        self.add_field_at(field, position)
    }

    /// Exchange the positions of two fields.
    pub(crate) fn swap_fields(&mut self, a: FieldId, b: FieldId) -> Result<()> {
        let (ia, ib) = match (self.field_index(a), self.field_index(b)) {
            (Some(ia), Some(ib)) => (ia, ib),
            _ => {
                return Err(Error::Structural(format!(
                    "cannot swap fields {} and {}: not both in table '{}'",
                    a, b, self.name
                )))
            }
        };
        self.fields.swap_indices(ia, ib);
        Ok(())
    }

    /// Rename a field, keeping its position and identity.
    pub(crate) fn rename_field(&mut self, id: FieldId, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.by_name.get(&name) {
            if *existing == id {
                return Ok(());
            }
            return Err(Error::Structural(format!(
                "table '{}' already has a field named '{}'",
                self.name, name
            )));
        }
        let field = self
            .fields
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("{} in table '{}'", id, self.name)))?;
        self.by_name.remove(field.name());
        self.by_name.insert(name.clone(), id);
        field.set_name(name);
        Ok(())
    }

    /// Detach and return a field.
    pub(crate) fn take_field(&mut self, id: FieldId) -> Option<Field> {
        let field = self.fields.shift_remove(&id)?;
        self.by_name.remove(field.name());
        Some(field)
    }

    /// Get a field by handle.
    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(&id)
    }

    /// Get a mutable field by handle.
    pub(crate) fn field_mut(&mut self, id: FieldId) -> Option<&mut Field> {
        self.fields.get_mut(&id)
    }

    /// Get the field at a column position.
    pub fn field_at(&self, index: usize) -> Option<&Field> {
        self.fields.get_index(index).map(|(_, f)| f)
    }

    /// Column position of a field.
    pub fn field_index(&self, id: FieldId) -> Option<usize> {
        self.fields.get_index_of(&id)
    }

    /// Get a field by exact name.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.by_name.get(name).and_then(|id| self.fields.get(id))
    }

    /// Get a field by name, falling back to a lowercase comparison.
    pub fn find_field(&self, name: &str, case_insensitive: bool) -> Option<&Field> {
        self.field_by_name(name).or_else(|| {
            if !case_insensitive {
                return None;
            }
            let lower = name.to_lowercase();
            self.fields.values().find(|f| f.name().to_lowercase() == lower)
        })
    }

    /// Get a field by its document-local id.
    pub fn field_by_xml_id(&self, xml_id: &str) -> Option<&Field> {
        let (table_part, field_name) = ids::split_field_xml_id(xml_id)?;
        if table_part != self.xml_id() {
            return None;
        }
        self.field_by_name(&field_name)
    }

    /// Check if the field belongs to this table.
    pub fn contains_field(&self, id: FieldId) -> bool {
        self.fields.contains_key(&id)
    }

    /// Fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Field handles in column order.
    pub fn field_ids(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.fields.keys().copied()
    }

    /// Number of fields.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Parent tables, in inheritance order.
    pub fn parents(&self) -> &[TableId] {
        &self.parents
    }

    pub(crate) fn set_parents(&mut self, parents: Vec<TableId>) {
        self.parents = parents;
    }

    pub(crate) fn remove_parent(&mut self, parent: TableId) -> bool {
        let before = self.parents.len();
        self.parents.retain(|p| *p != parent);
        self.parents.len() != before
    }
}

impl Resolver for Table {
    fn lookup(&self, kind: RefKind, by: RefBy, target: &str) -> Option<RefHandle> {
        match (kind, by) {
            (RefKind::Table, RefBy::Name) => {
                (target == self.name).then_some(RefHandle::Table(self.id))
            }
            (RefKind::Table, RefBy::XmlId) => {
                (target == self.xml_id()).then_some(RefHandle::Table(self.id))
            }
            (RefKind::Field, RefBy::Name) => {
                let (table, field) = target.rsplit_once('.')?;
                if table != self.name {
                    return None;
                }
                self.field_by_name(field).map(|f| RefHandle::Field(f.id()))
            }
            (RefKind::Field, RefBy::XmlId) => {
                self.field_by_xml_id(target).map(|f| RefHandle::Field(f.id()))
            }
        }
    }

    fn field_table(&self, field: FieldId) -> Option<TableId> {
        self.contains_field(field).then_some(self.id)
    }
}
