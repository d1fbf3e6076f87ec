//! XML serialization.

use super::ids::field_xml_id;
use super::{
    CONSTRAINTS_TAG, CONSTRAINT_FIELD_TAG, CONSTRAINT_PAIR_TAG, CONSTRAINT_TAG, DATABASE_TAG,
    FIELD_TAG, PARENT_TABLE_TAG, TABLES_TAG, TABLE_TAG,
};
use crate::catalog::{
    Constraint, ConstraintData, Database, Field, FieldId, RefBy, RemoteField, Table,
};
use crate::error::{Error, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::{debug, warn};

fn bool_attr(value: bool) -> &'static str {
    if value {
        "t"
    } else {
        "f"
    }
}

struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new(indent: usize) -> Self {
        let writer = if indent == 0 {
            Writer::new(Vec::new())
        } else {
            Writer::new_with_indent(Vec::new(), b' ', indent)
        };
        Self { writer }
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::XmlSave(e.to_string()))
    }

    fn start(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.event(Event::Start(element))
    }

    fn empty(&mut self, element: BytesStart<'_>) -> Result<()> {
        self.event(Event::Empty(element))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.writer.into_inner()).map_err(|e| Error::XmlSave(e.to_string()))
    }
}

fn push_opt<'a>(element: &mut BytesStart<'a>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        element.push_attribute((key, value));
    }
}

/// Serialize the whole dictionary.
pub fn save_to_xml(db: &Database) -> Result<String> {
    let mut out = XmlOut::new(db.config().xml_indent);
    out.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    out.start(BytesStart::new(DATABASE_TAG))?;

    out.start(BytesStart::new(TABLES_TAG))?;
    for table in db.tables() {
        write_table(&mut out, db, table)?;
    }
    out.end(TABLES_TAG)?;

    out.start(BytesStart::new(CONSTRAINTS_TAG))?;
    let mut skipped = 0;
    for constraint in db.constraints() {
        let element = match constraint_element(db, constraint) {
            Ok(element) => element,
            Err(e @ Error::Unsupported(_)) => {
                warn!(constraint = %constraint.id(), error = %e, "constraint not saved");
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        write_constraint(&mut out, db, constraint, element)?;
    }
    out.end(CONSTRAINTS_TAG)?;

    out.end(DATABASE_TAG)?;
    debug!(
        tables = db.table_count(),
        constraints = db.constraint_count() - skipped,
        "dictionary saved"
    );
    out.finish()
}

fn write_table(out: &mut XmlOut, db: &Database, table: &Table) -> Result<()> {
    let id = table.xml_id();
    let mut element = BytesStart::new(TABLE_TAG);
    element.push_attribute(("id", id.as_str()));
    element.push_attribute(("name", table.name()));
    push_opt(&mut element, "descr", table.description.as_deref());
    push_opt(&mut element, "owner", table.owner.as_deref());
    element.push_attribute(("is_view", bool_attr(table.is_view)));

    if table.parents().is_empty() && table.field_count() == 0 {
        return out.empty(element);
    }

    out.start(element)?;
    for (order, parent) in table.parents().iter().enumerate() {
        let parent = db
            .table(*parent)
            .ok_or_else(|| Error::XmlSave(format!("parent {} of {} is gone", parent, table.name())))?;
        let parent_id = parent.xml_id();
        let order = order.to_string();
        let mut element = BytesStart::new(PARENT_TABLE_TAG);
        element.push_attribute(("table", parent_id.as_str()));
        element.push_attribute(("order", order.as_str()));
        out.empty(element)?;
    }
    for field in table.fields() {
        write_field(out, table, field)?;
    }
    out.end(TABLE_TAG)
}

fn write_field(out: &mut XmlOut, table: &Table, field: &Field) -> Result<()> {
    let id = field_xml_id(table.name(), field.name());
    let data_type = field.data_type.as_ref().ok_or_else(|| {
        Error::XmlSave(format!("field {}.{} has no data type", table.name(), field.name()))
    })?;
    let type_id = data_type.xml_id();
    let length = field.length.map(|l| l.to_string());
    let scale = field.scale.map(|s| s.to_string());
    let extra = field.attributes.to_extra_attr();

    let mut element = BytesStart::new(FIELD_TAG);
    element.push_attribute(("id", id.as_str()));
    element.push_attribute(("name", field.name()));
    push_opt(&mut element, "descr", field.description.as_deref());
    push_opt(&mut element, "owner", field.owner.as_deref());
    element.push_attribute(("type", type_id.as_str()));
    push_opt(&mut element, "length", length.as_deref());
    push_opt(&mut element, "scale", scale.as_deref());
    if let Some(default) = &field.default {
        element.push_attribute(("default", default.text.as_str()));
        element.push_attribute(("default_g_type", default.value_type.name()));
    }
    push_opt(&mut element, "extra_attr", extra.as_deref());
    push_opt(&mut element, "plugin", field.plugin.as_deref());
    out.empty(element)
}

/// Build the opening element of a constraint, refusing kinds that have no
/// XML form.
fn constraint_element(db: &Database, constraint: &Constraint) -> Result<BytesStart<'static>> {
    let kind = constraint.kind();
    if kind.is_check() {
        return Err(Error::Unsupported(format!(
            "saving {} constraints",
            kind.code()
        )));
    }
    let table = db
        .table(constraint.table())
        .ok_or_else(|| Error::XmlSave(format!("table of {} is gone", constraint.id())))?;

    let mut element = BytesStart::new(CONSTRAINT_TAG);
    if let Some(name) = constraint.name.as_deref() {
        element.push_attribute(("name", name));
    }
    element.push_attribute(("user_defined", bool_attr(constraint.user_defined)));
    element.push_attribute(("type", kind.code()));
    element.push_attribute(("table", table.xml_id().as_str()));
    if let Some((on_update, on_delete)) = constraint.actions() {
        element.push_attribute(("on_update", on_update.code()));
        element.push_attribute(("on_delete", on_delete.code()));
    }
    Ok(element)
}

fn field_id(db: &Database, field: FieldId) -> Result<String> {
    let table = db
        .field_table(field)
        .and_then(|t| db.table(t))
        .ok_or_else(|| Error::XmlSave(format!("{} is not in any table", field)))?;
    let field = table
        .field(field)
        .ok_or_else(|| Error::XmlSave(format!("{} is gone", field)))?;
    Ok(field_xml_id(table.name(), field.name()))
}

fn remote_id(db: &Database, remote: &RemoteField) -> Result<String> {
    match remote {
        RemoteField::Field(id) => field_id(db, *id),
        RemoteField::Ref(r) => match (r.resolved_field(), r.by()) {
            (Some(id), _) => field_id(db, id),
            (None, RefBy::XmlId) => Ok(r.target().to_string()),
            (None, RefBy::Name) => {
                let (table, field) = r.target().rsplit_once('.').ok_or_else(|| {
                    Error::XmlSave(format!("reference {} has no table part", r.target()))
                })?;
                Ok(field_xml_id(table, field))
            }
        },
    }
}

fn write_constraint(
    out: &mut XmlOut,
    db: &Database,
    constraint: &Constraint,
    element: BytesStart<'_>,
) -> Result<()> {
    out.start(element)?;
    match constraint.data() {
        ConstraintData::ForeignKey { pairs, .. } => {
            for pair in pairs {
                let local = field_id(db, pair.local)?;
                let remote = remote_id(db, &pair.remote)?;
                let mut child = BytesStart::new(CONSTRAINT_PAIR_TAG);
                child.push_attribute(("field", local.as_str()));
                child.push_attribute(("ref", remote.as_str()));
                out.empty(child)?;
            }
        }
        _ => {
            for field in constraint.fields() {
                let id = field_id(db, field)?;
                let mut child = BytesStart::new(CONSTRAINT_FIELD_TAG);
                child.push_attribute(("field", id.as_str()));
                out.empty(child)?;
            }
        }
    }
    out.end(CONSTRAINT_TAG)
}
