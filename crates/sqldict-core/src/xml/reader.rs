//! XML deserialization.
//!
//! The document is first parsed into a small element tree. Tables and their
//! fields are then registered before any constraint is read, so constraint
//! `table`, `field` and `ref` attributes always see every table of the
//! document.

use super::ids::{data_type_name, field_xml_id, table_xml_id};
use super::{
    CONSTRAINTS_TAG, CONSTRAINT_FIELD_TAG, CONSTRAINT_PAIR_TAG, CONSTRAINT_TAG, DATABASE_TAG,
    FIELD_TAG, PARENT_TABLE_TAG, TABLES_TAG, TABLE_TAG,
};
use crate::catalog::{
    Constraint, ConstraintKind, Database, DefaultValue, EntityRef, Field, FieldAttributes,
    FieldId, FkAction, FkPair, RefKind, Table, TableId, ValueType,
};
use crate::error::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Element with its attributes and child elements. Text is ignored.
#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn from_start(element: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| Error::XmlLoad(format!("<{}>: {}", name, e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| Error::XmlLoad(format!("<{}> {}: {}", name, key, e)))?
                .into_owned();
            attrs.push((key, value));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.attr(key)
            .ok_or_else(|| Error::XmlLoad(format!("<{}> has no \"{}\" attribute", self.name, key)))
    }

    fn flag(&self, key: &str) -> bool {
        self.attr(key).is_some_and(|v| v.starts_with('t'))
    }

    fn int(&self, key: &str) -> Result<Option<i32>> {
        self.attr(key)
            .map(|v| {
                v.trim().parse::<i32>().map_err(|_| {
                    Error::XmlLoad(format!("<{}> {}=\"{}\" is not a number", self.name, key, v))
                })
            })
            .transpose()
    }
}

fn parse_document(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(XmlNode::from_start(&e)?),
            Event::Empty(e) => {
                let node = XmlNode::from_start(&e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| Error::XmlLoad("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(Error::XmlLoad("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| Error::XmlLoad("document has no root element".to_string()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(node);
    } else if root.is_some() {
        return Err(Error::XmlLoad("document has several root elements".to_string()));
    } else {
        *root = Some(node);
    }
    Ok(())
}

/// Document ids seen so far.
#[derive(Default)]
struct DocIds {
    tables: HashMap<String, TableId>,
    fields: HashMap<String, FieldId>,
}

impl DocIds {
    fn table(&self, xml_id: &str) -> Result<TableId> {
        self.tables
            .get(xml_id)
            .copied()
            .ok_or_else(|| Error::XmlLoad(format!("Referenced table ({}) not found", xml_id)))
    }

    fn field(&self, xml_id: &str) -> Result<FieldId> {
        self.fields.get(xml_id).copied().ok_or_else(|| {
            Error::XmlLoad(format!("Referenced field in constraint ({}) not found", xml_id))
        })
    }
}

/// Load a dictionary into an empty database.
///
/// On error the database is cleared again.
pub fn load_from_xml(db: &mut Database, xml: &str) -> Result<()> {
    if !db.is_empty() {
        return Err(Error::XmlLoad("database already contains data".to_string()));
    }
    let result = parse_document(xml).and_then(|root| load_database(db, &root));
    match &result {
        Ok(()) => debug!(
            tables = db.table_count(),
            constraints = db.constraint_count(),
            "dictionary loaded"
        ),
        Err(e) => {
            warn!(error = %e, "dictionary load failed");
            db.clear();
        }
    }
    result
}

fn load_database(db: &mut Database, root: &XmlNode) -> Result<()> {
    if root.name != DATABASE_TAG {
        return Err(Error::XmlLoad(format!(
            "root element is <{}>, expected <{}>",
            root.name, DATABASE_TAG
        )));
    }

    let mut ids = DocIds::default();
    let mut tables = Vec::new();
    let mut constraints = Vec::new();
    for section in &root.children {
        match section.name.as_str() {
            TABLES_TAG => tables.extend(section.children.iter()),
            CONSTRAINTS_TAG => constraints.extend(section.children.iter()),
            other => debug!(element = other, "ignoring dictionary section"),
        }
    }

    let mut loaded = Vec::with_capacity(tables.len());
    for node in tables {
        if node.name != TABLE_TAG {
            return Err(Error::XmlLoad(format!(
                "<{}> is not allowed in <{}>",
                node.name, TABLES_TAG
            )));
        }
        loaded.push((load_table(db, &mut ids, node)?, node));
    }
    for (table, node) in loaded {
        load_parents(db, &ids, table, node)?;
    }
    for node in constraints {
        if node.name != CONSTRAINT_TAG {
            return Err(Error::XmlLoad(format!(
                "<{}> is not allowed in <{}>",
                node.name, CONSTRAINTS_TAG
            )));
        }
        load_constraint(db, &ids, node)?;
    }
    Ok(())
}

fn load_table(db: &mut Database, ids: &mut DocIds, node: &XmlNode) -> Result<TableId> {
    let name = node.required("name")?;
    let mut table = Table::new(name).as_view(node.flag("is_view"));
    table.description = node.attr("descr").map(str::to_string);
    table.owner = node.attr("owner").map(str::to_string);
    let table_id = db.add_table(table)?;
    let doc_id = node
        .attr("id")
        .map(str::to_string)
        .unwrap_or_else(|| table_xml_id(name));
    ids.tables.insert(doc_id, table_id);

    for child in &node.children {
        match child.name.as_str() {
            FIELD_TAG => {
                let field = load_field(db, name, child)?;
                let field_name = field.name().to_string();
                let field_id = db.add_field(table_id, field)?;
                let doc_id = child
                    .attr("id")
                    .map(str::to_string)
                    .unwrap_or_else(|| field_xml_id(name, &field_name));
                ids.fields.insert(doc_id, field_id);
            }
            PARENT_TABLE_TAG => {}
            other => {
                return Err(Error::XmlLoad(format!(
                    "<{}> is not allowed in <{}>",
                    other, TABLE_TAG
                )))
            }
        }
    }
    Ok(table_id)
}

fn load_field(db: &mut Database, table: &str, node: &XmlNode) -> Result<Field> {
    let name = node.required("name")?;
    let type_id = node.required("type")?;
    let type_name = data_type_name(type_id).ok_or_else(|| {
        Error::XmlLoad(format!("field {}.{}: \"{}\" is not a data type id", table, name, type_id))
    })?;
    let data_type = db.data_types_mut().get_or_declare(&type_name, table, name);

    let mut field = Field::new(name).with_data_type(data_type);
    field.description = node.attr("descr").map(str::to_string);
    field.owner = node.attr("owner").map(str::to_string);
    field.length = node.int("length")?;
    field.scale = node.int("scale")?;
    field.default = node.attr("default").map(|text| {
        let value_type = node
            .attr("default_g_type")
            .and_then(ValueType::from_name)
            .unwrap_or(ValueType::String);
        DefaultValue::new(value_type, text)
    });
    field.attributes = node
        .attr("extra_attr")
        .map(FieldAttributes::parse)
        .unwrap_or_default();
    field.plugin = node.attr("plugin").map(str::to_string);
    Ok(field)
}

fn load_parents(db: &mut Database, ids: &DocIds, table: TableId, node: &XmlNode) -> Result<()> {
    let mut parents = Vec::new();
    for (index, child) in node
        .children
        .iter()
        .filter(|c| c.name == PARENT_TABLE_TAG)
        .enumerate()
    {
        let parent = ids.table(child.required("table")?)?;
        let order = child.int("order")?.map_or(index as i64, i64::from);
        parents.push((order, parent));
    }
    if parents.is_empty() {
        return Ok(());
    }
    parents.sort_by_key(|(order, _)| *order);
    db.set_table_parents(table, parents.into_iter().map(|(_, p)| p).collect())
}

fn load_constraint(db: &mut Database, ids: &DocIds, node: &XmlNode) -> Result<()> {
    let table = ids.table(node.required("table")?)?;
    let code = node.required("type")?;
    let kind = ConstraintKind::parse(code)
        .ok_or_else(|| Error::XmlLoad(format!("unknown constraint type \"{}\"", code)))?;
    if kind.is_check() {
        return Err(Error::Unsupported(format!("loading {} constraints", kind.code())));
    }

    let mut fields = Vec::new();
    let mut pairs = Vec::new();
    for child in &node.children {
        match child.name.as_str() {
            CONSTRAINT_FIELD_TAG => fields.push(ids.field(child.required("field")?)?),
            CONSTRAINT_PAIR_TAG => {
                let local = ids.field(child.required("field")?)?;
                let remote = child.required("ref")?;
                pairs.push(match ids.fields.get(remote) {
                    Some(remote) => FkPair::new(local, *remote),
                    None => FkPair::deferred(local, EntityRef::by_xml_id(RefKind::Field, remote)),
                });
            }
            other => {
                return Err(Error::XmlLoad(format!(
                    "<{}> is not allowed in <{}>",
                    other, CONSTRAINT_TAG
                )))
            }
        }
    }

    let constraint = match kind {
        ConstraintKind::PrimaryKey => Constraint::primary_key(table).with_fields(fields),
        ConstraintKind::Unique => Constraint::unique(table).with_fields(fields),
        ConstraintKind::NotNull => match fields.as_slice() {
            [field] => Constraint::not_null(table, *field),
            [] => {
                return Err(Error::XmlLoad(
                    "NNUL constraint does not name its field".to_string(),
                ))
            }
            _ => {
                return Err(Error::XmlLoad(
                    "NNUL constraint names several fields".to_string(),
                ))
            }
        },
        ConstraintKind::ForeignKey => Constraint::foreign_key(table)
            .with_pairs(pairs)
            .with_actions(
                FkAction::parse(node.attr("on_update").unwrap_or_default()),
                FkAction::parse(node.attr("on_delete").unwrap_or_default()),
            ),
        ConstraintKind::CheckExpr | ConstraintKind::CheckInList | ConstraintKind::CheckSetOf => {
            return Err(Error::Unsupported(format!("loading {} constraints", kind.code())))
        }
    };

    let mut constraint = constraint.with_user_defined(node.flag("user_defined"));
    constraint.name = node.attr("name").map(str::to_string);
    db.insert_constraint(constraint, false)?;
    Ok(())
}
