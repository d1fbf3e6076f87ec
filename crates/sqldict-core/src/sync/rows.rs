//! Introspection rows.
//!
//! Rows arrive either typed ([`TableRow`], [`ColumnRow`]) or as untyped
//! cell vectors that are checked column by column before use.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One untyped cell of an introspection row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Text.
    Text(String),
}

impl Cell {
    fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "null",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "int",
            Cell::Text(_) => "text",
        }
    }
}

fn cell<'a>(cells: &'a [Cell], row: usize, col: usize) -> Result<&'a Cell> {
    cells
        .get(col)
        .ok_or_else(|| Error::InvalidRows(format!("row {}: missing column {}", row, col)))
}

fn wrong_type(row: usize, col: usize, expected: &str, found: &Cell) -> Error {
    Error::InvalidRows(format!(
        "row {}, column {}: expected {}, found {}",
        row,
        col,
        expected,
        found.type_name()
    ))
}

fn opt_text(cells: &[Cell], row: usize, col: usize) -> Result<Option<String>> {
    match cell(cells, row, col)? {
        Cell::Null => Ok(None),
        Cell::Text(s) => Ok(Some(s.clone())),
        other => Err(wrong_type(row, col, "text", other)),
    }
}

fn text(cells: &[Cell], row: usize, col: usize) -> Result<String> {
    match cell(cells, row, col)? {
        Cell::Text(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(wrong_type(row, col, "non-empty text", other)),
    }
}

fn opt_int(cells: &[Cell], row: usize, col: usize) -> Result<Option<i32>> {
    match cell(cells, row, col)? {
        Cell::Null => Ok(None),
        Cell::Int(v) => i32::try_from(*v).map(Some).map_err(|_| {
            Error::InvalidRows(format!("row {}, column {}: {} out of range", row, col, v))
        }),
        other => Err(wrong_type(row, col, "int", other)),
    }
}

fn boolean(cells: &[Cell], row: usize, col: usize) -> Result<bool> {
    match cell(cells, row, col)? {
        Cell::Bool(b) => Ok(*b),
        other => Err(wrong_type(row, col, "bool", other)),
    }
}

/// Empty strings mean "no value".
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// A table or view reported by the DBMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Table name.
    pub name: String,
    /// Owner.
    #[serde(default)]
    pub owner: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
}

impl TableRow {
    /// Number of leading cells in an untyped table row.
    pub const COLUMNS: usize = 3;

    /// Create a row.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
            description: None,
        }
    }

    /// Set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check an untyped `(name, owner, description, ...)` row.
    pub fn from_cells(row: usize, cells: &[Cell]) -> Result<Self> {
        if cells.len() < Self::COLUMNS {
            return Err(Error::InvalidRows(format!(
                "row {}: table rows need {} columns, got {}",
                row,
                Self::COLUMNS,
                cells.len()
            )));
        }
        Ok(Self {
            name: text(cells, row, 0)?,
            owner: non_empty(opt_text(cells, row, 1)?),
            description: non_empty(opt_text(cells, row, 2)?),
        })
    }
}

/// A column reported by the DBMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRow {
    /// Column name.
    pub name: String,
    /// SQL type name.
    #[serde(default)]
    pub type_name: Option<String>,
    /// Length.
    #[serde(default)]
    pub size: Option<i32>,
    /// Numeric scale.
    #[serde(default)]
    pub scale: Option<i32>,
    /// NOT NULL.
    #[serde(default)]
    pub not_null: bool,
    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// UNIQUE on its own.
    #[serde(default)]
    pub unique: bool,
    /// Referenced column as `table.column`.
    #[serde(default)]
    pub foreign_key: Option<String>,
    /// Default value.
    #[serde(default)]
    pub default_value: Option<String>,
    /// Comma-separated extra attributes (e.g. `AUTO_INCREMENT`).
    #[serde(default)]
    pub extra_attrs: Option<String>,
}

impl ColumnRow {
    /// Number of mandatory cells in an untyped column row.
    pub const COLUMNS: usize = 9;

    /// Create a row.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            size: None,
            scale: None,
            not_null: false,
            primary_key: false,
            unique: false,
            foreign_key: None,
            default_value: None,
            extra_attrs: None,
        }
    }

    /// Set the length.
    pub fn with_size(mut self, size: i32) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the scale.
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Mark NOT NULL.
    pub fn with_not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Mark as part of the primary key.
    pub fn with_primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark UNIQUE.
    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Reference `table.column`.
    pub fn with_foreign_key(mut self, target: impl Into<String>) -> Self {
        self.foreign_key = Some(target.into());
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Set the extra attributes.
    pub fn with_extra_attrs(mut self, extra: impl Into<String>) -> Self {
        self.extra_attrs = Some(extra.into());
        self
    }

    /// Check an untyped row of `(name, type, size, scale, not_null,
    /// pkey, unique, fk_target, default[, extra_attrs])`.
    pub fn from_cells(row: usize, cells: &[Cell]) -> Result<Self> {
        if cells.len() < Self::COLUMNS || cells.len() > Self::COLUMNS + 1 {
            return Err(Error::InvalidRows(format!(
                "row {}: column rows need {} or {} columns, got {}",
                row,
                Self::COLUMNS,
                Self::COLUMNS + 1,
                cells.len()
            )));
        }
        let extra_attrs = if cells.len() > Self::COLUMNS {
            non_empty(opt_text(cells, row, 9)?)
        } else {
            None
        };
        Ok(Self {
            name: text(cells, row, 0)?,
            type_name: opt_text(cells, row, 1)?,
            size: opt_int(cells, row, 2)?,
            scale: opt_int(cells, row, 3)?,
            not_null: boolean(cells, row, 4)?,
            primary_key: boolean(cells, row, 5)?,
            unique: boolean(cells, row, 6)?,
            foreign_key: non_empty(opt_text(cells, row, 7)?),
            default_value: non_empty(opt_text(cells, row, 8)?),
            extra_attrs,
        })
    }
}

/// Supplier of introspection rows.
pub trait IntrospectionSource {
    /// Base tables.
    fn tables(&self) -> Result<Vec<TableRow>>;

    /// Views.
    fn views(&self) -> Result<Vec<TableRow>>;

    /// Columns of a table or view, in column order.
    fn columns(&self, table: &str) -> Result<Vec<ColumnRow>>;
}

/// Materialized introspection results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Base tables.
    #[serde(default)]
    pub tables: Vec<TableRow>,
    /// Views.
    #[serde(default)]
    pub views: Vec<TableRow>,
    /// Columns per table name.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ColumnRow>>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a base table with its columns.
    pub fn with_table(mut self, table: TableRow, columns: Vec<ColumnRow>) -> Self {
        self.columns.insert(table.name.clone(), columns);
        self.tables.push(table);
        self
    }

    /// Add a view with its columns.
    pub fn with_view(mut self, view: TableRow, columns: Vec<ColumnRow>) -> Self {
        self.columns.insert(view.name.clone(), columns);
        self.views.push(view);
        self
    }

    /// Parse a typed snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse an untyped snapshot from JSON, checking every row.
    pub fn from_raw_json(json: &str) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_str(json)?;
        raw.into_snapshot()
    }
}

impl IntrospectionSource for SchemaSnapshot {
    fn tables(&self) -> Result<Vec<TableRow>> {
        Ok(self.tables.clone())
    }

    fn views(&self) -> Result<Vec<TableRow>> {
        Ok(self.views.clone())
    }

    fn columns(&self, table: &str) -> Result<Vec<ColumnRow>> {
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }
}

/// Introspection results as untyped cell rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSnapshot {
    /// Base table rows.
    #[serde(default)]
    pub tables: Vec<Vec<Cell>>,
    /// View rows.
    #[serde(default)]
    pub views: Vec<Vec<Cell>>,
    /// Column rows per table name.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<Vec<Cell>>>,
}

impl RawSnapshot {
    /// Check every row and build a typed snapshot.
    pub fn into_snapshot(self) -> Result<SchemaSnapshot> {
        let table_rows = |rows: Vec<Vec<Cell>>| -> Result<Vec<TableRow>> {
            rows.iter()
                .enumerate()
                .map(|(i, cells)| TableRow::from_cells(i, cells))
                .collect()
        };
        let mut columns = BTreeMap::new();
        for (table, rows) in self.columns {
            let parsed = rows
                .iter()
                .enumerate()
                .map(|(i, cells)| ColumnRow::from_cells(i, cells))
                .collect::<Result<Vec<_>>>()
                .map_err(|e| match e {
                    Error::InvalidRows(msg) => {
                        Error::InvalidRows(format!("columns of '{}': {}", table, msg))
                    }
                    other => other,
                })?;
            columns.insert(table, parsed);
        }
        Ok(SchemaSnapshot {
            tables: table_rows(self.tables)?,
            views: table_rows(self.views)?,
            columns,
        })
    }
}
