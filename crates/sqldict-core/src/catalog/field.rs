//! Field definitions.

use super::ids::{FieldId, TableId};
use super::types::{DataType, DefaultValue, FieldAttributes};

/// A column of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    id: FieldId,
    table: Option<TableId>,
    name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Owner reported by the DBMS.
    pub owner: Option<String>,
    /// Data type, if known.
    pub data_type: Option<DataType>,
    /// Fixed length (e.g. `varchar(32)`).
    pub length: Option<i32>,
    /// Numeric scale.
    pub scale: Option<i32>,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Attribute flags.
    pub attributes: FieldAttributes,
    /// Name of the display plugin client tools should use.
    pub plugin: Option<String>,
}

impl Field {
    /// Create a standalone field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: FieldId::generate(),
            table: None,
            name: name.into(),
            description: None,
            owner: None,
            data_type: None,
            length: None,
            scale: None,
            default: None,
            attributes: FieldAttributes::NONE,
            plugin: None,
        }
    }

    /// Set the data type.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Set the length.
    pub fn with_length(mut self, length: i32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the scale.
    pub fn with_scale(mut self, scale: i32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
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

    /// Set the attribute flags.
    pub fn with_attributes(mut self, attributes: FieldAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set the display plugin.
    pub fn with_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }

    /// Handle of this field.
    pub fn id(&self) -> FieldId {
        self.id
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table this field belongs to, once attached.
    pub fn table(&self) -> Option<TableId> {
        self.table
    }

    pub(crate) fn attach(&mut self, table: TableId) {
        self.table = Some(table);
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    /// Check if the field has the auto-increment flag.
    pub fn is_auto_increment(&self) -> bool {
        self.attributes.contains(FieldAttributes::AUTO_INCREMENT)
    }

    /// Compare everything but identity and table.
    pub fn same_definition(&self, other: &Field) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.owner == other.owner
            && self.data_type == other.data_type
            && self.length == other.length
            && self.scale == other.scale
            && self.default == other.default
            && self.attributes == other.attributes
            && self.plugin == other.plugin
    }
}
