//! Data types, default values and field attributes.

use crate::xml::ids;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Category of values a data type holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// No value.
    Null,
    /// True/false.
    Boolean,
    /// 16-bit integer.
    SmallInt,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Arbitrary precision decimal.
    Numeric,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Character data.
    String,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    Timestamp,
    /// Short binary data.
    Binary,
    /// Large binary object.
    Blob,
}

impl ValueType {
    /// Name used in the `default_g_type` XML attribute.
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Boolean => "boolean",
            ValueType::SmallInt => "smallint",
            ValueType::Integer => "integer",
            ValueType::BigInt => "bigint",
            ValueType::Numeric => "numeric",
            ValueType::Float => "float",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::Timestamp => "timestamp",
            ValueType::Binary => "binary",
            ValueType::Blob => "blob",
        }
    }

    /// Parse a value type name.
    pub fn from_name(name: &str) -> Option<Self> {
        let vt = match name {
            "null" => ValueType::Null,
            "boolean" => ValueType::Boolean,
            "smallint" => ValueType::SmallInt,
            "integer" => ValueType::Integer,
            "bigint" => ValueType::BigInt,
            "numeric" => ValueType::Numeric,
            "float" => ValueType::Float,
            "double" => ValueType::Double,
            "string" => ValueType::String,
            "date" => ValueType::Date,
            "time" => ValueType::Time,
            "timestamp" => ValueType::Timestamp,
            "binary" => ValueType::Binary,
            "blob" => ValueType::Blob,
            _ => return None,
        };
        Some(vt)
    }
}

/// A named SQL data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    /// Name as reported by the DBMS (e.g. `varchar`).
    pub sql_name: String,
    /// Value category.
    pub value_type: ValueType,
    /// Free-form description.
    pub description: Option<String>,
    /// Declared on the fly for a name the registry did not know.
    pub custom: bool,
}

impl DataType {
    /// Create a data type.
    pub fn new(sql_name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            sql_name: sql_name.into(),
            value_type,
            description: None,
            custom: false,
        }
    }

    /// Create a custom type for a name nobody declared.
    pub fn custom(sql_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            sql_name: sql_name.into(),
            value_type: ValueType::Blob,
            description: Some(description.into()),
            custom: true,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Document-local id (`DT<name>`).
    pub fn xml_id(&self) -> String {
        ids::data_type_xml_id(&self.sql_name)
    }
}

/// Known data types, keyed by SQL name.
#[derive(Debug, Clone, Default)]
pub struct DataTypeRegistry {
    types: IndexMap<String, DataType>,
}

impl DataTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with common SQL types.
    pub fn with_standard_types() -> Self {
        let mut registry = Self::new();
        let standard = [
            ("smallint", ValueType::SmallInt),
            ("int2", ValueType::SmallInt),
            ("integer", ValueType::Integer),
            ("int", ValueType::Integer),
            ("int4", ValueType::Integer),
            ("bigint", ValueType::BigInt),
            ("int8", ValueType::BigInt),
            ("numeric", ValueType::Numeric),
            ("decimal", ValueType::Numeric),
            ("real", ValueType::Float),
            ("float4", ValueType::Float),
            ("double precision", ValueType::Double),
            ("float8", ValueType::Double),
            ("boolean", ValueType::Boolean),
            ("bool", ValueType::Boolean),
            ("char", ValueType::String),
            ("character", ValueType::String),
            ("varchar", ValueType::String),
            ("character varying", ValueType::String),
            ("text", ValueType::String),
            ("date", ValueType::Date),
            ("time", ValueType::Time),
            ("timestamp", ValueType::Timestamp),
            ("timestamptz", ValueType::Timestamp),
            ("bytea", ValueType::Binary),
            ("varbinary", ValueType::Binary),
            ("blob", ValueType::Blob),
        ];
        for (name, vt) in standard {
            registry.register(DataType::new(name, vt));
        }
        registry
    }

    /// Register a type, replacing any type with the same name.
    pub fn register(&mut self, data_type: DataType) {
        self.types.insert(data_type.sql_name.clone(), data_type);
    }

    /// Look up a type by SQL name.
    pub fn get(&self, sql_name: &str) -> Option<&DataType> {
        self.types.get(sql_name)
    }

    /// Return the named type, declaring a custom one if it is unknown.
    pub fn get_or_declare(&mut self, sql_name: &str, table: &str, field: &str) -> DataType {
        if let Some(dt) = self.types.get(sql_name) {
            return dt.clone();
        }
        let dt = DataType::custom(
            sql_name,
            format!("Custom data type, declared for the {}.{} field", table, field),
        );
        debug!(data_type = %sql_name, table = %table, field = %field, "declared custom data type");
        self.register(dt.clone());
        dt
    }

    /// Iterate over registered types.
    pub fn iter(&self) -> impl Iterator<Item = &DataType> {
        self.types.values()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Default value of a field.
///
/// The value type may differ from the field's own type: a `timestamp`
/// column commonly defaults to the string `now()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultValue {
    /// Category the text is interpreted as.
    pub value_type: ValueType,
    /// Textual representation.
    pub text: String,
}

impl DefaultValue {
    /// Create a default value.
    pub fn new(value_type: ValueType, text: impl Into<String>) -> Self {
        Self {
            value_type,
            text: text.into(),
        }
    }

    /// Create a string default, as produced by introspection.
    pub fn string(text: impl Into<String>) -> Self {
        Self::new(ValueType::String, text)
    }
}

/// Bit flags on a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldAttributes(u32);

impl FieldAttributes {
    /// No flags.
    pub const NONE: FieldAttributes = FieldAttributes(0);
    /// Value generated by the DBMS on insert.
    pub const AUTO_INCREMENT: FieldAttributes = FieldAttributes(1);

    const AUTO_INCREMENT_TOKEN: &'static str = "AUTO_INCREMENT";

    /// Check if all flags of `other` are set.
    pub fn contains(self, other: FieldAttributes) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set or clear the flags of `other`.
    pub fn set(&mut self, other: FieldAttributes, enabled: bool) {
        if enabled {
            self.0 |= other.0;
        } else {
            self.0 &= !other.0;
        }
    }

    /// Check if no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse a comma-separated `extra_attr` string. Unknown tokens are ignored.
    pub fn parse(extra: &str) -> Self {
        let mut attrs = FieldAttributes::NONE;
        for token in extra.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case(Self::AUTO_INCREMENT_TOKEN) {
                attrs.set(FieldAttributes::AUTO_INCREMENT, true);
            } else {
                debug!(token = %token, "ignoring unknown field attribute");
            }
        }
        attrs
    }

    /// Render as an `extra_attr` string, or `None` when empty.
    pub fn to_extra_attr(self) -> Option<String> {
        let mut tokens = Vec::new();
        if self.contains(FieldAttributes::AUTO_INCREMENT) {
            tokens.push(Self::AUTO_INCREMENT_TOKEN);
        }
        if tokens.is_empty() {
            None
        } else {
            Some(tokens.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_names() {
        for vt in [
            ValueType::Boolean,
            ValueType::Integer,
            ValueType::String,
            ValueType::Timestamp,
            ValueType::Blob,
        ] {
            assert_eq!(ValueType::from_name(vt.name()), Some(vt));
        }
        assert_eq!(ValueType::from_name("gchararray"), None);
    }

    #[test]
    fn test_registry_standard_types() {
        let registry = DataTypeRegistry::with_standard_types();
        assert_eq!(
            registry.get("varchar").map(|dt| dt.value_type),
            Some(ValueType::String)
        );
        assert!(registry.get("geometry").is_none());
    }

    #[test]
    fn test_registry_declares_custom_type() {
        let mut registry = DataTypeRegistry::new();
        let dt = registry.get_or_declare("geometry", "places", "location");
        assert!(dt.custom);
        assert_eq!(dt.value_type, ValueType::Blob);
        assert_eq!(
            dt.description.as_deref(),
            Some("Custom data type, declared for the places.location field")
        );
        assert_eq!(registry.len(), 1);

        // Second lookup reuses the declared type.
        registry.get_or_declare("geometry", "other", "shape");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_field_attributes() {
        let attrs = FieldAttributes::parse("FOO, auto_increment");
        assert!(attrs.contains(FieldAttributes::AUTO_INCREMENT));
        assert_eq!(attrs.to_extra_attr().as_deref(), Some("AUTO_INCREMENT"));

        let empty = FieldAttributes::parse("");
        assert!(empty.is_empty());
        assert_eq!(empty.to_extra_attr(), None);
    }
}
