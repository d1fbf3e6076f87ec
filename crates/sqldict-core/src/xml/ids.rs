//! Document-local ids.
//!
//! Ids are a type prefix followed by the object name. ASCII letters, digits
//! and `_` are kept; every other byte becomes `-` followed by two hex
//! digits, so the result never contains the `:` used as a separator and two
//! distinct names never share an id.

/// Prefix of table ids.
pub const TABLE_PREFIX: &str = "TV";
/// Separator and prefix of the field part of a field id.
pub const FIELD_SEPARATOR: &str = ":FI";
/// Prefix of data type ids.
pub const DATA_TYPE_PREFIX: &str = "DT";

/// Encode a name for use inside an id.
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("-{:02x}", byte));
        }
    }
    out
}

/// Decode a name produced by [`encode`].
pub fn decode(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Id of a table.
pub fn table_xml_id(table: &str) -> String {
    format!("{}{}", TABLE_PREFIX, encode(table))
}

/// Id of a field of a table.
pub fn field_xml_id(table: &str, field: &str) -> String {
    format!("{}{}{}", table_xml_id(table), FIELD_SEPARATOR, encode(field))
}

/// Id of a data type.
pub fn data_type_xml_id(sql_name: &str) -> String {
    format!("{}{}", DATA_TYPE_PREFIX, encode(sql_name))
}

/// Split a field id into its table id and the decoded field name.
pub fn split_field_xml_id(xml_id: &str) -> Option<(&str, String)> {
    let (table, field) = xml_id.split_once(FIELD_SEPARATOR)?;
    Some((table, decode(field)?))
}

/// Decode the name part of a data type id.
pub fn data_type_name(xml_id: &str) -> Option<String> {
    decode(xml_id.strip_prefix(DATA_TYPE_PREFIX)?)
}
