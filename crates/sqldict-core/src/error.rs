//! Core error types.

use thiserror::Error;

/// Dictionary errors.
#[derive(Debug, Error)]
pub enum Error {
    /// An operation would break a graph invariant; nothing was changed.
    #[error("structural error: {0}")]
    Structural(String),

    /// A handle does not designate a live object.
    #[error("not found: {0}")]
    NotFound(String),

    /// The XML document is not a valid dictionary.
    #[error("XML load error: {0}")]
    XmlLoad(String),

    /// An object could not be written to XML.
    #[error("XML save error: {0}")]
    XmlSave(String),

    /// Low-level XML parser error.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Introspection rows have the wrong shape.
    #[error("invalid introspection rows: {0}")]
    InvalidRows(String),

    /// Introspection rows are well-formed but unusable.
    #[error("introspection error: {0}")]
    Introspection(String),

    /// Operation on a constraint kind that has no implementation.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A sync pass was stopped before completion.
    #[error("update stopped")]
    SyncCancelled,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for dictionary operations.
pub type Result<T> = std::result::Result<T, Error>;
