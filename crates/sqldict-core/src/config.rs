//! Dictionary configuration.

/// Default indentation width for saved XML documents.
pub const DEFAULT_XML_INDENT: usize = 2;

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictConfig {
    /// Fall back to a lowercase comparison when an exact name lookup fails.
    pub case_insensitive_names: bool,

    /// Reconcile views as well as base tables during sync.
    pub sync_views: bool,

    /// Indentation width for saved XML. Zero writes a single line.
    pub xml_indent: usize,
}

impl Default for DictConfig {
    fn default() -> Self {
        Self {
            case_insensitive_names: false,
            sync_views: true,
            xml_indent: DEFAULT_XML_INDENT,
        }
    }
}

impl DictConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable lowercase fallback for name lookups.
    pub fn with_case_insensitive_names(mut self, enabled: bool) -> Self {
        self.case_insensitive_names = enabled;
        self
    }

    /// Set whether views are reconciled during sync.
    pub fn with_sync_views(mut self, enabled: bool) -> Self {
        self.sync_views = enabled;
        self
    }

    /// Set the XML indentation width.
    pub fn with_xml_indent(mut self, indent: usize) -> Self {
        self.xml_indent = indent;
        self
    }
}
