//! XML persistence of the dictionary.
//!
//! The document layout is:
//!
//! ```text
//! gda_dict_database
//!   gda_dict_tables
//!     gda_dict_table id name descr owner is_view
//!       gda_dict_parent_table table order
//!       gda_dict_field id name descr owner type length scale default
//!                      default_g_type extra_attr plugin
//!   gda_dict_constraints
//!     gda_dict_constraint name user_defined type table on_update on_delete
//!       gda_dict_constraint_field field
//!       gda_dict_constraint_pair field ref
//! ```
//!
//! Cross references use the document-local ids built by [`ids`].

pub mod ids;
mod reader;
mod writer;

pub use reader::load_from_xml;
pub use writer::save_to_xml;

pub(crate) const DATABASE_TAG: &str = "gda_dict_database";
pub(crate) const TABLES_TAG: &str = "gda_dict_tables";
pub(crate) const TABLE_TAG: &str = "gda_dict_table";
pub(crate) const PARENT_TABLE_TAG: &str = "gda_dict_parent_table";
pub(crate) const FIELD_TAG: &str = "gda_dict_field";
pub(crate) const CONSTRAINTS_TAG: &str = "gda_dict_constraints";
pub(crate) const CONSTRAINT_TAG: &str = "gda_dict_constraint";
pub(crate) const CONSTRAINT_FIELD_TAG: &str = "gda_dict_constraint_field";
pub(crate) const CONSTRAINT_PAIR_TAG: &str = "gda_dict_constraint_pair";
