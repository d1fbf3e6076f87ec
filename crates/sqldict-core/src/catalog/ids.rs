//! Object handles.
//!
//! Every table, field and constraint gets a process-unique id when it is
//! created. Ids are never reused, so a handle to a destroyed object simply
//! stops resolving instead of silently pointing at a newer object.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter shared by all handle kinds.
static OBJECT_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_object_id() -> u64 {
    OBJECT_COUNTER.fetch_add(1, Ordering::Relaxed)
}

macro_rules! object_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub(crate) fn generate() -> Self {
                Self(next_object_id())
            }

            /// Raw numeric value of the handle.
            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

object_id!(
    /// Handle to a [`Table`](super::Table).
    TableId,
    "table"
);

object_id!(
    /// Handle to a [`Field`](super::Field).
    FieldId,
    "field"
);

object_id!(
    /// Handle to a [`Constraint`](super::Constraint).
    ConstraintId,
    "constraint"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = TableId::generate();
        let b = TableId::generate();
        let f = FieldId::generate();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(f.as_u64() > b.as_u64());
    }

    #[test]
    fn test_id_display() {
        let id = ConstraintId(42);
        assert_eq!(id.to_string(), "constraint#42");
    }
}
