//! Deferred references.
//!
//! An [`EntityRef`] names a table or field that may not exist yet. It is
//! bound to a concrete handle by [`EntityRef::resolve`] once the target is
//! known to a [`Resolver`]. A bound reference never outlives its target:
//! destroying a table or field destroys every constraint holding a handle
//! to it.

use super::ids::{FieldId, TableId};
use std::fmt;

/// Kind of object a reference designates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// A table or view.
    Table,
    /// A field, named `table.field` when referenced by name.
    Field,
}

/// How the target string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefBy {
    /// Object name.
    Name,
    /// Document-local XML id.
    XmlId,
}

/// Concrete handle a reference resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefHandle {
    /// A table.
    Table(TableId),
    /// A field.
    Field(FieldId),
}

/// Resolution state of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Target never found.
    Unresolved,
    /// Bound to a live object.
    Resolved(RefHandle),
}

/// Source of objects references can bind to.
pub trait Resolver {
    /// Find the object designated by `target`.
    fn lookup(&self, kind: RefKind, by: RefBy, target: &str) -> Option<RefHandle>;

    /// Table owning a field, if the field is known.
    fn field_table(&self, field: FieldId) -> Option<TableId>;
}

/// A by-name or by-id reference to a table or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    kind: RefKind,
    by: RefBy,
    target: String,
    state: RefState,
}

impl EntityRef {
    /// Reference an object by name.
    pub fn by_name(kind: RefKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            by: RefBy::Name,
            target: name.into(),
            state: RefState::Unresolved,
        }
    }

    /// Reference an object by XML id.
    pub fn by_xml_id(kind: RefKind, xml_id: impl Into<String>) -> Self {
        Self {
            kind,
            by: RefBy::XmlId,
            target: xml_id.into(),
            state: RefState::Unresolved,
        }
    }

    /// Kind of the referenced object.
    pub fn kind(&self) -> RefKind {
        self.kind
    }

    /// How the target is interpreted.
    pub fn by(&self) -> RefBy {
        self.by
    }

    /// Name or id of the target.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current state.
    pub fn state(&self) -> RefState {
        self.state
    }

    /// Check if bound to a live object.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, RefState::Resolved(_))
    }

    /// Bound handle, if any.
    pub fn handle(&self) -> Option<RefHandle> {
        match self.state {
            RefState::Resolved(handle) => Some(handle),
            _ => None,
        }
    }

    /// Bound field, if this is a resolved field reference.
    pub fn resolved_field(&self) -> Option<FieldId> {
        match self.state {
            RefState::Resolved(RefHandle::Field(id)) => Some(id),
            _ => None,
        }
    }

    /// Try to bind the reference. Returns `true` once bound.
    ///
    /// Calling this on a bound reference is a no-op.
    pub fn resolve<R: Resolver + ?Sized>(&mut self, resolver: &R) -> bool {
        if self.is_resolved() {
            return true;
        }
        match resolver.lookup(self.kind, self.by, &self.target) {
            Some(handle) => {
                self.state = RefState::Resolved(handle);
                true
            }
            None => false,
        }
    }

    /// Same kind, lookup method and target.
    pub fn same_target(&self, other: &EntityRef) -> bool {
        self.kind == other.kind && self.by == other.by && self.target == other.target
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let by = match self.by {
            RefBy::Name => "name",
            RefBy::XmlId => "id",
        };
        write!(f, "{:?}({}={})", self.kind, by, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OneTable {
        id: TableId,
        name: &'static str,
    }

    impl Resolver for OneTable {
        fn lookup(&self, kind: RefKind, by: RefBy, target: &str) -> Option<RefHandle> {
            (kind == RefKind::Table && by == RefBy::Name && target == self.name)
                .then_some(RefHandle::Table(self.id))
        }

        fn field_table(&self, _field: FieldId) -> Option<TableId> {
            None
        }
    }

    #[test]
    fn test_unresolved_until_target_exists() {
        let mut r = EntityRef::by_name(RefKind::Table, "orders");
        let other = OneTable {
            id: TableId::generate(),
            name: "users",
        };
        assert!(!r.resolve(&other));
        assert_eq!(r.state(), RefState::Unresolved);

        let orders = OneTable {
            id: TableId::generate(),
            name: "orders",
        };
        assert!(r.resolve(&orders));
        assert_eq!(r.handle(), Some(RefHandle::Table(orders.id)));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let t = OneTable {
            id: TableId::generate(),
            name: "orders",
        };
        let mut r = EntityRef::by_name(RefKind::Table, "orders");
        assert!(r.resolve(&t));

        // Bound references are not looked up again.
        let gone = OneTable {
            id: TableId::generate(),
            name: "nothing",
        };
        assert!(r.resolve(&gone));
        assert_eq!(r.handle(), Some(RefHandle::Table(t.id)));
    }
}
