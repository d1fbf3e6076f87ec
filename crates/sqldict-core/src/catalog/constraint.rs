//! Constraint definitions.
//!
//! A constraint is attached to one table and references fields of that
//! table. Foreign keys additionally reference fields of another table,
//! possibly through a deferred [`EntityRef`] that is bound on activation.

use super::entity_ref::{EntityRef, RefHandle, RefKind, Resolver};
use super::ids::{ConstraintId, FieldId, TableId};
use crate::error::{Error, Result};
use tracing::warn;

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// Primary key.
    PrimaryKey,
    /// Foreign key.
    ForeignKey,
    /// Unique.
    Unique,
    /// Not null.
    NotNull,
    /// Check against an expression.
    CheckExpr,
    /// Check against a list of values.
    CheckInList,
    /// Check against the values of another data set.
    CheckSetOf,
}

impl ConstraintKind {
    /// Code used in the `type` XML attribute.
    pub fn code(&self) -> &'static str {
        match self {
            ConstraintKind::PrimaryKey => "PKEY",
            ConstraintKind::ForeignKey => "FKEY",
            ConstraintKind::Unique => "UNIQ",
            ConstraintKind::NotNull => "NNUL",
            ConstraintKind::CheckExpr
            | ConstraintKind::CheckInList
            | ConstraintKind::CheckSetOf => "CHECK",
        }
    }

    /// Parse a type code. Only the first character is significant.
    pub fn parse(code: &str) -> Option<Self> {
        match code.chars().next()? {
            'P' => Some(ConstraintKind::PrimaryKey),
            'F' => Some(ConstraintKind::ForeignKey),
            'U' => Some(ConstraintKind::Unique),
            'N' => Some(ConstraintKind::NotNull),
            'C' => Some(ConstraintKind::CheckExpr),
            _ => None,
        }
    }

    /// Check if this is one of the CHECK kinds.
    pub fn is_check(&self) -> bool {
        matches!(
            self,
            ConstraintKind::CheckExpr | ConstraintKind::CheckInList | ConstraintKind::CheckSetOf
        )
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FkAction {
    /// Propagate the change.
    Cascade,
    /// Set referencing fields to NULL.
    SetNull,
    /// Set referencing fields to their default.
    SetDefault,
    /// Set referencing fields to a given value.
    SetValue,
    /// Reject the change.
    #[default]
    NoAction,
}

impl FkAction {
    /// Code used in the `on_update`/`on_delete` XML attributes.
    pub fn code(&self) -> &'static str {
        match self {
            FkAction::Cascade => "CAS",
            FkAction::SetNull => "NULL",
            FkAction::SetDefault => "DEF",
            FkAction::SetValue => "VAL",
            FkAction::NoAction => "RESTRICT",
        }
    }

    /// Parse an action code by its first character. Unknown codes mean no action.
    pub fn parse(code: &str) -> Self {
        match code.chars().next() {
            Some('C') => FkAction::Cascade,
            Some('N') => FkAction::SetNull,
            Some('D') => FkAction::SetDefault,
            Some('V') => FkAction::SetValue,
            _ => FkAction::NoAction,
        }
    }
}

/// Remote side of a foreign key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteField {
    /// Bound field.
    Field(FieldId),
    /// Not yet bound.
    Ref(EntityRef),
}

impl RemoteField {
    /// Bound field, if any.
    pub fn field(&self) -> Option<FieldId> {
        match self {
            RemoteField::Field(id) => Some(*id),
            RemoteField::Ref(r) => r.resolved_field(),
        }
    }
}

/// One `local -> remote` column mapping of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkPair {
    /// Field of the constraint's table.
    pub local: FieldId,
    /// Referenced field.
    pub remote: RemoteField,
}

impl FkPair {
    /// Pair with a bound remote field.
    pub fn new(local: FieldId, remote: FieldId) -> Self {
        Self {
            local,
            remote: RemoteField::Field(remote),
        }
    }

    /// Pair whose remote side is bound later.
    pub fn deferred(local: FieldId, remote: EntityRef) -> Self {
        Self {
            local,
            remote: RemoteField::Ref(remote),
        }
    }
}

/// Kind-specific constraint data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintData {
    /// Primary key over an ordered field set.
    PrimaryKey { fields: Vec<FieldId> },
    /// Uniqueness over an ordered field set.
    Unique { fields: Vec<FieldId> },
    /// Single field that may not be NULL.
    NotNull { field: FieldId },
    /// Foreign key.
    ForeignKey {
        pairs: Vec<FkPair>,
        ref_table: Option<TableId>,
        on_update: FkAction,
        on_delete: FkAction,
    },
    /// CHECK with an SQL expression.
    CheckExpr { expression: String },
    /// CHECK against a list of values.
    CheckInList { values: Vec<String> },
    /// CHECK against another data set.
    CheckSetOf { source: String },
}

impl ConstraintData {
    /// Kind of this data.
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintData::PrimaryKey { .. } => ConstraintKind::PrimaryKey,
            ConstraintData::Unique { .. } => ConstraintKind::Unique,
            ConstraintData::NotNull { .. } => ConstraintKind::NotNull,
            ConstraintData::ForeignKey { .. } => ConstraintKind::ForeignKey,
            ConstraintData::CheckExpr { .. } => ConstraintKind::CheckExpr,
            ConstraintData::CheckInList { .. } => ConstraintKind::CheckInList,
            ConstraintData::CheckSetOf { .. } => ConstraintKind::CheckSetOf,
        }
    }
}

/// A typed rule attached to a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    id: ConstraintId,
    table: TableId,
    /// Constraint name.
    pub name: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Owner reported by the DBMS.
    pub owner: Option<String>,
    /// Added by a user rather than discovered by introspection.
    pub user_defined: bool,
    data: ConstraintData,
}

impl Constraint {
    fn with_data(table: TableId, data: ConstraintData) -> Self {
        Self {
            id: ConstraintId::generate(),
            table,
            name: None,
            description: None,
            owner: None,
            user_defined: false,
            data,
        }
    }

    /// Empty primary key.
    pub fn primary_key(table: TableId) -> Self {
        Self::with_data(table, ConstraintData::PrimaryKey { fields: Vec::new() })
    }

    /// Empty unique constraint.
    pub fn unique(table: TableId) -> Self {
        Self::with_data(table, ConstraintData::Unique { fields: Vec::new() })
    }

    /// Not-null constraint on one field.
    pub fn not_null(table: TableId, field: FieldId) -> Self {
        Self::with_data(table, ConstraintData::NotNull { field })
    }

    /// Empty foreign key.
    pub fn foreign_key(table: TableId) -> Self {
        Self::with_data(
            table,
            ConstraintData::ForeignKey {
                pairs: Vec::new(),
                ref_table: None,
                on_update: FkAction::NoAction,
                on_delete: FkAction::NoAction,
            },
        )
    }

    /// CHECK constraint with an expression.
    pub fn check_expr(table: TableId, expression: impl Into<String>) -> Self {
        Self::with_data(
            table,
            ConstraintData::CheckExpr {
                expression: expression.into(),
            },
        )
    }

    /// CHECK constraint against a list of values.
    pub fn check_in_list(table: TableId, values: Vec<String>) -> Self {
        Self::with_data(table, ConstraintData::CheckInList { values })
    }

    /// CHECK constraint against another data set.
    pub fn check_set_of(table: TableId, source: impl Into<String>) -> Self {
        Self::with_data(
            table,
            ConstraintData::CheckSetOf {
                source: source.into(),
            },
        )
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
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

    /// Set the user-defined flag.
    pub fn with_user_defined(mut self, user_defined: bool) -> Self {
        self.user_defined = user_defined;
        self
    }

    /// Set the field list without validation. Checked when the constraint
    /// is added to a database.
    pub fn with_fields(mut self, new_fields: Vec<FieldId>) -> Self {
        match &mut self.data {
            ConstraintData::PrimaryKey { fields } | ConstraintData::Unique { fields } => {
                *fields = new_fields;
            }
            ConstraintData::NotNull { field } => {
                if let Some(first) = new_fields.first() {
                    *field = *first;
                }
            }
            _ => {}
        }
        self
    }

    /// Set the foreign key pairs without validation. Checked when the
    /// constraint is added to a database.
    pub fn with_pairs(mut self, new_pairs: Vec<FkPair>) -> Self {
        if let ConstraintData::ForeignKey { pairs, .. } = &mut self.data {
            *pairs = new_pairs;
        }
        self
    }

    /// Set the referential actions of a foreign key.
    pub fn with_actions(mut self, update: FkAction, delete: FkAction) -> Self {
        self.set_actions(update, delete);
        self
    }

    /// Handle of this constraint.
    pub fn id(&self) -> ConstraintId {
        self.id
    }

    /// Table the constraint is attached to.
    pub fn table(&self) -> TableId {
        self.table
    }

    /// Kind of constraint.
    pub fn kind(&self) -> ConstraintKind {
        self.data.kind()
    }

    /// Kind-specific data.
    pub fn data(&self) -> &ConstraintData {
        &self.data
    }

    /// Fields of the constraint's own table, in order.
    pub fn fields(&self) -> Vec<FieldId> {
        match &self.data {
            ConstraintData::PrimaryKey { fields } | ConstraintData::Unique { fields } => {
                fields.clone()
            }
            ConstraintData::NotNull { field } => vec![*field],
            ConstraintData::ForeignKey { pairs, .. } => pairs.iter().map(|p| p.local).collect(),
            _ => Vec::new(),
        }
    }

    /// Foreign key pairs; empty for other kinds.
    pub fn pairs(&self) -> &[FkPair] {
        match &self.data {
            ConstraintData::ForeignKey { pairs, .. } => pairs,
            _ => &[],
        }
    }

    /// Referenced table of an active foreign key.
    pub fn ref_table(&self) -> Option<TableId> {
        match &self.data {
            ConstraintData::ForeignKey { ref_table, .. } => *ref_table,
            _ => None,
        }
    }

    /// Referential actions `(on_update, on_delete)` of a foreign key.
    pub fn actions(&self) -> Option<(FkAction, FkAction)> {
        match &self.data {
            ConstraintData::ForeignKey {
                on_update,
                on_delete,
                ..
            } => Some((*on_update, *on_delete)),
            _ => None,
        }
    }

    /// Set the referential actions. Ignored for other kinds.
    pub fn set_actions(&mut self, update: FkAction, delete: FkAction) {
        if let ConstraintData::ForeignKey {
            on_update,
            on_delete,
            ..
        } = &mut self.data
        {
            *on_update = update;
            *on_delete = delete;
        }
    }

    /// Check if all references are bound.
    ///
    /// Only foreign keys can be inactive: every remote field must be bound
    /// and the referenced table known.
    pub fn is_active(&self) -> bool {
        match &self.data {
            ConstraintData::ForeignKey {
                pairs, ref_table, ..
            } => ref_table.is_some() && pairs.iter().all(|p| p.remote.field().is_some()),
            _ => true,
        }
    }

    /// Bind deferred references and derive the referenced table.
    ///
    /// Returns `Ok(false)` while some reference cannot be bound yet, and an
    /// error when the bound remote fields span several tables.
    pub fn activate<R: Resolver + ?Sized>(&mut self, resolver: &R) -> Result<bool> {
        if self.is_active() {
            return Ok(true);
        }
        let ConstraintData::ForeignKey {
            pairs, ref_table, ..
        } = &mut self.data
        else {
            return Ok(true);
        };

        let mut all_bound = !pairs.is_empty();
        for pair in pairs.iter_mut() {
            if let RemoteField::Ref(r) = &mut pair.remote {
                if r.resolve(resolver) {
                    if let Some(field) = r.resolved_field() {
                        pair.remote = RemoteField::Field(field);
                        continue;
                    }
                }
                all_bound = false;
            }
        }

        let common = common_remote_table(pairs, resolver)?;
        if !all_bound {
            return Ok(false);
        }
        match common {
            Some(table) => {
                *ref_table = Some(table);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace the field set of a primary key, unique or not-null constraint.
    ///
    /// Every field must belong to the constraint's table; otherwise the
    /// constraint is left unchanged.
    pub fn set_fields<R: Resolver + ?Sized>(
        &mut self,
        resolver: &R,
        new_fields: Vec<FieldId>,
    ) -> Result<()> {
        if self.kind().is_check() {
            return Err(Error::Unsupported(format!(
                "field list of {} constraint",
                self.kind().code()
            )));
        }
        if self.kind() == ConstraintKind::ForeignKey {
            return Err(Error::Structural(
                "foreign key fields are set as pairs".to_string(),
            ));
        }
        self.check_local_fields(resolver, &new_fields)?;

        match &mut self.data {
            ConstraintData::PrimaryKey { fields } | ConstraintData::Unique { fields } => {
                *fields = new_fields;
            }
            ConstraintData::NotNull { field } => match new_fields.as_slice() {
                [single] => *field = *single,
                _ => {
                    return Err(Error::Structural(format!(
                        "not-null constraint takes exactly one field, got {}",
                        new_fields.len()
                    )))
                }
            },
            _ => {}
        }
        Ok(())
    }

    /// Replace the pairs of a foreign key, then try to activate it.
    ///
    /// Local fields must belong to the constraint's table and every remote
    /// field that can be bound must belong to one common table.
    pub fn set_fk_pairs<R: Resolver + ?Sized>(
        &mut self,
        resolver: &R,
        new_pairs: Vec<FkPair>,
    ) -> Result<bool> {
        if self.kind() != ConstraintKind::ForeignKey {
            return Err(Error::Structural(format!(
                "{} constraint has no foreign key pairs",
                self.kind().code()
            )));
        }
        let locals: Vec<FieldId> = new_pairs.iter().map(|p| p.local).collect();
        self.check_local_fields(resolver, &locals)?;

        let mut remote_table = None;
        for pair in &new_pairs {
            let field = match &pair.remote {
                RemoteField::Field(id) => Some(*id),
                RemoteField::Ref(r) => r.resolved_field().or_else(|| {
                    match resolver.lookup(r.kind(), r.by(), r.target()) {
                        Some(RefHandle::Field(id)) => Some(id),
                        _ => None,
                    }
                }),
            };
            let Some(table) = field.and_then(|f| resolver.field_table(f)) else {
                continue;
            };
            match remote_table {
                None => remote_table = Some(table),
                Some(t) if t != table => {
                    warn!(constraint = %self.id, "referenced table is not the same for all pairs");
                    return Err(Error::Structural(
                        "referenced table is not the same for all pairs".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }

        if let ConstraintData::ForeignKey {
            pairs, ref_table, ..
        } = &mut self.data
        {
            *pairs = new_pairs;
            *ref_table = None;
        }
        self.activate(resolver)
    }

    /// Check that the constraint's fields are consistent with its table.
    pub fn validate<R: Resolver + ?Sized>(&self, resolver: &R) -> Result<()> {
        self.check_local_fields(resolver, &self.fields())?;
        if let ConstraintData::ForeignKey { pairs, .. } = &self.data {
            if pairs.is_empty() {
                return Err(Error::Structural(format!(
                    "foreign key {} has no field pairs",
                    self.id
                )));
            }
            common_remote_table(pairs, resolver)?;
        }
        match &self.data {
            ConstraintData::PrimaryKey { fields } | ConstraintData::Unique { fields }
                if fields.is_empty() =>
            {
                Err(Error::Structural(format!(
                    "{} constraint {} has no fields",
                    self.kind().code(),
                    self.id
                )))
            }
            _ => Ok(()),
        }
    }

    fn check_local_fields<R: Resolver + ?Sized>(
        &self,
        resolver: &R,
        fields: &[FieldId],
    ) -> Result<()> {
        for field in fields {
            if resolver.field_table(*field) != Some(self.table) {
                warn!(
                    constraint = %self.id,
                    field = %field,
                    table = %self.table,
                    "field does not belong to the constraint's table"
                );
                return Err(Error::Structural(format!(
                    "{} does not belong to {}",
                    field, self.table
                )));
            }
        }
        Ok(())
    }

    /// Check if a field of the constraint's table is part of it.
    pub fn uses_field(&self, field: FieldId) -> bool {
        self.fields().contains(&field)
    }

    /// Check if a foreign key points at `field`.
    pub fn references_field(&self, field: FieldId) -> bool {
        self.pairs().iter().any(|p| p.remote.field() == Some(field))
    }

    /// Check if a foreign key points into `table`.
    pub fn references_table(&self, table: TableId) -> bool {
        self.ref_table() == Some(table)
    }

    /// Compare kind, table and field identities.
    ///
    /// Name, description, owner and the user-defined flag are ignored. A
    /// bound remote field never equals an unbound reference. CHECK kinds
    /// cannot be compared.
    pub fn equivalent(&self, other: &Constraint) -> Result<bool> {
        if self.kind().is_check() || other.kind().is_check() {
            return Err(Error::Unsupported(
                "equality of CHECK constraints".to_string(),
            ));
        }
        if self.kind() != other.kind() || self.table != other.table {
            return Ok(false);
        }
        let equal = match (&self.data, &other.data) {
            (
                ConstraintData::PrimaryKey { fields: a },
                ConstraintData::PrimaryKey { fields: b },
            )
            | (ConstraintData::Unique { fields: a }, ConstraintData::Unique { fields: b }) => {
                a == b
            }
            (ConstraintData::NotNull { field: a }, ConstraintData::NotNull { field: b }) => a == b,
            (
                ConstraintData::ForeignKey { pairs: a, .. },
                ConstraintData::ForeignKey { pairs: b, .. },
            ) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(pa, pb)| {
                        pa.local == pb.local
                            && match (pa.remote.field(), pb.remote.field()) {
                                (Some(fa), Some(fb)) => fa == fb,
                                (None, None) => match (&pa.remote, &pb.remote) {
                                    (RemoteField::Ref(ra), RemoteField::Ref(rb)) => {
                                        ra.same_target(rb)
                                    }
                                    _ => false,
                                },
                                _ => false,
                            }
                    })
            }
            _ => false,
        };
        Ok(equal)
    }

    /// Adopt the name, description and owner `other` carries. Values
    /// `other` leaves unset are kept. Returns `true` if anything changed.
    pub(crate) fn adopt_metadata(&mut self, other: &Constraint) -> bool {
        let mut changed = false;
        for (mine, theirs) in [
            (&mut self.name, &other.name),
            (&mut self.description, &other.description),
            (&mut self.owner, &other.owner),
        ] {
            if theirs.is_some() && *mine != *theirs {
                mine.clone_from(theirs);
                changed = true;
            }
        }
        changed
    }

    /// Remote references that are not bound yet.
    pub fn deferred_refs(&self) -> Vec<&EntityRef> {
        self.pairs()
            .iter()
            .filter_map(|p| match &p.remote {
                RemoteField::Ref(r) if !r.is_resolved() => Some(r),
                _ => None,
            })
            .collect()
    }
}

/// Table shared by all bound remote fields, or an error if they differ.
fn common_remote_table<R: Resolver + ?Sized>(
    pairs: &[FkPair],
    resolver: &R,
) -> Result<Option<TableId>> {
    let mut common = None;
    for pair in pairs {
        let Some(table) = pair.remote.field().and_then(|f| resolver.field_table(f)) else {
            continue;
        };
        match common {
            None => common = Some(table),
            Some(t) if t != table => {
                return Err(Error::Structural(
                    "referenced table is not the same for all pairs".to_string(),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(common)
}

/// Build a by-name reference to `table.field`.
pub fn field_ref(table: &str, field: &str) -> EntityRef {
    EntityRef::by_name(RefKind::Field, format!("{}.{}", table, field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::entity_ref::RefBy;
    use crate::catalog::{Field, Table};

    /// Two tables acting as a resolver.
    struct Pair {
        a: Table,
        b: Table,
    }

    impl Resolver for Pair {
        fn lookup(&self, kind: RefKind, by: RefBy, target: &str) -> Option<RefHandle> {
            self.a
                .lookup(kind, by, target)
                .or_else(|| self.b.lookup(kind, by, target))
        }

        fn field_table(&self, field: FieldId) -> Option<TableId> {
            self.a
                .field_table(field)
                .or_else(|| self.b.field_table(field))
        }
    }

    fn setup() -> (Pair, FieldId, FieldId, FieldId) {
        let mut a = Table::new("a");
        let a_id = a.add_field(Field::new("id")).unwrap();
        let b_id_ref = a.add_field(Field::new("b_id")).unwrap();
        let mut b = Table::new("b");
        let b_id = b.add_field(Field::new("id")).unwrap();
        (Pair { a, b }, a_id, b_id_ref, b_id)
    }

    #[test]
    fn test_kind_and_action_codes() {
        assert_eq!(ConstraintKind::parse("PKEY"), Some(ConstraintKind::PrimaryKey));
        assert_eq!(ConstraintKind::parse("Uniq"), Some(ConstraintKind::Unique));
        assert_eq!(ConstraintKind::parse("CHECK"), Some(ConstraintKind::CheckExpr));
        assert_eq!(ConstraintKind::parse("XYZ"), None);
        assert_eq!(ConstraintKind::CheckInList.code(), "CHECK");

        assert_eq!(FkAction::parse("CAS"), FkAction::Cascade);
        assert_eq!(FkAction::parse("NULL"), FkAction::SetNull);
        assert_eq!(FkAction::parse("RESTRICT"), FkAction::NoAction);
        assert_eq!(FkAction::parse(""), FkAction::NoAction);
        assert_eq!(FkAction::NoAction.code(), "RESTRICT");
    }

    #[test]
    fn test_set_fields_rejects_foreign_table_field() {
        let (pair, a_id, _, b_id) = setup();
        let mut pk = Constraint::primary_key(pair.a.id());
        pk.set_fields(&pair, vec![a_id]).unwrap();

        let err = pk.set_fields(&pair, vec![a_id, b_id]);
        assert!(matches!(err, Err(Error::Structural(_))));
        // State unchanged.
        assert_eq!(pk.fields(), vec![a_id]);
    }

    #[test]
    fn test_not_null_takes_one_field() {
        let (pair, a_id, b_id_ref, _) = setup();
        let mut nn = Constraint::not_null(pair.a.id(), a_id);
        assert!(nn.set_fields(&pair, vec![a_id, b_id_ref]).is_err());
        nn.set_fields(&pair, vec![b_id_ref]).unwrap();
        assert_eq!(nn.fields(), vec![b_id_ref]);
    }

    #[test]
    fn test_fk_activation_with_deferred_ref() {
        let (pair, _, b_id_ref, b_id) = setup();
        let mut fk = Constraint::foreign_key(pair.a.id());

        // Only table `a` is visible: reference stays unbound.
        let active = fk
            .set_fk_pairs(&pair.a, vec![FkPair::deferred(b_id_ref, field_ref("b", "id"))])
            .unwrap();
        assert!(!active);
        assert!(!fk.is_active());
        assert_eq!(fk.deferred_refs().len(), 1);

        // is_active never resolves.
        assert!(!fk.is_active());

        assert!(fk.activate(&pair).unwrap());
        assert!(fk.is_active());
        assert_eq!(fk.ref_table(), Some(pair.b.id()));
        assert!(fk.references_field(b_id));
        assert!(fk.references_table(pair.b.id()));

        // Idempotent.
        assert!(fk.activate(&pair).unwrap());
    }

    #[test]
    fn test_fk_pairs_must_share_remote_table() {
        let (pair, a_id, b_id_ref, b_id) = setup();
        let mut fk = Constraint::foreign_key(pair.a.id());
        let err = fk.set_fk_pairs(
            &pair,
            vec![FkPair::new(a_id, b_id), FkPair::new(b_id_ref, a_id)],
        );
        assert!(matches!(err, Err(Error::Structural(_))));
        assert!(fk.pairs().is_empty());
    }

    #[test]
    fn test_equivalence_ignores_names() {
        let (pair, a_id, b_id_ref, b_id) = setup();
        let fk1 = Constraint::foreign_key(pair.a.id())
            .with_name("fk_one")
            .with_pairs(vec![FkPair::new(b_id_ref, b_id)]);
        let fk2 = Constraint::foreign_key(pair.a.id())
            .with_name("fk_two")
            .with_user_defined(true)
            .with_pairs(vec![FkPair::new(b_id_ref, b_id)]);
        assert!(fk1.equivalent(&fk2).unwrap());

        let deferred = Constraint::foreign_key(pair.a.id())
            .with_pairs(vec![FkPair::deferred(b_id_ref, field_ref("b", "id"))]);
        assert!(!fk1.equivalent(&deferred).unwrap());

        let pk1 = Constraint::primary_key(pair.a.id()).with_fields(vec![a_id]);
        let pk2 = Constraint::primary_key(pair.a.id()).with_fields(vec![a_id, b_id_ref]);
        assert!(!pk1.equivalent(&pk2).unwrap());
        assert!(!pk1.equivalent(&fk1).unwrap());
    }

    #[test]
    fn test_check_constraints_are_unsupported() {
        let (pair, a_id, _, _) = setup();
        let check = Constraint::check_expr(pair.a.id(), "id > 0");
        let other = Constraint::check_expr(pair.a.id(), "id > 0");
        assert!(matches!(check.equivalent(&other), Err(Error::Unsupported(_))));

        let mut check = check;
        assert!(matches!(
            check.set_fields(&pair, vec![a_id]),
            Err(Error::Unsupported(_))
        ));
        assert!(check.is_active());
    }

    #[test]
    fn test_validate() {
        let (pair, _, b_id_ref, b_id) = setup();
        let empty_pk = Constraint::primary_key(pair.a.id());
        assert!(empty_pk.validate(&pair).is_err());

        let wrong_table = Constraint::unique(pair.a.id()).with_fields(vec![b_id]);
        assert!(wrong_table.validate(&pair).is_err());

        let fk = Constraint::foreign_key(pair.a.id()).with_pairs(vec![FkPair::new(b_id_ref, b_id)]);
        assert!(fk.validate(&pair).is_ok());
    }
}
