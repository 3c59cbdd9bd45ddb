//! Physical schema representation.
//!
//! A [`Table`] is what the differ compares: the *target* is derived from an
//! entity descriptor, the *source* is introspected from a live backend. Both
//! carry backend-native type names, so equality is plain value equality.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Longest identifier every supported backend accepts.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Fits a generated name into [`MAX_IDENTIFIER_LEN`] bytes.
///
/// Longer names keep a prefix and end in a hash of the full name, so two
/// long names sharing that prefix stay distinct.
#[must_use]
pub fn bounded_identifier(name: String) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name;
    }
    let digest = format!("{:x}", Sha256::digest(name.as_bytes()));
    let mut end = MAX_IDENTIFIER_LEN - 9;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{}", &name[..end], &digest[..8])
}

/// Foreign key reference carried by a column.
///
/// Every reference is emitted with `ON DELETE CASCADE`.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Constraint name as found in the backend, if introspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
}

impl ForeignKey {
    /// Creates a reference to `table.column`.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            constraint: None,
        }
    }

    /// Constraint name for a reference held by `table.column`: the
    /// introspected one, else the conventional one bounded to
    /// [`MAX_IDENTIFIER_LEN`].
    #[must_use]
    pub fn constraint_name(&self, table: &str, column: &str) -> String {
        self.constraint.clone().unwrap_or_else(|| {
            bounded_identifier(format!(
                "fk_{table}_{column}_{}_{}",
                self.table, self.column
            ))
        })
    }
}

// The constraint name is bookkeeping; two references to the same column are
// the same reference.
impl PartialEq for ForeignKey {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.column == other.column
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Column name.
    pub name: String,
    /// Backend-native type name.
    pub column_type: String,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Default clause. `None` emits no clause, `Some("NULL")` an explicit NULL.
    pub default: Option<String>,
    /// Column comment.
    #[serde(default)]
    pub comment: String,
    /// Whether this column is the primary key.
    pub primary_key: bool,
    /// Whether this column auto-increments.
    pub auto_increment: bool,
    /// Foreign key reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKey>,
}

impl TableColumn {
    /// Creates a NOT NULL column without default.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
            nullable: false,
            default: None,
            comment: String::new(),
            primary_key: false,
            auto_increment: false,
            foreign_key: None,
        }
    }

    /// Sets the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Sets the raw default expression.
    #[must_use]
    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Adds a foreign key reference.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey::new(table, column));
        self
    }
}

/// Index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableIndex {
    /// Index name.
    pub name: String,
    /// Covered columns, in declaration order.
    pub columns: Vec<String>,
    /// Whether this is a unique index.
    #[serde(default)]
    pub unique: bool,
}

impl TableIndex {
    /// Creates a non-unique index.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Marks the index as unique.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Index equality with column order normalized.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        let mut mine = self.columns.clone();
        let mut theirs = other.columns.clone();
        mine.sort();
        theirs.sort();
        self.unique == other.unique && mine == theirs
    }
}

/// Complete definition of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Table comment.
    #[serde(default)]
    pub comment: String,
    /// Columns, in declaration order.
    pub columns: Vec<TableColumn>,
    /// Secondary indexes. The primary-key index is never listed.
    #[serde(default)]
    pub indexes: Vec<TableIndex>,
}

impl Table {
    /// Creates an empty table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Adds a column, replacing one with the same name.
    #[must_use]
    pub fn column(mut self, column: TableColumn) -> Self {
        self.push_column(column);
        self
    }

    /// Adds an index, replacing one with the same name.
    #[must_use]
    pub fn index(mut self, index: TableIndex) -> Self {
        self.push_index(index);
        self
    }

    /// Adds a column in place; last writer wins on duplicate names.
    pub fn push_column(&mut self, column: TableColumn) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
    }

    /// Adds an index in place; last writer wins on duplicate names.
    pub fn push_index(&mut self, index: TableIndex) {
        match self.indexes.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => *existing = index,
            None => self.indexes.push(index),
        }
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets the primary-key column.
    #[must_use]
    pub fn primary_key(&self) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_constraint_names_are_bounded() {
        let fk = ForeignKey::new("organization_membership", "organization_id");
        assert_eq!(
            fk.constraint_name("user", "company_id"),
            "fk_user_company_id_organization_membership_organization_id"
        );

        let scratch = fk.constraint_name("_keel_rebuild_user_account", "organization_id");
        let live = ForeignKey::new("organization_membership", "organization_key")
            .constraint_name("_keel_rebuild_user_account", "organization_id");
        assert_eq!(scratch.len(), MAX_IDENTIFIER_LEN);
        assert!(scratch.starts_with("fk__keel_rebuild_user_account_organization_id_organiza"));
        assert_eq!(live[..54], scratch[..54]);
        assert_ne!(scratch, live);
        assert_eq!(
            fk.constraint_name("_keel_rebuild_user_account", "organization_id"),
            scratch
        );
    }

    #[test]
    fn test_introspected_constraint_name_is_kept() {
        let mut fk = ForeignKey::new("company", "id");
        fk.constraint = Some("user_ibfk_1".into());
        assert_eq!(fk.constraint_name("user", "company_id"), "user_ibfk_1");
    }

    #[test]
    fn test_table_builder() {
        let table = Table::new("users")
            .column(TableColumn::new("id", "INTEGER").primary_key().auto_increment())
            .column(TableColumn::new("email", "TEXT"))
            .index(TableIndex::new("ix_users_email", ["email"]).unique());

        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.primary_key().unwrap().name, "id");
        assert!(table.indexes[0].unique);
    }

    #[test]
    fn test_duplicate_column_last_writer_wins() {
        let table = Table::new("t")
            .column(TableColumn::new("a", "TEXT"))
            .column(TableColumn::new("a", "INTEGER"));

        assert_eq!(table.columns.len(), 1);
        assert_eq!(table.columns[0].column_type, "INTEGER");
    }

    #[test]
    fn test_index_shape_ignores_column_order() {
        let a = TableIndex::new("ix", ["a", "b"]);
        let b = TableIndex::new("ix", ["b", "a"]);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&b.clone().unique()));
    }

    #[test]
    fn test_foreign_key_equality_ignores_constraint_name() {
        let declared = ForeignKey::new("company", "id");
        let mut found = ForeignKey::new("company", "id");
        found.constraint = Some("user_ibfk_1".into());
        assert_eq!(declared, found);
        assert_eq!(found.constraint_name("user", "company_id"), "user_ibfk_1");
        assert_eq!(
            declared.constraint_name("user", "company_id"),
            "fk_user_company_id_company_id"
        );
    }
}
