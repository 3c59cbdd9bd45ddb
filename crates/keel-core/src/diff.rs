//! Schema differ.
//!
//! Compares an introspected (source) [`Table`] with a declared (target)
//! one. Names are the only identity: a renamed column shows up as one drop
//! and one add. Lookups are `BTreeMap`s, so every list in the result comes
//! out sorted by name whatever order the tables listed their entries in.

use std::collections::BTreeMap;

use crate::schema::{Table, TableColumn, TableIndex};

// ================================================================
// Public types
// ================================================================

/// A column present on both sides whose definition changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChange {
    /// As found in the backend.
    pub source: TableColumn,
    /// As declared.
    pub target: TableColumn,
}

/// An index present on both sides whose shape changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexChange {
    /// As found in the backend.
    pub source: TableIndex,
    /// As declared.
    pub target: TableIndex,
}

/// Structured delta between a source and a target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    /// The declared table.
    pub table: Table,
    /// Columns to add.
    pub columns_to_add: Vec<TableColumn>,
    /// Columns to alter.
    pub columns_to_alter: Vec<ColumnChange>,
    /// Columns to drop.
    pub columns_to_drop: Vec<TableColumn>,
    /// Indexes to add.
    pub indexes_to_add: Vec<TableIndex>,
    /// Indexes to alter.
    pub indexes_to_alter: Vec<IndexChange>,
    /// Indexes to drop.
    pub indexes_to_drop: Vec<TableIndex>,
}

impl TableDiff {
    /// Returns true if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    /// Total number of changed columns and indexes.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.columns_to_add.len()
            + self.columns_to_alter.len()
            + self.columns_to_drop.len()
            + self.indexes_to_add.len()
            + self.indexes_to_alter.len()
            + self.indexes_to_drop.len()
    }
}

// ================================================================
// Diff computation
// ================================================================

/// Computes what must change to turn `source` into `target`.
#[must_use]
pub fn diff(source: &Table, target: &Table) -> TableDiff {
    let source_columns: BTreeMap<&str, &TableColumn> =
        source.columns.iter().map(|c| (c.name.as_str(), c)).collect();
    let target_columns: BTreeMap<&str, &TableColumn> =
        target.columns.iter().map(|c| (c.name.as_str(), c)).collect();

    let mut result = TableDiff {
        table: target.clone(),
        columns_to_add: Vec::new(),
        columns_to_alter: Vec::new(),
        columns_to_drop: Vec::new(),
        indexes_to_add: Vec::new(),
        indexes_to_alter: Vec::new(),
        indexes_to_drop: Vec::new(),
    };

    for (name, target_column) in &target_columns {
        match source_columns.get(name) {
            None => result.columns_to_add.push((*target_column).clone()),
            Some(source_column) if source_column != target_column => {
                result.columns_to_alter.push(ColumnChange {
                    source: (*source_column).clone(),
                    target: (*target_column).clone(),
                });
            }
            Some(_) => {}
        }
    }
    result.columns_to_drop = source_columns
        .iter()
        .filter(|(name, _)| !target_columns.contains_key(*name))
        .map(|(_, c)| (*c).clone())
        .collect();

    diff_indexes(source, target, &mut result);
    result
}

fn diff_indexes(source: &Table, target: &Table, result: &mut TableDiff) {
    let source_indexes: BTreeMap<&str, &TableIndex> =
        source.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
    let target_indexes: BTreeMap<&str, &TableIndex> =
        target.indexes.iter().map(|i| (i.name.as_str(), i)).collect();

    for (name, target_index) in &target_indexes {
        match source_indexes.get(name) {
            None => result.indexes_to_add.push((*target_index).clone()),
            Some(source_index) if !source_index.same_shape(target_index) => {
                result.indexes_to_alter.push(IndexChange {
                    source: (*source_index).clone(),
                    target: (*target_index).clone(),
                });
            }
            Some(_) => {}
        }
    }
    result.indexes_to_drop = source_indexes
        .iter()
        .filter(|(name, _)| !target_indexes.contains_key(*name))
        .map(|(_, i)| (*i).clone())
        .collect();
}

// ================================================================
// Tests
// ================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Table {
        Table::new("user")
            .column(
                TableColumn::new("id", "INTEGER")
                    .primary_key()
                    .auto_increment(),
            )
            .column(TableColumn::new("email", "TEXT"))
            .column(TableColumn::new("name", "TEXT"))
            .index(TableIndex::new("ix_user_email", ["email"]))
    }

    #[test]
    fn test_identical_tables_have_no_diff() {
        assert!(diff(&base(), &base()).is_empty());
    }

    #[test]
    fn test_add_alter_drop_columns() {
        let source = base();
        let mut target = base();
        target.columns.retain(|c| c.name != "name");
        target.columns[1].nullable = true;
        target.push_column(TableColumn::new("age", "INTEGER"));

        let d = diff(&source, &target);
        assert_eq!(d.columns_to_add.len(), 1);
        assert_eq!(d.columns_to_add[0].name, "age");
        assert_eq!(d.columns_to_alter.len(), 1);
        assert_eq!(d.columns_to_alter[0].source.name, "email");
        assert!(!d.columns_to_alter[0].source.nullable);
        assert!(d.columns_to_alter[0].target.nullable);
        assert_eq!(d.columns_to_drop.len(), 1);
        assert_eq!(d.columns_to_drop[0].name, "name");
        assert_eq!(d.change_count(), 3);
    }

    #[test]
    fn test_rename_is_drop_plus_add() {
        let source = base();
        let mut target = base();
        target.columns[2].name = "full_name".into();

        let d = diff(&source, &target);
        assert_eq!(d.columns_to_add[0].name, "full_name");
        assert_eq!(d.columns_to_drop[0].name, "name");
        assert!(d.columns_to_alter.is_empty());
    }

    #[test]
    fn test_index_column_order_is_normalized() {
        let source = base().index(TableIndex::new("ix_pair", ["email", "name"]));
        let target = base().index(TableIndex::new("ix_pair", ["name", "email"]));
        assert!(diff(&source, &target).is_empty());
    }

    #[test]
    fn test_index_changes() {
        let source = base().index(TableIndex::new("ix_old", ["name"]));
        let target = base()
            .index(TableIndex::new("ix_user_email", ["email"]).unique())
            .index(TableIndex::new("ix_new", ["name"]));

        let d = diff(&source, &target);
        assert_eq!(d.indexes_to_add[0].name, "ix_new");
        assert_eq!(d.indexes_to_alter[0].target.name, "ix_user_email");
        assert!(d.indexes_to_alter[0].target.unique);
        assert_eq!(d.indexes_to_drop[0].name, "ix_old");
    }

    #[test]
    fn test_diff_is_independent_of_declaration_order() {
        let source = base();
        let mut target = base();
        target.push_column(TableColumn::new("b", "TEXT"));
        target.push_column(TableColumn::new("a", "TEXT"));

        let mut shuffled_source = source.clone();
        shuffled_source.columns.reverse();
        let mut shuffled_target = target.clone();
        shuffled_target.columns.reverse();

        let first = diff(&source, &target);
        let second = diff(&shuffled_source, &shuffled_target);
        assert_eq!(first.columns_to_add, second.columns_to_add);
        assert_eq!(first.columns_to_add[0].name, "a");
        assert_eq!(first.columns_to_add[1].name, "b");
        assert_eq!(diff(&source, &target), first);
    }
}
