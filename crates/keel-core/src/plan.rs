//! Migration planning.
//!
//! A [`MigrationPlan`] collects rendered statements from every table into
//! priority buckets, so that across the whole plan new tables come before
//! new columns, new columns before new indexes, and drops of indexes
//! before drops of the columns they cover. Rebuilds go last.
//!
//! Created tables are further ordered so that a referenced table exists
//! before its referrers; dropped tables go the other way round.

use crate::dialect::{Dialect, Rendered};
use crate::diff::{diff, TableDiff};
use crate::schema::Table;
use crate::statement::Statement;

/// What planning did for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    /// The table did not exist and will be created.
    Created,
    /// The table already matches its declaration.
    Unchanged,
    /// The table is altered in place; holds the number of changes.
    Altered(usize),
    /// The table is rebuilt through the override recipe.
    Rebuilt,
}

/// Statements bucketed by kind, flattened in a fixed order.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    tables_to_add: Vec<TableStatements>,
    columns_to_add: Vec<Statement>,
    indexes_to_add: Vec<Statement>,
    columns_to_alter: Vec<Statement>,
    indexes_to_alter: Vec<Statement>,
    indexes_to_drop: Vec<Statement>,
    columns_to_drop: Vec<Statement>,
    tables_to_drop: Vec<TableStatements>,
    overrides: Vec<Statement>,
}

/// Statements creating or dropping one table.
#[derive(Debug, Clone)]
struct TableStatements {
    table: Table,
    statements: Vec<Statement>,
}

/// Whether `table` holds a foreign key to `other`. Self references do not
/// count.
fn references(table: &Table, other: &Table) -> bool {
    table.name != other.name
        && table
            .columns
            .iter()
            .filter_map(|c| c.foreign_key.as_ref())
            .any(|fk| fk.table == other.name)
}

/// Orders groups so that referenced tables come first, or last when
/// `referenced_first` is false. Reference cycles keep insertion order.
fn reference_order(
    mut pending: Vec<TableStatements>,
    referenced_first: bool,
) -> Vec<Statement> {
    let mut ordered = Vec::new();
    while !pending.is_empty() {
        let next = pending.iter().position(|candidate| {
            !pending.iter().any(|other| {
                if referenced_first {
                    references(&candidate.table, &other.table)
                } else {
                    references(&other.table, &candidate.table)
                }
            })
        });
        ordered.extend(pending.remove(next.unwrap_or(0)).statements);
    }
    ordered
}

/// Column statements for one table, kept apart until we know the table
/// does not need a rebuild.
#[derive(Default)]
struct ColumnStatements {
    add: Vec<Statement>,
    alter: Vec<Statement>,
    drop: Vec<Statement>,
}

impl ColumnStatements {
    fn push(bucket: &mut Vec<Statement>, rendered: Rendered) -> bool {
        match rendered {
            Rendered::Statements(statements) => {
                bucket.extend(statements);
                true
            }
            Rendered::NeedsOverride => false,
        }
    }

    fn render<D: Dialect + ?Sized>(dialect: &D, source: &Table, diff: &TableDiff) -> Option<Self> {
        let table = &diff.table;
        let mut out = Self::default();

        for column in &diff.columns_to_add {
            if !Self::push(&mut out.add, dialect.render_column_create(table, column)) {
                return None;
            }
        }
        for change in &diff.columns_to_alter {
            let rendered = dialect.render_column_alter(table, &change.source, &change.target);
            if !Self::push(&mut out.alter, rendered) {
                return None;
            }
        }
        for column in &diff.columns_to_drop {
            if !Self::push(&mut out.drop, dialect.render_column_drop(source, column)) {
                return None;
            }
        }
        Some(out)
    }
}

impl MigrationPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plans the statements reconciling `source` with `target`.
    ///
    /// A missing source renders a create sequence. If any column change
    /// needs an override, every statement computed for this table is
    /// discarded in favour of the dialect's rebuild recipe.
    pub fn add_table<D: Dialect + ?Sized>(
        &mut self,
        dialect: &D,
        source: Option<&Table>,
        target: &Table,
    ) -> TableOutcome {
        let Some(source) = source else {
            self.tables_to_add.push(TableStatements {
                table: target.clone(),
                statements: dialect.render_table_create(target),
            });
            return TableOutcome::Created;
        };

        let diff = diff(source, target);
        if diff.is_empty() {
            return TableOutcome::Unchanged;
        }

        let Some(columns) = ColumnStatements::render(dialect, source, &diff) else {
            self.overrides.extend(dialect.render_override(source, target));
            return TableOutcome::Rebuilt;
        };

        self.columns_to_add.extend(columns.add);
        self.columns_to_alter.extend(columns.alter);
        self.columns_to_drop.extend(columns.drop);
        for index in &diff.indexes_to_add {
            self.indexes_to_add.extend(dialect.render_index_create(target, index));
        }
        for change in &diff.indexes_to_alter {
            self.indexes_to_alter.extend(dialect.render_index_alter(
                target,
                &change.source,
                &change.target,
            ));
        }
        for index in &diff.indexes_to_drop {
            self.indexes_to_drop.extend(dialect.render_index_drop(source, index));
        }
        TableOutcome::Altered(diff.change_count())
    }

    /// Plans dropping a table that is no longer declared.
    pub fn drop_table<D: Dialect + ?Sized>(&mut self, dialect: &D, table: &Table) {
        self.tables_to_drop.push(TableStatements {
            table: table.clone(),
            statements: dialect.render_table_drop(table),
        });
    }

    /// Returns true if some table is rebuilt.
    #[must_use]
    pub fn rebuilds_tables(&self) -> bool {
        !self.overrides.is_empty()
    }

    /// Number of planned statements.
    #[must_use]
    pub fn len(&self) -> usize {
        let tables: usize = self
            .tables_to_add
            .iter()
            .chain(&self.tables_to_drop)
            .map(|group| group.statements.len())
            .sum();
        tables + self.buckets().iter().map(|b| b.len()).sum::<usize>()
    }

    /// Returns true if nothing is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn buckets(&self) -> [&Vec<Statement>; 7] {
        [
            &self.columns_to_add,
            &self.indexes_to_add,
            &self.columns_to_alter,
            &self.indexes_to_alter,
            &self.indexes_to_drop,
            &self.columns_to_drop,
            &self.overrides,
        ]
    }

    /// Flattens the plan in execution order.
    #[must_use]
    pub fn into_statements(self) -> Vec<Statement> {
        [
            reference_order(self.tables_to_add, true),
            self.columns_to_add,
            self.indexes_to_add,
            self.columns_to_alter,
            self.indexes_to_alter,
            self.indexes_to_drop,
            self.columns_to_drop,
            reference_order(self.tables_to_drop, false),
            self.overrides,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
