//! Database dialect implementations.
//!
//! Each dialect knows how to name types, quote identifiers and render DDL
//! and DML for its backend. The differ and planner only ever talk to the
//! [`Dialect`] trait; nothing outside this module branches on the backend.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::entity::{EntitySchema, Field, FieldType, Record};
use crate::error::{CoreError, Result};
use crate::query::Query;
use crate::schema::{Table, TableColumn, TableIndex};
use crate::statement::Statement;
use crate::value::Value;

/// Outcome of rendering a column change.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// The change is expressible in place.
    Statements(Vec<Statement>),
    /// The backend cannot express the change; the table must be rebuilt
    /// through [`Dialect::render_override`].
    NeedsOverride,
}

impl Rendered {
    /// Wraps a single SQL string.
    #[must_use]
    pub fn one(sql: impl Into<String>) -> Self {
        Self::Statements(vec![Statement::new(sql)])
    }
}

/// Quotes a string literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Trait for backend-specific schema and statement generation.
pub trait Dialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Native column type for a semantic type, `None` if unsupported.
    fn map_type(&self, field_type: FieldType) -> Option<&'static str>;

    /// Whether the backend reports generated ids through last-insert-id.
    fn uses_last_insert_id(&self) -> bool;

    /// Whether placeholders are numbered (`$1`) rather than positional (`?`).
    fn uses_numbered_placeholders(&self) -> bool;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Normalizes a target table to what the backend can actually store.
    fn adjust_table_definition(&self, table: Table) -> Table {
        table
    }

    /// Generates the column definition used inside CREATE/ADD COLUMN.
    fn column_definition(&self, column: &TableColumn) -> String;

    /// Generates the statements creating a table with its indexes.
    fn render_table_create(&self, table: &Table) -> Vec<Statement>;

    /// Generates the statements dropping a table.
    fn render_table_drop(&self, table: &Table) -> Vec<Statement> {
        vec![Statement::new(format!(
            "DROP TABLE {}",
            self.quote_identifier(&table.name)
        ))]
    }

    /// Generates the statement renaming a table.
    fn render_table_rename(&self, from: &str, to: &str) -> Statement {
        Statement::new(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))
    }

    /// Generates the statements adding a column.
    fn render_column_create(&self, table: &Table, column: &TableColumn) -> Rendered;

    /// Generates the statements changing `source` into `target`.
    fn render_column_alter(
        &self,
        table: &Table,
        source: &TableColumn,
        target: &TableColumn,
    ) -> Rendered;

    /// Generates the statements dropping a column.
    fn render_column_drop(&self, table: &Table, column: &TableColumn) -> Rendered {
        Rendered::one(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(&table.name),
            self.quote_identifier(&column.name)
        ))
    }

    /// Generates the statements creating an index.
    fn render_index_create(&self, table: &Table, index: &TableIndex) -> Vec<Statement> {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        vec![Statement::new(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            self.quote_identifier(&table.name),
            columns.join(", ")
        ))]
    }

    /// Generates the statements changing an index: drop, then create.
    fn render_index_alter(
        &self,
        table: &Table,
        source: &TableIndex,
        target: &TableIndex,
    ) -> Vec<Statement> {
        let mut statements = self.render_index_drop(table, source);
        statements.extend(self.render_index_create(table, target));
        statements
    }

    /// Generates the statements dropping an index.
    fn render_index_drop(&self, table: &Table, index: &TableIndex) -> Vec<Statement>;

    /// Name of the scratch table used while rebuilding `table`.
    fn rebuild_table_name(&self, table: &str) -> String {
        format!("_keel_rebuild_{table}")
    }

    /// Statements run before a rebuild.
    fn override_prologue(&self) -> Vec<Statement> {
        Vec::new()
    }

    /// Statements run after a rebuild.
    fn override_epilogue(&self, _target: &Table) -> Vec<Statement> {
        Vec::new()
    }

    /// Statements restoring the connection after a rebuild failed halfway.
    ///
    /// Run in place of the rest of the plan; each one may fail on its own
    /// without affecting the others.
    fn override_recovery(&self) -> Vec<Statement> {
        Vec::new()
    }

    /// Creates the scratch table of a rebuild.
    fn render_scratch_create(&self, scratch: &Table) -> Vec<Statement> {
        self.render_table_create(scratch)
    }

    /// Whether index names are schema-wide, so the source's indexes must go
    /// before the scratch table can reuse their names.
    fn index_names_are_global(&self) -> bool {
        true
    }

    /// Copies `columns` from one table into another.
    fn render_copy_rows(&self, from: &str, to: &str, columns: &[&str]) -> Statement {
        let columns: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let columns = columns.join(", ");
        Statement::new(format!(
            "INSERT INTO {} ({columns}) SELECT {columns} FROM {}",
            self.quote_identifier(to),
            self.quote_identifier(from)
        ))
    }

    /// Full table rebuild turning `source` into `target`.
    ///
    /// Creates a scratch table with the target shape, copies the rows of
    /// every column both shapes share (in target order), drops the original
    /// and renames the scratch table into place. A scratch table left over
    /// from an interrupted rebuild is discarded first.
    fn render_override(&self, source: &Table, target: &Table) -> Vec<Statement> {
        let mut scratch = target.clone();
        scratch.name = self.rebuild_table_name(&target.name);

        let mut statements = self.override_prologue();
        statements.push(Statement::new(format!(
            "DROP TABLE IF EXISTS {}",
            self.quote_identifier(&scratch.name)
        )));
        if self.index_names_are_global() {
            for index in &source.indexes {
                statements.extend(self.render_index_drop(source, index));
            }
        }
        statements.extend(self.render_scratch_create(&scratch));

        let shared: Vec<&str> = target
            .columns
            .iter()
            .filter(|c| source.get_column(&c.name).is_some())
            .map(|c| c.name.as_str())
            .collect();
        if !shared.is_empty() {
            statements.push(self.render_copy_rows(&source.name, &scratch.name, &shared));
        }

        statements.extend(self.render_table_drop(source));
        statements.push(self.render_table_rename(&scratch.name, &target.name));
        statements.extend(self.override_epilogue(target));
        statements
    }

    /// Placeholder for a written value.
    fn value_placeholder(&self, field: &Field) -> String {
        format!(":{}", field.column)
    }

    /// Clause appended to inserts to read back the generated id.
    fn returning_clause(&self, _schema: &EntitySchema) -> Option<String> {
        None
    }

    /// Generates an INSERT of every insertable field.
    fn render_insert(&self, schema: &EntitySchema, record: &Record) -> Statement {
        let fields: Vec<&Field> = schema.fields.iter().filter(|f| f.is_insertable()).collect();
        let table = self.quote_identifier(&schema.name);

        let mut statement = if fields.is_empty() {
            Statement::new(format!("INSERT INTO {table} DEFAULT VALUES"))
        } else {
            let columns: Vec<String> = fields
                .iter()
                .map(|f| self.quote_identifier(&f.column))
                .collect();
            let values: Vec<String> = fields.iter().map(|f| self.value_placeholder(f)).collect();
            Statement::new(format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                values.join(", ")
            ))
        };

        for field in fields {
            statement.bind_value(field.column.clone(), field_value(record, field));
        }
        if let Some(clause) = self.returning_clause(schema) {
            statement.sql.push(' ');
            statement.sql.push_str(&clause);
        }
        statement
    }

    /// Generates an UPDATE keyed on the primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] if the entity has none.
    fn render_update(&self, schema: &EntitySchema, record: &Record) -> Result<Statement> {
        let pk = schema
            .primary_key()
            .ok_or_else(|| CoreError::MissingPrimaryKey(schema.name.clone()))?;
        let fields: Vec<&Field> = schema.fields.iter().filter(|f| f.is_updatable()).collect();
        let pk_column = self.quote_identifier(&pk.column);

        let sets: Vec<String> = if fields.is_empty() {
            vec![format!("{pk_column} = {pk_column}")]
        } else {
            fields
                .iter()
                .map(|f| {
                    format!(
                        "{} = {}",
                        self.quote_identifier(&f.column),
                        self.value_placeholder(f)
                    )
                })
                .collect()
        };

        let mut statement = Statement::new(format!(
            "UPDATE {} SET {} WHERE {pk_column} = :{}",
            self.quote_identifier(&schema.name),
            sets.join(", "),
            pk.column
        ));
        for field in fields {
            statement.bind_value(field.column.clone(), field_value(record, field));
        }
        statement.bind_value(pk.column.clone(), field_value(record, pk));
        Ok(statement)
    }

    /// Generates a DELETE keyed on the primary key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingPrimaryKey`] if the entity has none.
    fn render_delete(&self, schema: &EntitySchema, record: &Record) -> Result<Statement> {
        let pk = schema
            .primary_key()
            .ok_or_else(|| CoreError::MissingPrimaryKey(schema.name.clone()))?;
        Ok(Statement::new(format!(
            "DELETE FROM {} WHERE {} = :{}",
            self.quote_identifier(&schema.name),
            self.quote_identifier(&pk.column),
            pk.column
        ))
        .bind(pk.column.clone(), field_value(record, pk)))
    }

    /// Generates a SELECT for `query`.
    fn render_select(&self, query: &Query) -> Statement {
        let columns: Vec<String> = query
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        let mut statement = Statement::new("");
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            self.quote_identifier(&query.table)
        );

        if let Some(filter) = &query.filter {
            let quote = |name: &str| self.quote_identifier(name);
            let mut counter = 0;
            sql.push_str(" WHERE ");
            sql.push_str(&filter.render(&quote, &mut statement, &mut counter));
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit.count, limit.offset));
        }

        statement.sql = sql;
        statement
    }
}

fn field_value(record: &Record, field: &Field) -> Value {
    record.value(&field.column).cloned().unwrap_or(Value::Null)
}
