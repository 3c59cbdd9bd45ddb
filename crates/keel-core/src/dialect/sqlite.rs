//! SQLite dialect.
//!
//! SQLite has limited ALTER TABLE support, so every column alteration goes
//! through the table recreation strategy: create a new table, copy data,
//! drop the old table, rename the new table. SQLite also cannot store
//! comments, so they are stripped from target tables.

use crate::entity::FieldType;
use crate::schema::{Table, TableColumn, TableIndex};
use crate::statement::Statement;

use super::{Dialect, Rendered};

/// SQLite dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Defaults SQLite refuses in `ALTER TABLE ADD COLUMN`.
fn is_non_constant_default(expr: &str) -> bool {
    let upper = expr.trim().to_ascii_uppercase();
    upper.starts_with('(')
        || matches!(
            upper.as_str(),
            "CURRENT_TIME" | "CURRENT_DATE" | "CURRENT_TIMESTAMP"
        )
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn map_type(&self, field_type: FieldType) -> Option<&'static str> {
        Some(match field_type {
            FieldType::Bool
            | FieldType::Int8
            | FieldType::Int16
            | FieldType::Int32
            | FieldType::Int64
            | FieldType::UInt8
            | FieldType::UInt16
            | FieldType::UInt32
            | FieldType::UInt64 => "INTEGER",
            FieldType::Float32 | FieldType::Float64 => "REAL",
            FieldType::Text | FieldType::Json => "TEXT",
            FieldType::Timestamp => "DATETIME",
            FieldType::Bytes => "BLOB",
        })
    }

    fn uses_last_insert_id(&self) -> bool {
        true
    }

    fn uses_numbered_placeholders(&self) -> bool {
        false
    }

    fn adjust_table_definition(&self, mut table: Table) -> Table {
        table.comment.clear();
        for column in &mut table.columns {
            column.comment.clear();
        }
        table
    }

    fn column_definition(&self, column: &TableColumn) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.column_type.clone(),
        ];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.auto_increment {
                parts.push("AUTOINCREMENT".to_string());
            }
        }

        if let Some(default) = column.default.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("DEFAULT {default}"));
        }

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(fk) = &column.foreign_key {
            parts.push(format!(
                "REFERENCES {}({}) ON DELETE CASCADE",
                self.quote_identifier(&fk.table),
                self.quote_identifier(&fk.column)
            ));
        }

        parts.join(" ")
    }

    fn render_table_create(&self, table: &Table) -> Vec<Statement> {
        let columns: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        let mut statements = vec![Statement::new(format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            columns.join(",\n  ")
        ))];
        for index in &table.indexes {
            statements.extend(self.render_index_create(table, index));
        }
        statements
    }

    fn render_column_create(&self, table: &Table, column: &TableColumn) -> Rendered {
        let default = column.default.as_deref().filter(|d| !d.is_empty());
        let non_null_default = default.is_some_and(|d| !d.eq_ignore_ascii_case("NULL"));

        if column.primary_key
            || (!column.nullable && default.is_none())
            || default.is_some_and(is_non_constant_default)
            || (column.foreign_key.is_some() && non_null_default)
        {
            return Rendered::NeedsOverride;
        }

        Rendered::one(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(&table.name),
            self.column_definition(column)
        ))
    }

    fn render_column_alter(
        &self,
        _table: &Table,
        _source: &TableColumn,
        _target: &TableColumn,
    ) -> Rendered {
        Rendered::NeedsOverride
    }

    fn render_column_drop(&self, table: &Table, column: &TableColumn) -> Rendered {
        if column.primary_key || column.foreign_key.is_some() {
            return Rendered::NeedsOverride;
        }
        Rendered::one(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(&table.name),
            self.quote_identifier(&column.name)
        ))
    }

    fn render_index_drop(&self, _table: &Table, index: &TableIndex) -> Vec<Statement> {
        vec![Statement::new(format!(
            "DROP INDEX IF EXISTS {}",
            self.quote_identifier(&index.name)
        ))]
    }

    // The pragma is a no-op inside a transaction, so it brackets one.
    fn override_prologue(&self) -> Vec<Statement> {
        vec![
            Statement::new("PRAGMA foreign_keys = OFF"),
            Statement::new("BEGIN"),
        ]
    }

    fn override_epilogue(&self, _target: &Table) -> Vec<Statement> {
        vec![
            Statement::new("COMMIT"),
            Statement::new("PRAGMA foreign_keys = ON"),
        ]
    }

    fn override_recovery(&self) -> Vec<Statement> {
        vec![
            Statement::new("ROLLBACK"),
            Statement::new("PRAGMA foreign_keys = ON"),
        ]
    }
}
