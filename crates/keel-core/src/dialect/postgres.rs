//! PostgreSQL dialect.

use crate::entity::{EntitySchema, Field, FieldType};
use crate::schema::{ForeignKey, Table, TableColumn, TableIndex};
use crate::statement::Statement;

use super::{quote_literal, Dialect, Rendered};

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new PostgreSQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn comment_on_column(&self, table: &str, column: &str, comment: &str) -> Statement {
        let text = if comment.is_empty() {
            "NULL".to_string()
        } else {
            quote_literal(comment)
        };
        Statement::new(format!(
            "COMMENT ON COLUMN {}.{} IS {text}",
            self.quote_identifier(table),
            self.quote_identifier(column)
        ))
    }

    fn constraint_definition(&self, table: &str, column: &str, fk: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE CASCADE",
            self.quote_identifier(&fk.constraint_name(table, column)),
            self.quote_identifier(column),
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.column)
        )
    }

    fn add_constraint(&self, table: &str, column: &str, fk: &ForeignKey) -> Statement {
        let declared = ForeignKey::new(fk.table.clone(), fk.column.clone());
        Statement::new(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.constraint_definition(table, column, &declared)
        ))
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn map_type(&self, field_type: FieldType) -> Option<&'static str> {
        Some(match field_type {
            FieldType::Bool => "boolean",
            FieldType::Int8 | FieldType::Int16 | FieldType::UInt8 => "smallint",
            FieldType::Int32 | FieldType::UInt16 => "integer",
            FieldType::Int64 | FieldType::UInt32 | FieldType::UInt64 => "bigint",
            FieldType::Float32 => "real",
            FieldType::Float64 => "double precision",
            FieldType::Text => "text",
            FieldType::Timestamp => "timestamp without time zone",
            FieldType::Bytes => "bytea",
            FieldType::Json => "json",
        })
    }

    fn uses_last_insert_id(&self) -> bool {
        false
    }

    fn uses_numbered_placeholders(&self) -> bool {
        true
    }

    fn column_definition(&self, column: &TableColumn) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.column_type.clone(),
        ];

        if column.primary_key {
            if column.auto_increment {
                parts.push("GENERATED ALWAYS AS IDENTITY".to_string());
            }
            parts.push("PRIMARY KEY".to_string());
        }

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = column.default.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("DEFAULT {default}"));
        }

        parts.join(" ")
    }

    fn render_table_create(&self, table: &Table) -> Vec<Statement> {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        lines.extend(table.columns.iter().filter_map(|c| {
            c.foreign_key
                .as_ref()
                .map(|fk| self.constraint_definition(&table.name, &c.name, fk))
        }));

        let mut statements = vec![Statement::new(format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(&table.name),
            lines.join(",\n  ")
        ))];

        if !table.comment.is_empty() {
            statements.push(Statement::new(format!(
                "COMMENT ON TABLE {} IS {}",
                self.quote_identifier(&table.name),
                quote_literal(&table.comment)
            )));
        }
        statements.extend(
            table
                .columns
                .iter()
                .filter(|c| !c.comment.is_empty())
                .map(|c| self.comment_on_column(&table.name, &c.name, &c.comment)),
        );
        for index in &table.indexes {
            statements.extend(self.render_index_create(table, index));
        }
        statements
    }

    fn render_column_create(&self, table: &Table, column: &TableColumn) -> Rendered {
        let mut statements = vec![Statement::new(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(&table.name),
            self.column_definition(column)
        ))];
        if !column.comment.is_empty() {
            statements.push(self.comment_on_column(&table.name, &column.name, &column.comment));
        }
        if let Some(fk) = &column.foreign_key {
            statements.push(self.add_constraint(&table.name, &column.name, fk));
        }
        Rendered::Statements(statements)
    }

    fn render_column_alter(
        &self,
        table: &Table,
        source: &TableColumn,
        target: &TableColumn,
    ) -> Rendered {
        if source.primary_key != target.primary_key
            || source.auto_increment != target.auto_increment
        {
            return Rendered::NeedsOverride;
        }

        let table_name = self.quote_identifier(&table.name);
        let column = self.quote_identifier(&target.name);
        let alter = format!("ALTER TABLE {table_name} ALTER COLUMN {column}");
        let mut statements = Vec::new();

        if source.comment != target.comment {
            statements.push(self.comment_on_column(&table.name, &target.name, &target.comment));
        }

        if source.nullable != target.nullable {
            statements.push(Statement::new(if target.nullable {
                format!("{alter} DROP NOT NULL")
            } else {
                format!("{alter} SET NOT NULL")
            }));
        }

        if source.column_type != target.column_type {
            statements.push(Statement::new(format!(
                "{alter} TYPE {ty} USING {column}::{ty}",
                ty = target.column_type
            )));
        }

        if source.default != target.default {
            statements.push(Statement::new(match &target.default {
                Some(default) => format!("{alter} SET DEFAULT {default}"),
                None => format!("{alter} DROP DEFAULT"),
            }));
        }

        if source.foreign_key != target.foreign_key {
            if let Some(fk) = &source.foreign_key {
                statements.push(Statement::new(format!(
                    "ALTER TABLE {table_name} DROP CONSTRAINT IF EXISTS {}",
                    self.quote_identifier(&fk.constraint_name(&table.name, &source.name))
                )));
            }
            if let Some(fk) = &target.foreign_key {
                statements.push(self.add_constraint(&table.name, &target.name, fk));
            }
        }

        Rendered::Statements(statements)
    }

    fn render_index_drop(&self, _table: &Table, index: &TableIndex) -> Vec<Statement> {
        vec![Statement::new(format!(
            "DROP INDEX {}",
            self.quote_identifier(&index.name)
        ))]
    }

    fn render_copy_rows(&self, from: &str, to: &str, columns: &[&str]) -> Statement {
        let columns: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        let columns = columns.join(", ");
        Statement::new(format!(
            "INSERT INTO {} ({columns}) OVERRIDING SYSTEM VALUE SELECT {columns} FROM {}",
            self.quote_identifier(to),
            self.quote_identifier(from)
        ))
    }

    fn override_prologue(&self) -> Vec<Statement> {
        vec![Statement::new("BEGIN")]
    }

    fn override_epilogue(&self, target: &Table) -> Vec<Statement> {
        let table = self.quote_identifier(&target.name);
        let scratch = self.rebuild_table_name(&target.name);

        // Constraints declared on the scratch table keep its name after the
        // rename.
        let mut statements: Vec<Statement> = target
            .columns
            .iter()
            .filter_map(|c| {
                c.foreign_key.as_ref().map(|fk| {
                    let declared = ForeignKey::new(fk.table.clone(), fk.column.clone());
                    Statement::new(format!(
                        "ALTER TABLE {table} RENAME CONSTRAINT {} TO {}",
                        self.quote_identifier(&declared.constraint_name(&scratch, &c.name)),
                        self.quote_identifier(&declared.constraint_name(&target.name, &c.name))
                    ))
                })
            })
            .collect();

        // Identity sequences restart at 1 after a rebuild; move them past the
        // copied ids.
        statements.extend(target.columns.iter().filter(|c| c.auto_increment).map(|c| {
            let column = self.quote_identifier(&c.name);
            Statement::new(format!(
                "SELECT setval(pg_get_serial_sequence({}, {}), COALESCE(MAX({column}), 0) + 1, false) FROM {table}",
                quote_literal(&table),
                quote_literal(&c.name)
            ))
        }));
        statements.push(Statement::new("COMMIT"));
        statements
    }

    fn override_recovery(&self) -> Vec<Statement> {
        vec![Statement::new("ROLLBACK")]
    }

    fn value_placeholder(&self, field: &Field) -> String {
        match self.map_type(field.field_type) {
            Some(native) => format!("CAST(:{} AS {native})", field.column),
            None => format!(":{}", field.column),
        }
    }

    fn returning_clause(&self, schema: &EntitySchema) -> Option<String> {
        schema.primary_key().map(|pk| {
            format!(
                "RETURNING {} AS {}",
                self.quote_identifier(&pk.column),
                self.quote_identifier("id")
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Record;

    fn dialect() -> PostgresDialect {
        PostgresDialect::new()
    }

    fn users() -> Table {
        Table::new("user")
            .comment("people")
            .column(
                TableColumn::new("id", "bigint")
                    .primary_key()
                    .auto_increment(),
            )
            .column(TableColumn::new("email", "text").comment("login"))
            .column(TableColumn::new("company_id", "bigint").references("company", "id"))
            .index(TableIndex::new("ix_user_email", ["email"]))
    }

    #[test]
    fn test_create_table() {
        let sql: Vec<String> = dialect()
            .render_table_create(&users())
            .into_iter()
            .map(|s| s.sql)
            .collect();
        assert_eq!(
            sql[0],
            "CREATE TABLE \"user\" (\n  \
             \"id\" bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY NOT NULL,\n  \
             \"email\" text NOT NULL,\n  \
             \"company_id\" bigint NOT NULL,\n  \
             CONSTRAINT \"fk_user_company_id_company_id\" FOREIGN KEY (\"company_id\") \
             REFERENCES \"company\"(\"id\") ON DELETE CASCADE\n)"
        );
        assert_eq!(sql[1], "COMMENT ON TABLE \"user\" IS 'people'");
        assert_eq!(sql[2], "COMMENT ON COLUMN \"user\".\"email\" IS 'login'");
        assert_eq!(sql[3], "CREATE INDEX \"ix_user_email\" ON \"user\" (\"email\")");
        assert_eq!(sql.len(), 4);
    }

    #[test]
    fn test_alter_emits_only_changed_attributes() {
        let table = users();
        let source = &table.columns[1];
        let mut target = source.clone();
        target.nullable = true;
        target.default = Some("NULL".into());

        let Rendered::Statements(statements) =
            dialect().render_column_alter(&table, source, &target)
        else {
            panic!("expected statements");
        };
        let sql: Vec<_> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            [
                "ALTER TABLE \"user\" ALTER COLUMN \"email\" DROP NOT NULL",
                "ALTER TABLE \"user\" ALTER COLUMN \"email\" SET DEFAULT NULL",
            ]
        );
    }

    #[test]
    fn test_alter_type_uses_cast() {
        let table = users();
        let source = TableColumn::new("age", "integer");
        let target = TableColumn::new("age", "bigint");
        assert_eq!(
            dialect().render_column_alter(&table, &source, &target),
            Rendered::one("ALTER TABLE \"user\" ALTER COLUMN \"age\" TYPE bigint USING \"age\"::bigint")
        );
    }

    #[test]
    fn test_insert_casts_and_returns_id() {
        let schema = EntitySchema::new("user")
            .field(Field::of::<i64>("id").primary_key().auto_increment())
            .field(Field::of::<serde_json::Value>("settings"));
        let record = Record::new().set("settings", serde_json::json!({"a": 1}));
        let stmt = dialect().render_insert(&schema, &record);
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"user\" (\"settings\") VALUES (CAST(:settings AS json)) RETURNING \"id\" AS \"id\""
        );
    }

    #[test]
    fn test_override_resets_identity() {
        let source = users();
        let mut target = users();
        target.columns[0].auto_increment = true;
        let sql: Vec<String> = dialect()
            .render_override(&source, &target)
            .into_iter()
            .map(|s| s.sql)
            .collect();
        assert_eq!(sql[0], "BEGIN");
        assert_eq!(sql[1], "DROP TABLE IF EXISTS \"_keel_rebuild_user\"");
        assert_eq!(sql[2], "DROP INDEX \"ix_user_email\"");
        assert!(sql.iter().any(|s| s.contains("OVERRIDING SYSTEM VALUE")));
        assert!(sql[sql.len() - 2]
            .starts_with("SELECT setval(pg_get_serial_sequence('\"user\"', 'id')"));
        assert_eq!(sql[sql.len() - 1], "COMMIT");
    }

    #[test]
    fn test_override_renames_scratch_constraints() {
        let sql: Vec<String> = dialect()
            .render_override(&users(), &users())
            .into_iter()
            .map(|s| s.sql)
            .collect();
        assert!(sql.iter().any(|s| s.contains(
            "CONSTRAINT \"fk__keel_rebuild_user_company_id_company_id\" FOREIGN KEY"
        )));
        assert!(sql.contains(
            &"ALTER TABLE \"user\" RENAME CONSTRAINT \"fk__keel_rebuild_user_company_id_company_id\" \
              TO \"fk_user_company_id_company_id\""
                .to_string()
        ));
    }

    #[test]
    fn test_unsigned_widened() {
        assert_eq!(dialect().map_type(FieldType::UInt16), Some("integer"));
        assert_eq!(dialect().map_type(FieldType::UInt32), Some("bigint"));
    }
}
