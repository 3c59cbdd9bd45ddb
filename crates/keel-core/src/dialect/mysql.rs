//! MySQL dialect.

use crate::entity::FieldType;
use crate::schema::{ForeignKey, Table, TableColumn, TableIndex};
use crate::statement::Statement;

use super::{Dialect, Rendered};

/// MySQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn literal(value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
    }

    fn definition(&self, column: &TableColumn, with_primary_key: bool) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.column_type.clone(),
        ];

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = column.default.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("DEFAULT {default}"));
        }

        if column.auto_increment {
            parts.push("AUTO_INCREMENT".to_string());
        }

        if column.primary_key && with_primary_key {
            parts.push("PRIMARY KEY".to_string());
        }

        parts.push(format!("COMMENT {}", Self::literal(&column.comment)));
        parts.join(" ")
    }

    fn key_definition(&self, index: &TableIndex) -> String {
        let columns: Vec<String> = index
            .columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect();
        format!(
            "{}KEY {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.name),
            columns.join(", ")
        )
    }

    fn constraint_definition(&self, table: &str, column: &str, fk: &ForeignKey) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
            self.quote_identifier(&fk.constraint_name(table, column)),
            self.quote_identifier(column),
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.column)
        )
    }

    fn add_constraint(&self, table: &str, column: &str, fk: &ForeignKey) -> Statement {
        // Declared references always get the conventional name.
        let declared = ForeignKey::new(fk.table.clone(), fk.column.clone());
        Statement::new(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(table),
            self.constraint_definition(table, column, &declared)
        ))
    }
}

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn map_type(&self, field_type: FieldType) -> Option<&'static str> {
        Some(match field_type {
            FieldType::Bool | FieldType::Int8 => "tinyint",
            FieldType::Int16 => "smallint",
            FieldType::Int32 => "int",
            FieldType::Int64 => "bigint",
            FieldType::UInt8 => "tinyint unsigned",
            FieldType::UInt16 => "smallint unsigned",
            FieldType::UInt32 => "int unsigned",
            FieldType::UInt64 => "bigint unsigned",
            FieldType::Float32 => "float",
            FieldType::Float64 => "double",
            FieldType::Text => "varchar(255)",
            FieldType::Timestamp => "datetime",
            FieldType::Bytes => "longblob",
            FieldType::Json => "longtext",
        })
    }

    fn uses_last_insert_id(&self) -> bool {
        true
    }

    fn uses_numbered_placeholders(&self) -> bool {
        false
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn column_definition(&self, column: &TableColumn) -> String {
        self.definition(column, true)
    }

    fn render_table_create(&self, table: &Table) -> Vec<Statement> {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        lines.extend(table.indexes.iter().map(|i| self.key_definition(i)));
        lines.extend(table.columns.iter().filter_map(|c| {
            c.foreign_key
                .as_ref()
                .map(|fk| self.constraint_definition(&table.name, &c.name, fk))
        }));

        vec![Statement::new(format!(
            "CREATE TABLE {} (\n  {}\n) COMMENT={}",
            self.quote_identifier(&table.name),
            lines.join(",\n  "),
            Self::literal(&table.comment)
        ))]
    }

    fn render_table_rename(&self, from: &str, to: &str) -> Statement {
        Statement::new(format!(
            "RENAME TABLE {} TO {}",
            self.quote_identifier(from),
            self.quote_identifier(to)
        ))
    }

    fn render_column_create(&self, table: &Table, column: &TableColumn) -> Rendered {
        let mut statements = vec![Statement::new(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_identifier(&table.name),
            self.column_definition(column)
        ))];
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
        let mut statements = Vec::new();
        let fk_changed = source.foreign_key != target.foreign_key;

        if fk_changed {
            if let Some(fk) = &source.foreign_key {
                statements.push(Statement::new(format!(
                    "ALTER TABLE {table_name} DROP FOREIGN KEY {}",
                    self.quote_identifier(&fk.constraint_name(&table.name, &source.name))
                )));
            }
        }

        let mut bare_source = source.clone();
        bare_source.foreign_key.clone_from(&target.foreign_key);
        if bare_source != *target {
            statements.push(Statement::new(format!(
                "ALTER TABLE {table_name} CHANGE {} {}",
                self.quote_identifier(&source.name),
                self.definition(target, false)
            )));
        }

        if fk_changed {
            if let Some(fk) = &target.foreign_key {
                statements.push(self.add_constraint(&table.name, &target.name, fk));
            }
        }

        Rendered::Statements(statements)
    }

    fn render_column_drop(&self, table: &Table, column: &TableColumn) -> Rendered {
        if column.foreign_key.is_some() {
            return Rendered::NeedsOverride;
        }
        Rendered::one(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_identifier(&table.name),
            self.quote_identifier(&column.name)
        ))
    }

    fn render_index_create(&self, table: &Table, index: &TableIndex) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER TABLE {} ADD {}",
            self.quote_identifier(&table.name),
            self.key_definition(index)
        ))]
    }

    fn render_index_drop(&self, table: &Table, index: &TableIndex) -> Vec<Statement> {
        vec![Statement::new(format!(
            "ALTER TABLE {} DROP INDEX {}",
            self.quote_identifier(&table.name),
            self.quote_identifier(&index.name)
        ))]
    }

    fn index_names_are_global(&self) -> bool {
        false
    }

    fn override_prologue(&self) -> Vec<Statement> {
        vec![Statement::new("SET FOREIGN_KEY_CHECKS = 0")]
    }

    // Foreign key names are schema-wide, so the scratch table carries none
    // while the source still holds them.
    fn render_scratch_create(&self, scratch: &Table) -> Vec<Statement> {
        let mut bare = scratch.clone();
        for column in &mut bare.columns {
            column.foreign_key = None;
        }
        self.render_table_create(&bare)
    }

    fn override_epilogue(&self, target: &Table) -> Vec<Statement> {
        let mut statements: Vec<Statement> = target
            .columns
            .iter()
            .filter_map(|c| {
                c.foreign_key
                    .as_ref()
                    .map(|fk| self.add_constraint(&target.name, &c.name, fk))
            })
            .collect();
        statements.push(Statement::new("SET FOREIGN_KEY_CHECKS = 1"));
        statements
    }

    fn override_recovery(&self) -> Vec<Statement> {
        vec![Statement::new("SET FOREIGN_KEY_CHECKS = 1")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialect() -> MySqlDialect {
        MySqlDialect::new()
    }

    fn users() -> Table {
        Table::new("user")
            .comment("people")
            .column(
                TableColumn::new("id", "bigint")
                    .primary_key()
                    .auto_increment(),
            )
            .column(TableColumn::new("email", "varchar(255)").comment("login"))
            .column(TableColumn::new("company_id", "bigint").references("company", "id"))
            .index(TableIndex::new("ix_user_email", ["email"]).unique())
    }

    #[test]
    fn test_create_table() {
        let statements = dialect().render_table_create(&users());
        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "CREATE TABLE `user` (\n  \
             `id` bigint NOT NULL AUTO_INCREMENT PRIMARY KEY COMMENT '',\n  \
             `email` varchar(255) NOT NULL COMMENT 'login',\n  \
             `company_id` bigint NOT NULL COMMENT '',\n  \
             UNIQUE KEY `ix_user_email` (`email`),\n  \
             CONSTRAINT `fk_user_company_id_company_id` FOREIGN KEY (`company_id`) \
             REFERENCES `company` (`id`) ON DELETE CASCADE\n) COMMENT='people'"
        );
    }

    #[test]
    fn test_add_column_with_reference_adds_constraint() {
        let column = TableColumn::new("team_id", "bigint")
            .nullable()
            .default("NULL")
            .references("team", "id");
        let Rendered::Statements(statements) = dialect().render_column_create(&users(), &column)
        else {
            panic!("expected statements");
        };
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[1].sql,
            "ALTER TABLE `user` ADD CONSTRAINT `fk_user_team_id_team_id` FOREIGN KEY (`team_id`) \
             REFERENCES `team` (`id`) ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_alter_column_uses_change_without_primary_key() {
        let table = users();
        let source = &table.columns[0];
        let target = source.clone().comment("identifier");
        assert_eq!(
            dialect().render_column_alter(&table, source, &target),
            Rendered::one(
                "ALTER TABLE `user` CHANGE `id` `id` bigint NOT NULL AUTO_INCREMENT COMMENT 'identifier'"
            )
        );
    }

    #[test]
    fn test_alter_reference_swaps_constraint() {
        let table = users();
        let mut source = table.columns[2].clone();
        source.foreign_key.as_mut().unwrap().constraint = Some("user_ibfk_1".into());
        let target = TableColumn::new("company_id", "bigint").references("organization", "id");

        let Rendered::Statements(statements) =
            dialect().render_column_alter(&table, &source, &target)
        else {
            panic!("expected statements");
        };
        let sql: Vec<_> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            [
                "ALTER TABLE `user` DROP FOREIGN KEY `user_ibfk_1`",
                "ALTER TABLE `user` ADD CONSTRAINT `fk_user_company_id_organization_id` \
                 FOREIGN KEY (`company_id`) REFERENCES `organization` (`id`) ON DELETE CASCADE",
            ]
        );
    }

    #[test]
    fn test_primary_key_change_needs_override() {
        let table = users();
        let source = &table.columns[1];
        let target = source.clone().primary_key();
        assert_eq!(
            dialect().render_column_alter(&table, source, &target),
            Rendered::NeedsOverride
        );
    }

    #[test]
    fn test_index_statements() {
        let table = users();
        let index = &table.indexes[0];
        assert_eq!(
            dialect().render_index_create(&table, index)[0].sql,
            "ALTER TABLE `user` ADD UNIQUE KEY `ix_user_email` (`email`)"
        );
        assert_eq!(
            dialect().render_index_drop(&table, index)[0].sql,
            "ALTER TABLE `user` DROP INDEX `ix_user_email`"
        );
    }

    #[test]
    fn test_override_keeps_indexes_and_disables_checks() {
        let source = users();
        let mut target = users();
        target.columns[1].nullable = true;
        let statements = dialect().render_override(&source, &target);
        assert_eq!(statements[0].sql, "SET FOREIGN_KEY_CHECKS = 0");
        assert_eq!(
            statements[1].sql,
            "DROP TABLE IF EXISTS `_keel_rebuild_user`"
        );
        assert!(statements[2]
            .sql
            .starts_with("CREATE TABLE `_keel_rebuild_user`"));
        assert!(statements[2].sql.contains("UNIQUE KEY `ix_user_email`"));
        assert_eq!(
            statements[5].sql,
            "RENAME TABLE `_keel_rebuild_user` TO `user`"
        );
        assert_eq!(statements.last().unwrap().sql, "SET FOREIGN_KEY_CHECKS = 1");
    }

    #[test]
    fn test_consecutive_overrides_reuse_constraint_names() {
        let mut target = users();
        target.columns[1].nullable = true;

        // The live table holds the constraint the previous rebuild added.
        let mut rebuilt = target.clone();
        rebuilt.columns[2].foreign_key.as_mut().unwrap().constraint =
            Some("fk_user_company_id_company_id".into());

        for source in [users(), rebuilt] {
            let sql: Vec<String> = dialect()
                .render_override(&source, &target)
                .into_iter()
                .map(|s| s.sql)
                .collect();
            let create = sql
                .iter()
                .find(|s| s.starts_with("CREATE TABLE"))
                .unwrap();
            assert!(!create.contains("CONSTRAINT"));
            assert_eq!(
                sql[sql.len() - 2],
                "ALTER TABLE `user` ADD CONSTRAINT `fk_user_company_id_company_id` \
                 FOREIGN KEY (`company_id`) REFERENCES `company` (`id`) ON DELETE CASCADE"
            );
            assert_eq!(sql[sql.len() - 3], "RENAME TABLE `_keel_rebuild_user` TO `user`");
        }
    }

    #[test]
    fn test_recovery_restores_checks() {
        let statements = dialect().override_recovery();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "SET FOREIGN_KEY_CHECKS = 1");
    }

    #[test]
    fn test_unsigned_types() {
        assert_eq!(dialect().map_type(FieldType::UInt32), Some("int unsigned"));
        assert_eq!(dialect().map_type(FieldType::Bool), Some("tinyint"));
    }
}
