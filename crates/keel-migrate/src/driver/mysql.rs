//! MySQL driver.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use keel_core::dialect::quote_literal;
use keel_core::{
    Field, FieldType, ForeignKey, MySqlDialect, Prepared, Record, Table, TableColumn, TableIndex,
    Value,
};
use regex::Regex;
use sqlx::error::BoxDynError;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlPoolOptions, MySqlRow};
use sqlx::{Arguments, MySql, Pool, Row, ValueRef};
use tracing::debug;

use super::{nested_list, Driver, ExecOutcome};
use crate::config::{MySqlConfig, PoolConfig};
use crate::error::{Error, Result};

static DISPLAY_WIDTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\d+\)").expect("Invalid display width regex"));

/// Driver for MySQL and MariaDB servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDriver {
    dialect: MySqlDialect,
}

impl MySqlDriver {
    /// Creates a new MySQL driver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dialect: MySqlDialect::new(),
        }
    }
}

/// Drops integer display widths (`int(11)`) that older servers report.
/// `varchar(n)` keeps its length since it is part of the declared type.
fn normalize_type(column_type: &str) -> String {
    let lower = column_type.to_ascii_lowercase();
    if lower.starts_with("varchar") || lower.starts_with("char") {
        return lower;
    }
    DISPLAY_WIDTH.replace_all(&lower, "").into_owned()
}

/// Maps `COLUMN_DEFAULT` back to the expression a column definition uses.
fn normalize_default(raw: Option<String>, extra: &str, nullable: bool) -> Option<String> {
    let Some(raw) = raw else {
        return nullable.then(|| "NULL".to_string());
    };
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("current_timestamp") {
        return Some("CURRENT_TIMESTAMP".to_string());
    }
    if lower == "null" {
        return Some("NULL".to_string());
    }
    if extra.to_ascii_uppercase().contains("DEFAULT_GENERATED") || raw.parse::<f64>().is_ok() {
        return Some(raw);
    }
    Some(quote_literal(&raw))
}

fn arguments(values: &[Value]) -> Result<MySqlArguments> {
    let mut args = MySqlArguments::default();
    for value in values {
        bind(&mut args, value).map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

fn bind(args: &mut MySqlArguments, value: &Value) -> std::result::Result<(), BoxDynError> {
    match value {
        Value::Null => args.add(Option::<String>::None),
        Value::Bool(b) => args.add(*b),
        Value::Int(n) => args.add(*n),
        Value::UInt(n) => args.add(*n),
        Value::Float(f) => args.add(*f),
        Value::Text(s) => args.add(s.clone()),
        Value::Timestamp(ts) => args.add(*ts),
        Value::Bytes(b) => args.add(b.clone()),
        Value::Json(json) => args.add(json.to_string()),
        Value::List(_) => Err(nested_list().into()),
    }
}

fn decode(row: &MySqlRow, index: usize, field: &Field) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    Ok(match field.field_type {
        FieldType::Bool => Value::Bool(row.try_get::<i8, _>(index)? != 0),
        FieldType::Int8 => Value::Int(row.try_get::<i8, _>(index)?.into()),
        FieldType::Int16 => Value::Int(row.try_get::<i16, _>(index)?.into()),
        FieldType::Int32 => Value::Int(row.try_get::<i32, _>(index)?.into()),
        FieldType::Int64 => Value::Int(row.try_get(index)?),
        FieldType::UInt8 => Value::UInt(row.try_get::<u8, _>(index)?.into()),
        FieldType::UInt16 => Value::UInt(row.try_get::<u16, _>(index)?.into()),
        FieldType::UInt32 => Value::UInt(row.try_get::<u32, _>(index)?.into()),
        FieldType::UInt64 => Value::UInt(row.try_get(index)?),
        FieldType::Float32 => Value::Float(row.try_get::<f32, _>(index)?.into()),
        FieldType::Float64 => Value::Float(row.try_get(index)?),
        FieldType::Text | FieldType::Json => Value::Text(row.try_get(index)?),
        FieldType::Timestamp => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index)?),
        FieldType::Bytes => Value::Bytes(row.try_get(index)?),
    })
}

impl Driver for MySqlDriver {
    type Database = MySql;
    type Dialect = MySqlDialect;
    type Config = MySqlConfig;

    fn dialect(&self) -> &MySqlDialect {
        &self.dialect
    }

    async fn connect(config: &MySqlConfig, pool: &PoolConfig) -> Result<Pool<MySql>> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.pass)
            .database(&config.name);

        debug!(host = %config.host, port = config.port, name = %config.name, "Opening MySQL pool");
        Ok(MySqlPoolOptions::new()
            .max_connections(pool.max_connections)
            .acquire_timeout(pool.acquire_timeout())
            .connect_with(options)
            .await?)
    }

    async fn introspect_table(&self, conn: &mut MySqlConnection, name: &str) -> Result<Table> {
        let comment: Option<(String,)> = sqlx::query_as(
            "SELECT CAST(TABLE_COMMENT AS CHAR) FROM information_schema.TABLES
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        let Some((comment,)) = comment else {
            return Err(Error::TableNotFound(name.to_string()));
        };

        let mut table = Table::new(name).comment(comment);

        let columns: Vec<(String, String, String, Option<String>, String, String, String)> =
            sqlx::query_as(
                "SELECT CAST(COLUMN_NAME AS CHAR), CAST(COLUMN_TYPE AS CHAR),
                        CAST(IS_NULLABLE AS CHAR), CAST(COLUMN_DEFAULT AS CHAR),
                        CAST(COLUMN_KEY AS CHAR), CAST(EXTRA AS CHAR),
                        CAST(COLUMN_COMMENT AS CHAR)
                 FROM information_schema.COLUMNS
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                 ORDER BY ORDINAL_POSITION",
            )
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        for (column_name, column_type, is_nullable, default, key, extra, comment) in columns {
            let primary_key = key == "PRI";
            let nullable = is_nullable == "YES" && !primary_key;
            let mut column = TableColumn::new(column_name, normalize_type(&column_type));
            column.nullable = nullable;
            column.default = normalize_default(default, &extra, nullable);
            column.primary_key = primary_key;
            column.auto_increment = extra.to_ascii_lowercase().contains("auto_increment");
            column.comment = comment;
            table.push_column(column);
        }

        let foreign_keys: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT CAST(CONSTRAINT_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR),
                    CAST(REFERENCED_TABLE_NAME AS CHAR), CAST(REFERENCED_COLUMN_NAME AS CHAR)
             FROM information_schema.KEY_COLUMN_USAGE
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
               AND REFERENCED_TABLE_NAME IS NOT NULL",
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;

        let mut constraint_names = Vec::new();
        for (constraint, column_name, ref_table, ref_column) in foreign_keys {
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) {
                let mut fk = ForeignKey::new(ref_table, ref_column);
                fk.constraint = Some(constraint.clone());
                column.foreign_key = Some(fk);
            }
            constraint_names.push(constraint);
        }

        let index_rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT CAST(INDEX_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR),
                    CAST(NON_UNIQUE AS SIGNED)
             FROM information_schema.STATISTICS
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND INDEX_NAME <> 'PRIMARY'
             ORDER BY INDEX_NAME, SEQ_IN_INDEX",
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;

        let mut indexes: Vec<TableIndex> = Vec::new();
        for (index_name, column_name, non_unique) in index_rows {
            // Backing indexes created implicitly for foreign keys.
            if constraint_names.contains(&index_name) {
                continue;
            }
            match indexes.last_mut() {
                Some(index) if index.name == index_name => index.columns.push(column_name),
                _ => {
                    let mut index = TableIndex::new(index_name, [column_name]);
                    index.unique = non_unique == 0;
                    indexes.push(index);
                }
            }
        }
        for index in indexes {
            table.push_index(index);
        }

        Ok(table)
    }

    async fn execute(&self, conn: &mut MySqlConnection, prepared: &Prepared) -> Result<ExecOutcome> {
        let args = arguments(&prepared.args)?;
        let result = sqlx::query_with(&prepared.sql, args)
            .execute(&mut *conn)
            .await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }

    async fn fetch(
        &self,
        conn: &mut MySqlConnection,
        prepared: &Prepared,
        fields: &[Field],
    ) -> Result<Vec<Record>> {
        let args = arguments(&prepared.args)?;
        let rows = sqlx::query_with(&prepared.sql, args)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> Result<Record> {
                let mut record = Record::new();
                for (index, field) in fields.iter().enumerate() {
                    record.insert(field.column.clone(), decode(row, index, field)?);
                }
                Ok(record)
            })
            .collect()
    }
}
