//! SQLite driver.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use keel_core::{
    Field, FieldType, ForeignKey, Prepared, Record, SqliteDialect, Table, TableColumn,
    TableIndex, Value,
};
use regex::Regex;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Arguments, Pool, Row, Sqlite, ValueRef};
use tracing::debug;

use super::{nested_list, Driver, ExecOutcome};
use crate::config::{PoolConfig, SqliteConfig};
use crate::error::{Error, Result};

/// A column definition carrying `PRIMARY KEY AUTOINCREMENT`; captures the
/// column name.
static AUTOINCREMENT_COLUMN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)[(,]\s*("(?:[^"]|"")+"|`[^`]+`|\[[^\]]+\]|\w+)\s+[^,]*?\bPRIMARY\s+KEY\s+(?:(?:ASC|DESC)\s+)?(?:ON\s+CONFLICT\s+\w+\s+)?AUTOINCREMENT\b"#,
    )
    .expect("Invalid autoincrement regex")
});

/// Whether `column` is declared `PRIMARY KEY AUTOINCREMENT` in `create_sql`.
fn declares_autoincrement(create_sql: &str, column: &str) -> bool {
    AUTOINCREMENT_COLUMN
        .captures_iter(create_sql)
        .filter_map(|captures| captures.get(1))
        .any(|name| unquote(name.as_str()).eq_ignore_ascii_case(column))
}

fn unquote(name: &str) -> String {
    match name.chars().next() {
        Some('"') => name[1..name.len() - 1].replace("\"\"", "\""),
        Some('`' | '[') => name[1..name.len() - 1].to_string(),
        _ => name.to_string(),
    }
}

/// Driver for SQLite files and in-memory databases.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDriver {
    dialect: SqliteDialect,
}

impl SqliteDriver {
    /// Creates a new SQLite driver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dialect: SqliteDialect::new(),
        }
    }
}

fn arguments(values: &[Value]) -> Result<SqliteArguments<'static>> {
    let mut args = SqliteArguments::default();
    for value in values {
        bind(&mut args, value).map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

fn bind(args: &mut SqliteArguments<'static>, value: &Value) -> std::result::Result<(), BoxDynError> {
    match value {
        Value::Null => args.add(Option::<i64>::None),
        Value::Bool(b) => args.add(*b),
        Value::Int(n) => args.add(*n),
        Value::UInt(n) => args.add(i64::try_from(*n)?),
        Value::Float(f) => args.add(*f),
        Value::Text(s) => args.add(s.clone()),
        Value::Timestamp(ts) => args.add(*ts),
        Value::Bytes(b) => args.add(b.clone()),
        Value::Json(json) => args.add(json.to_string()),
        Value::List(_) => Err(nested_list().into()),
    }
}

fn decode(row: &SqliteRow, index: usize, field: &Field) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    Ok(match field.field_type {
        FieldType::Bool => Value::Bool(row.try_get::<i64, _>(index)? != 0),
        FieldType::Int8
        | FieldType::Int16
        | FieldType::Int32
        | FieldType::Int64
        | FieldType::UInt8
        | FieldType::UInt16
        | FieldType::UInt32
        | FieldType::UInt64 => Value::Int(row.try_get(index)?),
        FieldType::Float32 | FieldType::Float64 => Value::Float(row.try_get(index)?),
        FieldType::Text | FieldType::Json => Value::Text(row.try_get(index)?),
        FieldType::Timestamp => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index)?),
        FieldType::Bytes => Value::Bytes(row.try_get(index)?),
    })
}

impl Driver for SqliteDriver {
    type Database = Sqlite;
    type Dialect = SqliteDialect;
    type Config = SqliteConfig;

    fn dialect(&self) -> &SqliteDialect {
        &self.dialect
    }

    async fn connect(config: &SqliteConfig, pool: &PoolConfig) -> Result<Pool<Sqlite>> {
        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(pool.acquire_timeout());

        let options = if config.is_memory() {
            // Every connection would open its own empty database.
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            pool_options = pool_options.max_connections(pool.max_connections);
            SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
        };

        debug!(path = %config.path, "Opening SQLite pool");
        Ok(pool_options
            .connect_with(options.foreign_keys(true))
            .await?)
    }

    async fn introspect_table(&self, conn: &mut SqliteConnection, name: &str) -> Result<Table> {
        let create_sql: Option<(String,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await?;
        let Some((create_sql,)) = create_sql else {
            return Err(Error::TableNotFound(name.to_string()));
        };
        let mut table = Table::new(name);

        let columns: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_xinfo(?)
               WHERE hidden = 0 ORDER BY cid"#,
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;

        for (column_name, column_type, not_null, default, pk) in columns {
            let primary_key = pk > 0;
            let nullable = not_null == 0 && !primary_key;
            let auto_increment = primary_key && declares_autoincrement(&create_sql, &column_name);
            let mut column = TableColumn::new(column_name, column_type);
            column.nullable = nullable;
            column.default = match default {
                Some(default) => Some(default),
                None if nullable => Some("NULL".to_string()),
                None => None,
            };
            column.primary_key = primary_key;
            column.auto_increment = auto_increment;
            table.push_column(column);
        }

        let foreign_keys: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"SELECT "from", "table", "to" FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;

        for (from, ref_table, ref_column) in foreign_keys {
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == from) {
                let ref_column = ref_column.unwrap_or_else(|| "id".to_string());
                column.foreign_key = Some(ForeignKey::new(ref_table, ref_column));
            }
        }

        let indexes: Vec<(String, i64)> = sqlx::query_as(
            r#"SELECT name, "unique" FROM pragma_index_list(?)
               WHERE origin = 'c' AND name NOT LIKE 'sqlite_autoindex_%' ORDER BY name"#,
        )
        .bind(name)
        .fetch_all(&mut *conn)
        .await?;

        for (index_name, unique) in indexes {
            let columns: Vec<(String,)> =
                sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                    .bind(&index_name)
                    .fetch_all(&mut *conn)
                    .await?;
            let mut index = TableIndex::new(index_name, columns.into_iter().map(|(c,)| c));
            index.unique = unique != 0;
            table.push_index(index);
        }

        Ok(table)
    }

    async fn execute(&self, conn: &mut SqliteConnection, prepared: &Prepared) -> Result<ExecOutcome> {
        let args = arguments(&prepared.args)?;
        let result = sqlx::query_with(&prepared.sql, args)
            .execute(&mut *conn)
            .await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn fetch(
        &self,
        conn: &mut SqliteConnection,
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
