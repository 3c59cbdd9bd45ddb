//! PostgreSQL driver.

use std::sync::LazyLock;

use chrono::NaiveDateTime;
use keel_core::{
    Field, FieldType, ForeignKey, PostgresDialect, Prepared, Record, Table, TableColumn,
    TableIndex, Value,
};
use regex::Regex;
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Arguments, Pool, Postgres, Row, ValueRef};
use tracing::debug;

use super::{nested_list, Driver, ExecOutcome};
use crate::config::{PoolConfig, PostgresConfig};
use crate::error::{Error, Result};

static TYPED_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^('(?:[^']|'')*'|NULL)::[\w ]+$").expect("Invalid typed literal regex")
});

const COLUMNS_SQL: &str = r"
    SELECT c.column_name::text, c.data_type::text, c.is_nullable::text,
           c.column_default::text, c.identity_generation::text,
           COALESCE(col_description(a.attrelid, a.attnum), '')
    FROM information_schema.columns c
    JOIN pg_attribute a
      ON a.attrelid = quote_ident($1)::regclass AND a.attname = c.column_name
    WHERE c.table_schema = current_schema() AND c.table_name = $1
    ORDER BY c.ordinal_position";

const PRIMARY_KEY_SQL: &str = r"
    SELECT a.attname::text
    FROM pg_index i
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = quote_ident($1)::regclass AND i.indisprimary";

const FOREIGN_KEYS_SQL: &str = r"
    SELECT con.conname::text, a.attname::text, ref.relname::text, ra.attname::text
    FROM pg_constraint con
    JOIN pg_class ref ON ref.oid = con.confrelid
    JOIN pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = con.conkey[1]
    JOIN pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = con.confkey[1]
    WHERE con.contype = 'f' AND con.conrelid = quote_ident($1)::regclass";

const INDEXES_SQL: &str = r"
    SELECT ic.relname::text, i.indisunique,
           STRING_AGG(a.attname::text, ',' ORDER BY array_position(i.indkey::int2[], a.attnum))
    FROM pg_index i
    JOIN pg_class ic ON ic.oid = i.indexrelid
    JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
    WHERE i.indrelid = quote_ident($1)::regclass
      AND NOT i.indisprimary AND ic.relname NOT LIKE '%\_pkey'
    GROUP BY ic.relname, i.indisunique
    ORDER BY ic.relname";

/// Driver for PostgreSQL servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver {
    dialect: PostgresDialect,
}

impl PostgresDriver {
    /// Creates a new PostgreSQL driver.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dialect: PostgresDialect::new(),
        }
    }
}

/// Strips the type annotation Postgres stores on literal defaults
/// (`'draft'::text`, `NULL::character varying`).
fn normalize_default(raw: Option<String>, nullable: bool) -> Option<String> {
    let Some(raw) = raw else {
        return nullable.then(|| "NULL".to_string());
    };
    match TYPED_LITERAL.captures(&raw) {
        Some(captures) => Some(captures[1].to_string()),
        None => Some(raw),
    }
}

fn arguments(values: &[Value]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for value in values {
        bind(&mut args, value).map_err(sqlx::Error::Encode)?;
    }
    Ok(args)
}

fn bind(args: &mut PgArguments, value: &Value) -> std::result::Result<(), BoxDynError> {
    match value {
        // Untyped; writes go through CAST(.. AS native) placeholders.
        Value::Null => args.add(Option::<String>::None),
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

fn decode(row: &PgRow, index: usize, field: &Field) -> Result<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    Ok(match field.field_type {
        FieldType::Bool => Value::Bool(row.try_get(index)?),
        FieldType::Int8 | FieldType::Int16 | FieldType::UInt8 => {
            Value::Int(row.try_get::<i16, _>(index)?.into())
        }
        FieldType::Int32 | FieldType::UInt16 => Value::Int(row.try_get::<i32, _>(index)?.into()),
        FieldType::Int64 | FieldType::UInt32 | FieldType::UInt64 => {
            Value::Int(row.try_get(index)?)
        }
        FieldType::Float32 => Value::Float(row.try_get::<f32, _>(index)?.into()),
        FieldType::Float64 => Value::Float(row.try_get(index)?),
        FieldType::Text => Value::Text(row.try_get(index)?),
        FieldType::Timestamp => Value::Timestamp(row.try_get::<NaiveDateTime, _>(index)?),
        FieldType::Bytes => Value::Bytes(row.try_get(index)?),
        FieldType::Json => Value::Json(row.try_get::<Json<serde_json::Value>, _>(index)?.0),
    })
}

impl Driver for PostgresDriver {
    type Database = Postgres;
    type Dialect = PostgresDialect;
    type Config = PostgresConfig;

    fn dialect(&self) -> &PostgresDialect {
        &self.dialect
    }

    async fn connect(config: &PostgresConfig, pool: &PoolConfig) -> Result<Pool<Postgres>> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.pass)
            .database(&config.name);

        debug!(host = %config.host, port = config.port, name = %config.name, "Opening PostgreSQL pool");
        Ok(PgPoolOptions::new()
            .max_connections(pool.max_connections)
            .acquire_timeout(pool.acquire_timeout())
            .connect_with(options)
            .await?)
    }

    async fn introspect_table(&self, conn: &mut PgConnection, name: &str) -> Result<Table> {
        let comment: Option<(String,)> = sqlx::query_as(
            "SELECT COALESCE(obj_description(c.oid, 'pg_class'), '')
             FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = current_schema() AND c.relname = $1 AND c.relkind = 'r'",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;
        let Some((comment,)) = comment else {
            return Err(Error::TableNotFound(name.to_string()));
        };

        let mut table = Table::new(name).comment(comment);

        let primary_keys: Vec<(String,)> = sqlx::query_as(PRIMARY_KEY_SQL)
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        let columns: Vec<(String, String, String, Option<String>, Option<String>, String)> =
            sqlx::query_as(COLUMNS_SQL)
                .bind(name)
                .fetch_all(&mut *conn)
                .await?;

        for (column_name, data_type, is_nullable, default, identity, comment) in columns {
            let primary_key = primary_keys.iter().any(|(pk,)| *pk == column_name);
            let nullable = is_nullable == "YES" && !primary_key;
            let mut column = TableColumn::new(column_name, data_type);
            column.nullable = nullable;
            column.default = normalize_default(default, nullable);
            column.primary_key = primary_key;
            column.auto_increment = identity.as_deref() == Some("ALWAYS");
            column.comment = comment;
            table.push_column(column);
        }

        let foreign_keys: Vec<(String, String, String, String)> =
            sqlx::query_as(FOREIGN_KEYS_SQL)
                .bind(name)
                .fetch_all(&mut *conn)
                .await?;

        for (constraint, column_name, ref_table, ref_column) in foreign_keys {
            if let Some(column) = table.columns.iter_mut().find(|c| c.name == column_name) {
                let mut fk = ForeignKey::new(ref_table, ref_column);
                fk.constraint = Some(constraint);
                column.foreign_key = Some(fk);
            }
        }

        let indexes: Vec<(String, bool, String)> = sqlx::query_as(INDEXES_SQL)
            .bind(name)
            .fetch_all(&mut *conn)
            .await?;

        for (index_name, unique, columns) in indexes {
            let mut index = TableIndex::new(index_name, columns.split(','));
            index.unique = unique;
            table.push_index(index);
        }

        Ok(table)
    }

    async fn execute(&self, conn: &mut PgConnection, prepared: &Prepared) -> Result<ExecOutcome> {
        let args = arguments(&prepared.args)?;
        let result = sqlx::query_with(&prepared.sql, args)
            .execute(&mut *conn)
            .await?;
        Ok(ExecOutcome {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }

    async fn fetch(
        &self,
        conn: &mut PgConnection,
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
