//! Backend drivers.
//!
//! A driver owns the I/O half of a dialect: opening pools, reading system
//! catalogs back into [`Table`]s, binding prepared arguments and decoding
//! rows into [`Record`]s. Rendering stays in the driver's
//! [`Dialect`](keel_core::Dialect).
//!
//! Every method takes the connection explicitly so the executor can run a
//! whole migration on one session.

mod mysql;
mod postgres;
mod sqlite;

use std::future::Future;

use keel_core::{Dialect, Field, Prepared, Record, Table};
use sqlx::{Database, Pool};

use crate::config::PoolConfig;
use crate::error::Result;

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Identifier generated by the last insert, where the backend reports
    /// one.
    pub last_insert_id: Option<i64>,
}

/// Connection type of a driver's database.
pub type Connection<D> = <<D as Driver>::Database as Database>::Connection;

/// I/O operations against one backend family.
pub trait Driver: Clone + Default + Send + Sync + 'static {
    /// sqlx database this driver talks to.
    type Database: Database;

    /// Renderer for this backend.
    type Dialect: Dialect + Clone + Default + 'static;

    /// Connection settings.
    type Config: Send + Sync;

    /// Returns the dialect.
    fn dialect(&self) -> &Self::Dialect;

    /// Opens a pool.
    fn connect(
        config: &Self::Config,
        pool: &PoolConfig,
    ) -> impl Future<Output = Result<Pool<Self::Database>>> + Send;

    /// Reads the physical shape of `name`.
    ///
    /// Returns [`Error::TableNotFound`](crate::Error::TableNotFound) when
    /// the table does not exist.
    fn introspect_table(
        &self,
        conn: &mut Connection<Self>,
        name: &str,
    ) -> impl Future<Output = Result<Table>> + Send;

    /// Runs a write statement.
    fn execute(
        &self,
        conn: &mut Connection<Self>,
        prepared: &Prepared,
    ) -> impl Future<Output = Result<ExecOutcome>> + Send;

    /// Runs a query and decodes column `i` of every row using `fields[i]`.
    fn fetch(
        &self,
        conn: &mut Connection<Self>,
        prepared: &Prepared,
        fields: &[Field],
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Rejects argument shapes no backend can bind directly.
fn nested_list() -> sqlx::Error {
    sqlx::Error::Encode("nested list parameters cannot be bound".into())
}
