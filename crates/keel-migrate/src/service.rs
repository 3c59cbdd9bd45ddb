//! Database service: a pool, a driver and the statement pipeline.
//!
//! Every statement goes through the same steps: bind named parameters into
//! the dialect's placeholder style, call the pre-run hooks, log it, then run
//! it under the optional statement timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keel_core::{prepare, Dialect, EntitySchema, Field, Prepared, Record, Statement, Table, Value};
use sqlx::pool::PoolConnection;
use sqlx::Pool;
use tracing::debug;

use crate::config::PoolConfig;
use crate::driver::{Connection, Driver, ExecOutcome};
use crate::error::{Error, MigrationFailure, Result};
use crate::executor::Migration;

/// Observer called with the final SQL and its arguments before execution.
pub type Hook = Arc<dyn Fn(&str, &[Value]) + Send + Sync>;

/// Entry point for running statements against one backend.
pub struct Service<D: Driver> {
    pool: Pool<D::Database>,
    driver: D,
    hooks: Vec<Hook>,
    statement_timeout: Option<Duration>,
}

impl<D: Driver> Clone for Service<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            driver: self.driver.clone(),
            hooks: self.hooks.clone(),
            statement_timeout: self.statement_timeout,
        }
    }
}

impl<D: Driver> std::fmt::Debug for Service<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("dialect", &self.dialect().name())
            .field("hooks", &self.hooks.len())
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Service<D> {
    /// Wraps an existing pool.
    pub fn new(pool: Pool<D::Database>) -> Self {
        Self {
            pool,
            driver: D::default(),
            hooks: Vec::new(),
            statement_timeout: None,
        }
    }

    /// Opens a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns the driver's connection error.
    pub async fn connect(config: &D::Config, pool: &PoolConfig) -> Result<Self> {
        let mut service = Self::new(D::connect(config, pool).await?);
        service.statement_timeout = pool.statement_timeout();
        Ok(service)
    }

    /// Registers a hook observing every statement.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(&str, &[Value]) + Send + Sync + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Sets the per-statement timeout.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// The underlying pool.
    pub const fn pool(&self) -> &Pool<D::Database> {
        &self.pool
    }

    /// The backend dialect.
    pub fn dialect(&self) -> &D::Dialect {
        self.driver.dialect()
    }

    /// Takes a connection out of the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection becomes available in time.
    pub async fn acquire(&self) -> Result<PoolConnection<D::Database>> {
        Ok(self.pool.acquire().await?)
    }

    async fn bounded<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        match self.statement_timeout {
            Some(limit) => tokio::time::timeout(limit, future)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => future.await,
        }
    }

    fn prepare(&self, statement: &Statement) -> Result<Prepared> {
        let prepared = prepare(statement, self.dialect().uses_numbered_placeholders())?;
        for hook in &self.hooks {
            hook(&prepared.sql, &prepared.args);
        }
        debug!(sql = %prepared.sql, args = ?prepared.args, "Executing statement");
        Ok(prepared)
    }

    /// Runs a write statement on a given connection.
    ///
    /// # Errors
    ///
    /// Returns binder, timeout or backend errors.
    pub async fn execute_on(
        &self,
        conn: &mut Connection<D>,
        statement: &Statement,
    ) -> Result<ExecOutcome> {
        let prepared = self.prepare(statement)?;
        self.bounded(self.driver.execute(conn, &prepared)).await
    }

    /// Runs a query on a given connection.
    ///
    /// # Errors
    ///
    /// Returns binder, timeout, decoding or backend errors.
    pub async fn fetch_on(
        &self,
        conn: &mut Connection<D>,
        statement: &Statement,
        fields: &[Field],
    ) -> Result<Vec<Record>> {
        let prepared = self.prepare(statement)?;
        self.bounded(self.driver.fetch(conn, &prepared, fields)).await
    }

    /// Reads a table's shape on a given connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableNotFound`] if the table does not exist.
    pub async fn introspect_on(&self, conn: &mut Connection<D>, name: &str) -> Result<Table> {
        self.bounded(self.driver.introspect_table(conn, name)).await
    }

    /// Runs a write statement.
    ///
    /// # Errors
    ///
    /// Returns binder, timeout or backend errors.
    pub async fn execute(&self, statement: &Statement) -> Result<ExecOutcome> {
        let mut conn = self.acquire().await?;
        self.execute_on(&mut conn, statement).await
    }

    /// Runs a query, decoding column `i` of each row with `fields[i]`.
    ///
    /// # Errors
    ///
    /// Returns binder, timeout, decoding or backend errors.
    pub async fn fetch(&self, statement: &Statement, fields: &[Field]) -> Result<Vec<Record>> {
        let mut conn = self.acquire().await?;
        self.fetch_on(&mut conn, statement, fields).await
    }

    /// Reads a table's shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TableNotFound`] if the table does not exist.
    pub async fn introspect(&self, name: &str) -> Result<Table> {
        let mut conn = self.acquire().await?;
        self.introspect_on(&mut conn, name).await
    }

    /// Reconciles the database with `schemas` and returns the number of
    /// statements executed.
    ///
    /// # Errors
    ///
    /// Returns how many statements completed before the first failure.
    pub async fn auto_migrate(
        &self,
        schemas: &[EntitySchema],
    ) -> std::result::Result<usize, MigrationFailure> {
        Migration::new()
            .entities(schemas.iter().cloned())
            .run(self)
            .await
    }

    /// Statements [`auto_migrate`](Self::auto_migrate) would run, without
    /// running them.
    ///
    /// # Errors
    ///
    /// Returns introspection or mapping errors.
    pub async fn plan(&self, schemas: &[EntitySchema]) -> Result<Vec<Statement>> {
        let plan = Migration::new()
            .entities(schemas.iter().cloned())
            .plan(self)
            .await?;
        Ok(plan.into_statements())
    }
}
