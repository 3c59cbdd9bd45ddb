//! Migration executor.
//!
//! A [`Migration`] lists the entities to reconcile and the tables to retire.
//! Planning introspects every table, diffs it against its target and
//! collects the rendered statements in priority order; running executes
//! them one by one on a single connection and stops at the first failure.
//! When the plan rebuilds tables, a failure is followed by the dialect's
//! recovery statements so the connection does not keep a rebuild's
//! transaction or relaxed foreign key checks.

use keel_core::{Dialect, EntitySchema, MigrationPlan, Table, TableOutcome};
use tracing::{debug, info, warn};

use crate::driver::{Connection, Driver};
use crate::error::{Error, MigrationFailure, Result};
use crate::service::Service;

/// Entities to reconcile and tables to retire.
#[derive(Debug, Clone, Default)]
pub struct Migration {
    entities: Vec<EntitySchema>,
    retired: Vec<String>,
}

impl Migration {
    /// Creates an empty migration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity to reconcile.
    #[must_use]
    pub fn entity(mut self, schema: EntitySchema) -> Self {
        self.entities.push(schema);
        self
    }

    /// Adds entities to reconcile, in order.
    #[must_use]
    pub fn entities(mut self, schemas: impl IntoIterator<Item = EntitySchema>) -> Self {
        self.entities.extend(schemas);
        self
    }

    /// Drops `name` if it still exists.
    #[must_use]
    pub fn retire_table(mut self, name: impl Into<String>) -> Self {
        self.retired.push(name.into());
        self
    }

    /// Computes the statements this migration would run.
    ///
    /// # Errors
    ///
    /// Returns introspection or type mapping errors.
    pub async fn plan<D: Driver>(&self, service: &Service<D>) -> Result<MigrationPlan> {
        let mut conn = service.acquire().await?;
        self.plan_on(service, &mut conn).await
    }

    /// Plans and executes the migration.
    ///
    /// Returns the number of executed statements.
    ///
    /// # Errors
    ///
    /// Returns a [`MigrationFailure`] carrying how many statements
    /// completed before the error.
    pub async fn run<D: Driver>(
        &self,
        service: &Service<D>,
    ) -> std::result::Result<usize, MigrationFailure> {
        let mut conn = service
            .acquire()
            .await
            .map_err(MigrationFailure::before_start)?;
        let plan = self
            .plan_on(service, &mut conn)
            .await
            .map_err(MigrationFailure::before_start)?;
        let recovery = if plan.rebuilds_tables() {
            service.dialect().override_recovery()
        } else {
            Vec::new()
        };
        let statements = plan.into_statements();

        for (completed, statement) in statements.iter().enumerate() {
            if let Err(error) = service.execute_on(&mut conn, statement).await {
                warn!(completed, sql = %statement.sql, %error, "Migration failed");
                for statement in &recovery {
                    if let Err(error) = service.execute_on(&mut conn, statement).await {
                        debug!(sql = %statement.sql, %error, "Recovery statement failed");
                    }
                }
                return Err(MigrationFailure { completed, error });
            }
        }

        info!(statements = statements.len(), "Migration complete");
        Ok(statements.len())
    }

    async fn plan_on<D: Driver>(
        &self,
        service: &Service<D>,
        conn: &mut Connection<D>,
    ) -> Result<MigrationPlan> {
        let dialect = service.dialect();
        let mut plan = MigrationPlan::new();

        for schema in &self.entities {
            let target = schema.to_table(dialect)?;
            let source = lookup(service, conn, &schema.name).await?;
            let outcome = plan.add_table(dialect, source.as_ref(), &target);
            match outcome {
                TableOutcome::Rebuilt => {
                    warn!(table = %schema.name, "Alteration not expressible, rebuilding table");
                }
                TableOutcome::Unchanged => debug!(table = %schema.name, "Table up to date"),
                _ => info!(table = %schema.name, ?outcome, "Table planned"),
            }
        }

        for name in &self.retired {
            if let Some(table) = lookup(service, conn, name).await? {
                info!(table = %table.name, "Retiring table");
                plan.drop_table(dialect, &table);
            }
        }

        Ok(plan)
    }
}

/// Introspects `name`, mapping a missing table to `None`.
async fn lookup<D: Driver>(
    service: &Service<D>,
    conn: &mut Connection<D>,
    name: &str,
) -> Result<Option<Table>> {
    match service.introspect_on(conn, name).await {
        Ok(table) => Ok(Some(table)),
        Err(Error::TableNotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_builder() {
        let migration = Migration::new()
            .entity(EntitySchema::new("user"))
            .retire_table("legacy");
        assert_eq!(migration.entities.len(), 1);
        assert_eq!(migration.retired, vec!["legacy".to_string()]);
    }
}
