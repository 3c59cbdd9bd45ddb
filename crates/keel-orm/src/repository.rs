//! Typed repository.
//!
//! A [`Repository`] binds one entity type to a service. Every select starts
//! from the entity's base query (all declared columns of its table), applies
//! the repository's base modifiers and then the caller's modifiers.

use std::marker::PhantomData;
use std::sync::Arc;

use keel_core::{
    Column, CoreError, Dialect, Entity, EntitySchema, Field, Query, QueryModifier, Record,
    ToValue, Value,
};
use keel_migrate::{Driver, Service};
use tracing::debug;

use crate::error::{OrmError, Result};
use crate::selector::Selector;

type BaseModifier = Arc<dyn Fn(Query) -> Query + Send + Sync>;

/// CRUD access to the table of `E`.
///
/// # Example
///
/// ```ignore
/// use keel_orm::prelude::*;
///
/// let users = Repository::<User, SqliteDriver>::new(service.clone());
/// let id = users.insert(&user).await?;
///
/// let email = users.column::<String>("email")?;
/// let found = users
///     .select_single([QueryModifier::additional_where(email.eq("ada@example.com"))])
///     .await?;
/// ```
pub struct Repository<E: Entity, D: Driver> {
    service: Service<D>,
    schema: EntitySchema,
    base_modifiers: Vec<BaseModifier>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, D: Driver> Clone for Repository<E, D> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            schema: self.schema.clone(),
            base_modifiers: self.base_modifiers.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity, D: Driver> std::fmt::Debug for Repository<E, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.schema.name)
            .field("base_modifiers", &self.base_modifiers.len())
            .finish_non_exhaustive()
    }
}

impl<E: Entity, D: Driver> Repository<E, D> {
    /// Creates a repository for `E`.
    pub fn new(service: Service<D>) -> Self {
        Self {
            service,
            schema: E::schema(),
            base_modifiers: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Adds a modifier applied to every select before the caller's
    /// modifiers, e.g. to scope rows to a tenant.
    #[must_use]
    pub fn with_base_modifier(mut self, f: impl Fn(Query) -> Query + Send + Sync + 'static) -> Self {
        self.base_modifiers.push(Arc::new(f));
        self
    }

    /// The entity's schema.
    pub const fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    /// The service this repository runs on.
    pub const fn service(&self) -> &Service<D> {
        &self.service
    }

    /// Typed handle for a declared column.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] if `E` does not declare `name`.
    pub fn column<V: ToValue>(&self, name: &str) -> Result<Column<E, V>> {
        self.schema
            .get_field(name)
            .map(|field| Column::new(field.column.clone()))
            .ok_or_else(|| CoreError::UnknownColumn(name.to_string()).into())
    }

    /// Starts a fluent select.
    pub fn select(&self) -> Selector<'_, E, D> {
        Selector::new(self)
    }

    /// Selecting every declared column of the entity's table, with the base
    /// modifiers applied.
    pub fn base_query(&self) -> Query {
        let columns = self.schema.fields.iter().map(|f| f.column.clone());
        let query = Query::new(self.schema.name.clone(), columns);
        self.base_modifiers
            .iter()
            .fold(query, |query, modifier| modifier(query))
    }

    fn fields_for(&self, query: &Query) -> Result<Vec<Field>> {
        query
            .columns
            .iter()
            .map(|column| {
                self.schema
                    .get_field(column)
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownColumn(column.clone()).into())
            })
            .collect()
    }

    async fn run_select(&self, query: Query) -> Result<Vec<E>> {
        let fields = self.fields_for(&query)?;
        let statement = self.service.dialect().render_select(&query);
        let records = self.service.fetch(&statement, &fields).await?;
        debug!(table = %self.schema.name, rows = records.len(), "Selected rows");
        records
            .iter()
            .map(|record| E::from_record(record).map_err(OrmError::from))
            .collect()
    }

    /// Selects every row matching the modifiers.
    ///
    /// # Errors
    ///
    /// Returns statement, backend or decoding errors.
    pub async fn select_multiple(
        &self,
        modifiers: impl IntoIterator<Item = QueryModifier>,
    ) -> Result<Vec<E>> {
        let query = modifiers
            .into_iter()
            .fold(self.base_query(), |query, modifier| modifier.apply(query));
        self.run_select(query).await
    }

    /// Selects the first row matching the modifiers.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoRows`] if nothing matches.
    pub async fn select_single(
        &self,
        modifiers: impl IntoIterator<Item = QueryModifier>,
    ) -> Result<E> {
        let mut query = modifiers
            .into_iter()
            .fold(self.base_query(), |query, modifier| modifier.apply(query));
        if query.limit.is_none() {
            query = query.with_limit(1, 0);
        }
        self.run_select(query)
            .await?
            .into_iter()
            .next()
            .ok_or(OrmError::NoRows)
    }

    /// Inserts `entity` and returns its identifier.
    ///
    /// Auto-increment keys come back from the backend (last insert id or a
    /// `RETURNING` clause). Otherwise, or when the backend yields no id or
    /// zero, the entity's own key is returned.
    ///
    /// # Errors
    ///
    /// Returns statement, backend or conversion errors.
    pub async fn insert(&self, entity: &E) -> Result<E::Id> {
        let record = entity.to_record()?;
        let dialect = self.service.dialect();
        let pk = self
            .schema
            .primary_key()
            .ok_or_else(|| CoreError::MissingPrimaryKey(self.schema.name.clone()))?;
        let statement = dialect.render_insert(&self.schema, &record);

        let generated = if dialect.returning_clause(&self.schema).is_some() {
            let rows = self
                .service
                .fetch(&statement, std::slice::from_ref(pk))
                .await?;
            rows.into_iter()
                .next()
                .and_then(|row| row.value(&pk.column).cloned())
        } else {
            let outcome = self.service.execute(&statement).await?;
            outcome
                .last_insert_id
                .filter(|_| dialect.uses_last_insert_id())
                .map(Value::Int)
        };

        let id = match generated {
            Some(value) if pk.auto_increment && !is_zero(&value) => value,
            _ => record.value(&pk.column).cloned().unwrap_or(Value::Null),
        };
        debug!(table = %self.schema.name, id = ?id, "Inserted row");
        Ok(Record::new().set(pk.column.clone(), id).get(&pk.column)?)
    }

    /// Updates the row keyed by `entity`'s primary key; returns the number
    /// of changed rows.
    ///
    /// # Errors
    ///
    /// Returns statement, backend or conversion errors.
    pub async fn update(&self, entity: &E) -> Result<u64> {
        let record = entity.to_record()?;
        let statement = self.service.dialect().render_update(&self.schema, &record)?;
        Ok(self.service.execute(&statement).await?.rows_affected)
    }

    /// Deletes the row keyed by `entity`'s primary key; returns the number
    /// of deleted rows.
    ///
    /// # Errors
    ///
    /// Returns statement or backend errors.
    pub async fn delete(&self, entity: &E) -> Result<u64> {
        let record = entity.to_record()?;
        let statement = self.service.dialect().render_delete(&self.schema, &record)?;
        Ok(self.service.execute(&statement).await?.rows_affected)
    }
}

fn is_zero(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Int(0) | Value::UInt(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero() {
        assert!(is_zero(&Value::Null));
        assert!(is_zero(&Value::Int(0)));
        assert!(!is_zero(&Value::Int(4)));
        assert!(!is_zero(&Value::Text("0".into())));
    }
}
