//! Fluent select builder.

use keel_core::{Condition, Entity, QueryModifier};
use keel_migrate::Driver;

use crate::error::{OrmError, Result};
use crate::repository::Repository;

/// Collects query modifiers for one select.
///
/// Created by [`Repository::select`]. Modifiers apply in the order they
/// were added, after the repository's base modifiers.
#[must_use = "a selector does nothing until `all`, `one` or `optional` is awaited"]
pub struct Selector<'r, E: Entity, D: Driver> {
    repository: &'r Repository<E, D>,
    modifiers: Vec<QueryModifier>,
}

impl<'r, E: Entity, D: Driver> Selector<'r, E, D> {
    pub(crate) const fn new(repository: &'r Repository<E, D>) -> Self {
        Self {
            repository,
            modifiers: Vec::new(),
        }
    }

    /// Adds a predicate, AND-combined with the existing ones.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.modifiers.push(QueryModifier::additional_where(condition));
        self
    }

    /// Sets LIMIT and OFFSET.
    pub fn limit(mut self, count: u64, offset: u64) -> Self {
        self.modifiers.push(QueryModifier::limit(count, offset));
        self
    }

    /// Adds an arbitrary modifier.
    pub fn modify(mut self, modifier: QueryModifier) -> Self {
        self.modifiers.push(modifier);
        self
    }

    /// Every matching row.
    ///
    /// # Errors
    ///
    /// Returns statement, backend or decoding errors.
    pub async fn all(self) -> Result<Vec<E>> {
        self.repository.select_multiple(self.modifiers).await
    }

    /// The first matching row.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NoRows`] if nothing matches.
    pub async fn one(self) -> Result<E> {
        self.repository.select_single(self.modifiers).await
    }

    /// The first matching row, if any.
    ///
    /// # Errors
    ///
    /// Returns statement, backend or decoding errors.
    pub async fn optional(self) -> Result<Option<E>> {
        match self.one().await {
            Ok(entity) => Ok(Some(entity)),
            Err(OrmError::NoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
