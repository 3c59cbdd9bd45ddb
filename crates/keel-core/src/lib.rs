//! # keel-core
//!
//! The pure half of keel's auto-migration engine: no connections, no I/O.
//!
//! This crate provides:
//! - [`EntitySchema`] and [`Entity`], the declarative description of a
//!   record shape and its table
//! - [`Table`], the physical schema compared during migration
//! - [`Dialect`] with SQLite, MySQL and PostgreSQL implementations that
//!   map types and render DDL and DML
//! - [`diff`](diff::diff), the schema differ, and [`MigrationPlan`], which
//!   orders rendered statements
//! - [`Statement`] and [`prepare`], the named-parameter binder
//! - [`Query`], [`Condition`] and [`QueryModifier`] for selects
//!
//! ## Example
//!
//! ```
//! use keel_core::prelude::*;
//!
//! let schema = EntitySchema::new("user")
//!     .field(Field::of::<i64>("id").primary_key().auto_increment())
//!     .field(Field::of::<String>("email"))
//!     .field(Field::of::<Option<String>>("nickname"))
//!     .index(TableIndex::new("ix_user_email", ["email"]).unique());
//!
//! let dialect = SqliteDialect::new();
//! let target = schema.to_table(&dialect).unwrap();
//!
//! let mut plan = MigrationPlan::new();
//! plan.add_table(&dialect, None, &target);
//! assert_eq!(plan.len(), 2);
//! ```

pub mod dialect;
pub mod diff;
pub mod entity;
pub mod error;
pub mod plan;
pub mod query;
pub mod schema;
pub mod statement;
pub mod value;

pub use dialect::{Dialect, MySqlDialect, PostgresDialect, Rendered, SqliteDialect};
pub use diff::{diff, TableDiff};
pub use entity::{Entity, EntitySchema, Field, FieldKind, FieldType, Record};
pub use error::{CoreError, Result};
pub use plan::{MigrationPlan, TableOutcome};
pub use query::{Column, CompareOp, Condition, Limit, Query, QueryModifier};
pub use schema::{ForeignKey, Table, TableColumn, TableIndex};
pub use statement::{prepare, Prepared, Statement};
pub use value::{FromValue, ToValue, Value};

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::dialect::{Dialect, MySqlDialect, PostgresDialect, Rendered, SqliteDialect};
    pub use crate::entity::{Entity, EntitySchema, Field, FieldKind, FieldType, Record};
    pub use crate::error::{CoreError, Result};
    pub use crate::plan::{MigrationPlan, TableOutcome};
    pub use crate::query::{Column, Condition, QueryModifier};
    pub use crate::schema::{ForeignKey, Table, TableColumn, TableIndex};
    pub use crate::statement::{prepare, Statement};
    pub use crate::value::{FromValue, ToValue, Value};
}
