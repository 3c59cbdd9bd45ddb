//! Schema-driven auto-migration for SQLite, MySQL and PostgreSQL.
//!
//! `keel-migrate` reconciles a live database with declared entities: it
//! introspects each table, diffs it against the entity's target table and
//! runs the rendered statements in a fixed priority order. Alterations a
//! backend cannot express fall back to a full table rebuild.
//!
//! # Architecture
//!
//! - **Drivers** - sqlx-backed introspection, argument binding and row
//!   decoding per backend
//! - **Service** - pool, driver, statement hooks and timeouts
//! - **Executor** - plans and runs a [`Migration`], reporting partial
//!   progress on failure
//! - **Config** - serde connection settings
//!
//! # Example
//!
//! ```rust,ignore
//! use keel_migrate::prelude::*;
//!
//! let service = Service::<SqliteDriver>::connect(
//!     &SqliteConfig::file("app.db"),
//!     &PoolConfig::default(),
//! )
//! .await?;
//!
//! let executed = Migration::new()
//!     .entity(User::schema())
//!     .entity(Session::schema())
//!     .retire_table("legacy_tokens")
//!     .run(&service)
//!     .await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the physical shape of tables
//! keel-migrate --path app.db inspect users sessions
//!
//! # Show the statements a migration would run
//! keel-migrate --path app.db plan --schema schema.json
//!
//! # Apply them
//! keel-migrate --driver postgres --host db --name app migrate --schema schema.json
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod service;

pub use config::{MySqlConfig, PoolConfig, PostgresConfig, SqliteConfig};
pub use driver::{Driver, ExecOutcome, MySqlDriver, PostgresDriver, SqliteDriver};
pub use error::{Error, MigrationFailure, Result};
pub use executor::Migration;
pub use keel_core;
pub use service::{Hook, Service};

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::config::{MySqlConfig, PoolConfig, PostgresConfig, SqliteConfig};
    pub use crate::driver::{Driver, ExecOutcome, MySqlDriver, PostgresDriver, SqliteDriver};
    pub use crate::error::{Error, MigrationFailure};
    pub use crate::executor::Migration;
    pub use crate::service::Service;
    pub use keel_core::prelude::*;
}
