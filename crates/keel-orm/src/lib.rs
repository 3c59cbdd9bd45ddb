//! # keel-orm
//!
//! Typed repositories over keel entities.
//!
//! This crate provides:
//! - [`Repository`] - select, insert, update and delete for one entity type
//! - [`Selector`] - fluent select builder over query modifiers
//! - `#[derive(Entity)]`, re-exported from `keel-derive`
//!
//! The derive emits paths into `keel_core`, so crates using it depend on
//! `keel-core` directly.
//!
//! ## Example
//!
//! ```ignore
//! use keel_orm::prelude::*;
//!
//! #[derive(Debug, Clone, Entity)]
//! #[entity(table = "users")]
//! pub struct User {
//!     #[column(primary_key, auto_increment)]
//!     pub id: i64,
//!     #[column]
//!     pub email: String,
//! }
//!
//! service.auto_migrate(&[User::schema()]).await?;
//!
//! let users = Repository::<User, SqliteDriver>::new(service);
//! let id = users.insert(&User { id: 0, email: "ada@example.com".into() }).await?;
//! let ada = users
//!     .select()
//!     .filter(UserColumns::id().eq(id))
//!     .one()
//!     .await?;
//! ```

pub mod error;
pub mod repository;
pub mod selector;

pub use error::{OrmError, Result};
pub use keel_derive::Entity;
pub use repository::Repository;
pub use selector::Selector;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::error::OrmError;
    pub use crate::repository::Repository;
    pub use crate::selector::Selector;
    pub use keel_migrate::prelude::*;
    pub use keel_derive::Entity;
}
