//! Error types for the schema and statement layer.

use crate::entity::FieldType;

/// Errors raised while describing entities, rendering or binding statements.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A field's semantic type has no native column type in the dialect.
    #[error("Unsupported type {field_type:?} for column '{column}' in {dialect}")]
    UnsupportedType {
        /// Column carrying the type.
        column: String,
        /// The semantic type that could not be mapped.
        field_type: FieldType,
        /// Dialect name.
        dialect: &'static str,
    },

    /// A statement rendered to nothing but whitespace.
    #[error("Blank query")]
    BlankQuery,

    /// A column name the entity does not declare.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// A record value could not be converted to the requested Rust type.
    #[error("Cannot convert column '{column}' from {found} to {expected}")]
    Conversion {
        /// Column being read.
        column: String,
        /// Rust type requested.
        expected: &'static str,
        /// Kind of value found.
        found: &'static str,
    },

    /// The entity has no primary-key field.
    #[error("Entity '{0}' declares no primary key")]
    MissingPrimaryKey(String),

    /// JSON encoding or decoding of a structured field failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
