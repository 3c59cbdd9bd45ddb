//! Declarative entity descriptors.
//!
//! An entity describes itself once through an [`EntitySchema`]: its table,
//! its fields with their semantic types and annotations, and its indexes.
//! [`EntitySchema::to_table`] turns that description into the dialect's
//! physical [`Table`]. No runtime type inspection is involved; the
//! `#[derive(Entity)]` macro writes the schema out at compile time.

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{CoreError, Result};
use crate::schema::{ForeignKey, Table, TableColumn, TableIndex};
use crate::value::{FromValue, ToValue, Value};

/// Semantic type of an entity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// 64-bit unsigned integer.
    UInt64,
    /// Single precision float.
    Float32,
    /// Double precision float.
    Float64,
    /// Text.
    Text,
    /// Timestamp without time zone.
    Timestamp,
    /// Byte sequence.
    Bytes,
    /// Structured or sequence value, stored JSON encoded.
    Json,
}

/// Reports the semantic type of a Rust field type.
pub trait FieldKind {
    /// The semantic type.
    const FIELD_TYPE: FieldType;
    /// Whether presence of the value is itself optional.
    const OPTIONAL: bool = false;
}

macro_rules! field_kind {
    ($($t:ty => $ft:ident),* $(,)?) => {
        $(
            impl FieldKind for $t {
                const FIELD_TYPE: FieldType = FieldType::$ft;
            }
        )*
    };
}

field_kind! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    NaiveDateTime => Timestamp,
    Vec<u8> => Bytes,
    serde_json::Value => Json,
}

impl<T: FieldKind> FieldKind for Option<T> {
    const FIELD_TYPE: FieldType = T::FIELD_TYPE;
    const OPTIONAL: bool = true;
}

/// One annotated field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub column: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the value may be absent.
    #[serde(default)]
    pub optional: bool,
    /// Primary key flag.
    #[serde(default)]
    pub primary_key: bool,
    /// Auto-increment flag.
    #[serde(default)]
    pub auto_increment: bool,
    /// Read-only fields are never written by inserts or updates.
    #[serde(default)]
    pub read_only: bool,
    /// Raw default expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Column comment.
    #[serde(default)]
    pub comment: String,
    /// Foreign key reference.
    #[serde(default)]
    pub foreign_key: Option<ForeignKey>,
}

impl Field {
    /// Creates a required field.
    #[must_use]
    pub fn new(column: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            column: column.into(),
            field_type,
            optional: false,
            primary_key: false,
            auto_increment: false,
            read_only: false,
            default: None,
            comment: String::new(),
            foreign_key: None,
        }
    }

    /// Creates a field whose type and optionality come from `T`.
    #[must_use]
    pub fn of<T: FieldKind>(column: impl Into<String>) -> Self {
        let field = Self::new(column, T::FIELD_TYPE);
        if T::OPTIONAL {
            field.optional()
        } else {
            field
        }
    }

    /// Marks the field optional (nullable).
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the field as primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the field auto-incrementing.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Marks the field read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Sets the raw default expression.
    #[must_use]
    pub fn default_value(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Adds a foreign key reference to `table.column`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey::new(table, column));
        self
    }

    /// Whether inserts write this field. Read-only and auto-increment
    /// columns are left to the backend.
    #[must_use]
    pub const fn is_insertable(&self) -> bool {
        !self.read_only && !self.auto_increment
    }

    /// Whether updates write this field.
    #[must_use]
    pub const fn is_updatable(&self) -> bool {
        !self.read_only && !self.primary_key
    }

    fn to_column<D: Dialect + ?Sized>(&self, dialect: &D) -> Result<TableColumn> {
        let column_type =
            dialect
                .map_type(self.field_type)
                .ok_or_else(|| CoreError::UnsupportedType {
                    column: self.column.clone(),
                    field_type: self.field_type,
                    dialect: dialect.name(),
                })?;

        let default = match (&self.default, self.optional) {
            (Some(expr), _) => Some(expr.clone()),
            (None, true) => Some("NULL".to_string()),
            (None, false) => None,
        };

        Ok(TableColumn {
            name: self.column.clone(),
            column_type: column_type.to_string(),
            nullable: self.optional && !self.primary_key,
            default,
            comment: self.comment.clone(),
            primary_key: self.primary_key,
            auto_increment: self.auto_increment,
            foreign_key: self.foreign_key.clone(),
        })
    }
}

/// Declarative description of an entity and its table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Table name.
    pub name: String,
    /// Table comment.
    #[serde(default)]
    pub comment: String,
    /// Annotated fields, in declaration order.
    pub fields: Vec<Field>,
    /// Declared indexes.
    #[serde(default)]
    pub indexes: Vec<TableIndex>,
}

impl EntitySchema {
    /// Creates an empty schema for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Sets the table comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: TableIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Gets a field by column name.
    #[must_use]
    pub fn get_field(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }

    /// Gets the primary-key field.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.primary_key)
    }

    /// Derives the target table for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnsupportedType`] when a field type has no native
    /// column type in the dialect.
    pub fn to_table<D: Dialect + ?Sized>(&self, dialect: &D) -> Result<Table> {
        let mut table = Table::new(&self.name).comment(&self.comment);
        for field in &self.fields {
            table.push_column(field.to_column(dialect)?);
        }
        for index in &self.indexes {
            table.push_index(index.clone());
        }
        Ok(dialect.adjust_table_definition(table))
    }
}

/// An ordered set of column values: one row, read or to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Sets a column value, builder style.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl ToValue) -> Self {
        self.insert(column, value.to_value());
        self
    }

    /// Sets a structured column value, JSON encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn set_json<T: Serialize + ?Sized>(
        mut self,
        column: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        self.insert(column, Value::json(value)?);
        Ok(self)
    }

    /// Inserts or replaces a column value.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self.values.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((column, value)),
        }
    }

    /// Raw value of a column.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Reads a column as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownColumn`] if the column is absent and
    /// [`CoreError::Conversion`] if the value does not fit `T`.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self
            .value(column)
            .ok_or_else(|| CoreError::UnknownColumn(column.to_string()))?;
        let found = value.kind();
        T::from_value(value.clone()).ok_or_else(|| CoreError::Conversion {
            column: column.to_string(),
            expected: std::any::type_name::<T>(),
            found,
        })
    }

    /// Reads a JSON encoded column as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is absent or does not decode into `T`.
    pub fn json<T: DeserializeOwned>(&self, column: &str) -> Result<T> {
        self.value(column)
            .ok_or_else(|| CoreError::UnknownColumn(column.to_string()))?
            .clone()
            .decode_json()
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record holds no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// A record shape persisted in its own table.
pub trait Entity: Sized + Send + Sync + 'static {
    /// Type of the primary key.
    type Id: FromValue + ToValue + Send;

    /// Describes the entity.
    fn schema() -> EntitySchema;

    /// Converts the entity into column values.
    ///
    /// # Errors
    ///
    /// Returns an error if a structured field cannot be encoded.
    fn to_record(&self) -> Result<Record>;

    /// Builds the entity from column values.
    ///
    /// # Errors
    ///
    /// Returns an error if a column is missing or does not fit its field.
    fn from_record(record: &Record) -> Result<Self>;
}
