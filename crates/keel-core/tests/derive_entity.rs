//! Integration tests for `#[derive(Entity)]`.
//!
//! These tests check the generated schema descriptors, record
//! conversions and typed column handles.

use keel_core::prelude::*;
use keel_core::Query;
use keel_derive::Entity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub theme: String,
    pub notifications: bool,
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(
    table = "users",
    comment = "Registered accounts",
    index(name = "ix_users_email", columns("email"), unique),
    index(name = "ix_users_company_created", columns("company_id", "created"))
)]
pub struct User {
    #[column(primary_key, auto_increment)]
    pub id: i64,
    #[column(comment = "Login address")]
    pub email: String,
    #[column]
    pub nickname: Option<String>,
    #[column(references = "companies.id")]
    pub company_id: i64,
    #[column(name = "created", default = "CURRENT_TIMESTAMP", read_only)]
    pub created_at: Option<chrono::NaiveDateTime>,
    #[column(json)]
    pub preferences: Preferences,
    #[column(json)]
    pub extra: Option<Vec<String>>,
    pub session_count: u32,
}

#[derive(Debug, Clone, PartialEq, Entity)]
pub struct AuditEntry {
    #[column(primary_key)]
    pub key: String,
    #[column]
    pub weight: f64,
}

fn sample_user() -> User {
    User {
        id: 7,
        email: "ada@example.com".to_string(),
        nickname: None,
        company_id: 3,
        created_at: None,
        preferences: Preferences {
            theme: "dark".to_string(),
            notifications: true,
        },
        extra: Some(vec!["beta".to_string()]),
        session_count: 12,
    }
}

// =============================================================================
// Schema descriptors
// =============================================================================

#[test]
fn schema_uses_entity_attributes() {
    let schema = User::schema();
    assert_eq!(schema.name, "users");
    assert_eq!(schema.comment, "Registered accounts");
    assert_eq!(schema.fields.len(), 7);
    assert_eq!(schema.indexes.len(), 2);
    assert!(schema.indexes[0].unique);
    assert_eq!(
        schema.indexes[1].columns,
        vec!["company_id".to_string(), "created".to_string()]
    );
}

#[test]
fn table_name_defaults_to_snake_case() {
    assert_eq!(AuditEntry::schema().name, "audit_entry");
}

#[test]
fn field_attributes_are_carried() {
    let schema = User::schema();

    let id = schema.primary_key().expect("primary key");
    assert_eq!(id.column, "id");
    assert_eq!(id.field_type, FieldType::Int64);
    assert!(id.auto_increment);

    let nickname = schema.get_field("nickname").expect("nickname");
    assert!(nickname.optional);
    assert_eq!(nickname.field_type, FieldType::Text);

    let created = schema.get_field("created").expect("created");
    assert!(created.read_only);
    assert_eq!(created.default.as_deref(), Some("CURRENT_TIMESTAMP"));
    assert_eq!(created.field_type, FieldType::Timestamp);

    let company = schema.get_field("company_id").expect("company_id");
    let fk = company.foreign_key.as_ref().expect("foreign key");
    assert_eq!(fk.table, "companies");
    assert_eq!(fk.column, "id");

    let extra = schema.get_field("extra").expect("extra");
    assert_eq!(extra.field_type, FieldType::Json);
    assert!(extra.optional);
    assert!(!schema.get_field("preferences").expect("preferences").optional);

    assert!(schema.get_field("session_count").is_none());
}

#[test]
fn insert_skips_generated_columns() {
    let dialect = SqliteDialect::new();
    let record = sample_user().to_record().expect("record");
    let statement = dialect.render_insert(&User::schema(), &record);

    assert!(!statement.sql.contains("\"id\""));
    assert!(!statement.sql.contains("\"created\""));
    assert!(statement.sql.contains("\"email\""));
    assert!(statement.params.contains_key("preferences"));
}

// =============================================================================
// Record conversions
// =============================================================================

#[test]
fn record_round_trip_resets_skipped_fields() {
    let user = sample_user();
    let record = user.to_record().expect("record");

    assert_eq!(record.len(), 7);
    assert!(record.value("nickname").is_some_and(Value::is_null));
    assert!(matches!(record.value("preferences"), Some(Value::Json(_))));

    let back = User::from_record(&record).expect("from record");
    assert_eq!(back.session_count, 0);
    assert_eq!(
        back,
        User {
            session_count: 0,
            ..user
        }
    );
}

#[test]
fn json_columns_decode_from_text() {
    let record = Record::new()
        .set("id", 1_i64)
        .set("email", "a@b.c")
        .set("nickname", Value::Null)
        .set("company_id", 1_i64)
        .set("created", "2024-05-01 10:00:00")
        .set("preferences", r#"{"theme":"light","notifications":false}"#)
        .set("extra", Value::Null);

    let user = User::from_record(&record).expect("from record");
    assert_eq!(user.preferences.theme, "light");
    assert!(user.extra.is_none());
    assert!(user.created_at.is_some());
}

#[test]
fn missing_column_is_reported() {
    let record = Record::new().set("key", "k");
    let err = AuditEntry::from_record(&record).unwrap_err();
    assert!(matches!(err, CoreError::UnknownColumn(ref c) if c == "weight"));
}

// =============================================================================
// Typed columns
// =============================================================================

#[test]
fn typed_columns_build_conditions() {
    let dialect = SqliteDialect::new();
    let query = Query::new("users", ["id", "email"])
        .and_where(UserColumns::email().eq("ada@example.com"))
        .and_where(UserColumns::company_id().is_in([1_i64, 2]))
        .and_where(UserColumns::nickname().is_null());

    let statement = dialect.render_select(&query);
    assert!(statement.sql.contains("\"email\" = :w1"));
    assert!(statement.sql.contains("\"company_id\" IN (:w2)"));
    assert!(statement.sql.contains("\"nickname\" IS NULL"));
    assert_eq!(UserColumns::created_at().name(), "created");
}
