//! Integration tests for auto-migration against in-memory SQLite.
//!
//! Each test declares entity versions with `#[derive(Entity)]`, migrates
//! a fresh database and checks the executed statement counts and the
//! resulting physical schema.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use keel_core::{diff, Entity, EntitySchema, Field, FieldType, SqliteDialect, Statement, Value};
use keel_derive::Entity;
use keel_migrate::{
    Error, Migration, PoolConfig, Service, SqliteConfig, SqliteDriver,
};

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Entity)]
#[entity(table = "company")]
struct Company {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    name: String,
}

#[derive(Debug, Clone, Entity)]
#[entity(table = "user", index(name = "ix_user_email", columns("email"), unique))]
struct UserV1 {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "company.id")]
    company_id: i64,
}

/// V1 plus an optional column.
#[derive(Debug, Clone, Entity)]
#[entity(table = "user", index(name = "ix_user_email", columns("email"), unique))]
struct UserV2 {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "company.id")]
    company_id: i64,
    #[column]
    nickname: Option<String>,
}

/// V1 without its index.
#[derive(Debug, Clone, Entity)]
#[entity(table = "user")]
struct UserUnindexed {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "company.id")]
    company_id: i64,
}

/// V1 with a nullable email, which SQLite can only reach by rebuilding.
#[derive(Debug, Clone, Entity)]
#[entity(table = "user", index(name = "ix_user_email", columns("email"), unique))]
struct UserNullableEmail {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: Option<String>,
    #[column(references = "company.id")]
    company_id: i64,
}

/// V1 plus a required column without default.
#[derive(Debug, Clone, Entity)]
#[entity(table = "user", index(name = "ix_user_email", columns("email"), unique))]
struct UserWithAge {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "company.id")]
    company_id: i64,
    #[column]
    age: i64,
}

async fn service() -> Service<SqliteDriver> {
    Service::connect(&SqliteConfig::memory(), &PoolConfig::default())
        .await
        .unwrap()
}

async fn migrate(service: &Service<SqliteDriver>, schemas: &[EntitySchema]) -> usize {
    service.auto_migrate(schemas).await.unwrap()
}

async fn seed(service: &Service<SqliteDriver>) {
    service
        .execute(&Statement::new("INSERT INTO company (name) VALUES (:name)").bind("name", "Acme"))
        .await
        .unwrap();
    for email in ["ada@example.com", "bob@example.com"] {
        service
            .execute(
                &Statement::new("INSERT INTO user (email, company_id) VALUES (:email, :company)")
                    .bind("email", email)
                    .bind("company", 1_i64),
            )
            .await
            .unwrap();
    }
}

// =============================================================================
// Planning and execution
// =============================================================================

#[tokio::test]
async fn creates_tables_then_is_idempotent() {
    let service = service().await;
    let schemas = [Company::schema(), UserV1::schema()];

    // two tables and one index
    assert_eq!(migrate(&service, &schemas).await, 3);
    assert_eq!(migrate(&service, &schemas).await, 0);
}

#[tokio::test]
async fn adding_optional_column_is_one_statement() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;

    assert_eq!(migrate(&service, &[Company::schema(), UserV2::schema()]).await, 1);
    let table = service.introspect("user").await.unwrap();
    let nickname = table.get_column("nickname").unwrap();
    assert!(nickname.nullable);
    assert_eq!(nickname.default.as_deref(), Some("NULL"));
}

#[tokio::test]
async fn dropping_index_is_one_statement() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;

    assert_eq!(
        migrate(&service, &[Company::schema(), UserUnindexed::schema()]).await,
        1
    );
    assert!(service.introspect("user").await.unwrap().indexes.is_empty());
}

#[tokio::test]
async fn rebuild_keeps_rows_and_converges() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;
    seed(&service).await;

    let schemas = [Company::schema(), UserNullableEmail::schema()];
    let statements = service.plan(&schemas).await.unwrap();
    assert_eq!(statements[0].sql, "PRAGMA foreign_keys = OFF");
    assert!(migrate(&service, &schemas).await > 0);

    let rows = service
        .fetch(
            &Statement::new("SELECT email FROM user ORDER BY id"),
            &[Field::new("email", FieldType::Text).optional()],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[0].get::<Option<String>>("email").unwrap().as_deref(),
        Some("ada@example.com")
    );

    let table = service.introspect("user").await.unwrap();
    assert!(table.get_column("email").unwrap().nullable);
    assert_eq!(table.indexes.len(), 1);
    assert!(table.primary_key().unwrap().auto_increment);

    assert_eq!(migrate(&service, &schemas).await, 0);
}

#[tokio::test]
async fn failure_reports_completed_statements() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;
    seed(&service).await;

    let failure = service
        .auto_migrate(&[Company::schema(), UserWithAge::schema()])
        .await
        .unwrap_err();

    // PRAGMA, BEGIN, scratch cleanup, DROP INDEX, CREATE TABLE and
    // CREATE INDEX ran; the row copy hits the NOT NULL constraint on the
    // new column.
    assert_eq!(failure.completed, 6);
    assert!(matches!(failure.error, Error::Database(_)));
}

#[tokio::test]
async fn failed_rebuild_leaves_table_intact() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;
    seed(&service).await;
    let schemas = [Company::schema(), UserWithAge::schema()];

    let first = service.auto_migrate(&schemas).await.unwrap_err();

    let pragma = service
        .fetch(
            &Statement::new("PRAGMA foreign_keys"),
            &[Field::new("foreign_keys", FieldType::Int64)],
        )
        .await
        .unwrap();
    assert_eq!(pragma[0].get::<i64>("foreign_keys").unwrap(), 1);

    let table = service.introspect("user").await.unwrap();
    assert_eq!(table.indexes.len(), 1);
    assert!(table.get_column("age").is_none());
    assert!(matches!(
        service.introspect("_keel_rebuild_user").await,
        Err(Error::TableNotFound(_))
    ));

    // Rerunning fails the same way instead of tripping over leftovers.
    let second = service.auto_migrate(&schemas).await.unwrap_err();
    assert_eq!(second.completed, first.completed);

    // Cascades are live again.
    service
        .execute(&Statement::new("DELETE FROM company"))
        .await
        .unwrap();
    let users = service
        .fetch(
            &Statement::new("SELECT COUNT(*) FROM user"),
            &[Field::new("count", FieldType::Int64)],
        )
        .await
        .unwrap();
    assert_eq!(users[0].get::<i64>("count").unwrap(), 0);
}

#[tokio::test]
async fn retired_tables_drop_referencing_first() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV1::schema()]).await;

    let migration = Migration::new()
        .retire_table("company")
        .retire_table("user")
        .retire_table("never_existed");
    let statements = migration.plan(&service).await.unwrap().into_statements();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].sql.contains("\"user\""));
    assert!(statements[1].sql.contains("\"company\""));

    assert_eq!(migration.run(&service).await.unwrap(), 2);
    assert!(matches!(
        service.introspect("user").await,
        Err(Error::TableNotFound(_))
    ));
    assert!(matches!(
        service.introspect("company").await,
        Err(Error::TableNotFound(_))
    ));
}

#[tokio::test]
async fn plan_does_not_execute() {
    let service = service().await;
    let statements = service
        .plan(&[Company::schema(), UserV1::schema()])
        .await
        .unwrap();

    assert_eq!(statements.len(), 3);
    assert!(statements[0].sql.starts_with("CREATE TABLE \"company\""));
    assert!(matches!(
        service.introspect("company").await,
        Err(Error::TableNotFound(name)) if name == "company"
    ));
}

// =============================================================================
// Introspection
// =============================================================================

#[tokio::test]
async fn introspection_matches_declared_table() {
    let service = service().await;
    migrate(&service, &[Company::schema(), UserV2::schema()]).await;

    let source = service.introspect("user").await.unwrap();
    let target = UserV2::schema().to_table(&SqliteDialect::new()).unwrap();
    assert!(diff(&source, &target).is_empty(), "{source:#?}\n{target:#?}");

    let company_id = source.get_column("company_id").unwrap();
    let fk = company_id.foreign_key.as_ref().unwrap();
    assert_eq!((fk.table.as_str(), fk.column.as_str()), ("company", "id"));
}

// =============================================================================
// Service
// =============================================================================

#[tokio::test]
async fn hooks_observe_every_statement() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let service = service().await.with_hook(move |sql, _args| {
        assert!(!sql.is_empty());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let executed = migrate(&service, &[Company::schema()]).await;
    assert_eq!(seen.load(Ordering::SeqCst), executed);
}

#[tokio::test]
async fn last_insert_id_and_list_parameters() {
    let service = service().await;
    migrate(&service, &[Company::schema()]).await;

    let mut ids = Vec::new();
    for name in ["Acme", "Globex", "Initech"] {
        let outcome = service
            .execute(&Statement::new("INSERT INTO company (name) VALUES (:name)").bind("name", name))
            .await
            .unwrap();
        ids.push(outcome.last_insert_id.unwrap());
    }
    assert_eq!(ids, vec![1, 2, 3]);

    let rows = service
        .fetch(
            &Statement::new("SELECT id, name FROM company WHERE id IN (:ids) ORDER BY id")
                .bind("ids", Value::list([1_i64, 3])),
            &[
                Field::new("id", FieldType::Int64),
                Field::new("name", FieldType::Text),
            ],
        )
        .await
        .unwrap();
    let names: Vec<String> = rows.iter().map(|r| r.get("name").unwrap()).collect();
    assert_eq!(names, vec!["Acme".to_string(), "Initech".to_string()]);
}

#[tokio::test]
async fn blank_statement_is_rejected() {
    let service = service().await;
    let err = service.execute(&Statement::new("  \n ")).await.unwrap_err();
    assert!(matches!(err, Error::Core(keel_core::CoreError::BlankQuery)));
}

#[tokio::test]
async fn file_database_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db").to_string_lossy().into_owned();
    let schemas = [Company::schema(), UserV1::schema()];

    let first = Service::<SqliteDriver>::connect(&SqliteConfig::file(&path), &PoolConfig::default())
        .await
        .unwrap();
    assert_eq!(migrate(&first, &schemas).await, 3);
    first.pool().close().await;

    let second = Service::<SqliteDriver>::connect(&SqliteConfig::file(&path), &PoolConfig::default())
        .await
        .unwrap();
    assert_eq!(migrate(&second, &schemas).await, 0);
}
