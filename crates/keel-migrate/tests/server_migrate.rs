//! Auto-migration against live MySQL and PostgreSQL servers.
//!
//! These tests only run when `KEEL_TEST_MYSQL_HOST` or
//! `KEEL_TEST_POSTGRES_HOST` is set (with optional `_PORT`, `_USER`,
//! `_PASS` and `_NAME`); otherwise they return early.

#![allow(dead_code)]

use keel_core::{diff, Dialect, Entity, EntitySchema};
use keel_derive::Entity;
use keel_migrate::{
    Driver, Migration, MySqlConfig, MySqlDriver, PoolConfig, PostgresConfig, PostgresDriver,
    Service,
};

#[derive(Debug, Clone, Entity)]
#[entity(table = "keel_test_team", comment = "Teams")]
struct Team {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column(comment = "Display name")]
    name: String,
}

#[derive(Debug, Clone, Entity)]
#[entity(
    table = "keel_test_member",
    index(name = "ix_keel_test_member_email", columns("email"), unique)
)]
struct Member {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "keel_test_team.id")]
    team_id: i64,
    #[column(default = "0")]
    visits: u32,
    #[column]
    bio: Option<String>,
}

/// Member with a widened counter and no bio.
#[derive(Debug, Clone, Entity)]
#[entity(
    table = "keel_test_member",
    index(name = "ix_keel_test_member_email", columns("email"), unique)
)]
struct MemberV2 {
    #[column(primary_key, auto_increment)]
    id: i64,
    #[column]
    email: String,
    #[column(references = "keel_test_team.id")]
    team_id: i64,
    #[column(default = "0")]
    visits: u64,
}

fn env(prefix: &str, key: &str) -> Option<String> {
    std::env::var(format!("KEEL_TEST_{prefix}_{key}")).ok()
}

async fn exercise<D: Driver>(service: Service<D>) {
    let cleanup = Migration::new()
        .retire_table("keel_test_member")
        .retire_table("keel_test_team");
    cleanup.run(&service).await.unwrap();

    let v1: Vec<EntitySchema> = vec![Team::schema(), Member::schema()];
    assert!(service.auto_migrate(&v1).await.unwrap() > 0);
    assert_eq!(service.auto_migrate(&v1).await.unwrap(), 0);

    for schema in &v1 {
        let source = service.introspect(&schema.name).await.unwrap();
        let target = schema.to_table(service.dialect()).unwrap();
        assert!(
            diff(&source, &target).is_empty(),
            "{}: {source:#?}\n{target:#?}",
            service.dialect().name()
        );
    }

    let v2 = vec![Team::schema(), MemberV2::schema()];
    assert!(service.auto_migrate(&v2).await.unwrap() > 0);
    assert_eq!(service.auto_migrate(&v2).await.unwrap(), 0);

    assert_eq!(cleanup.run(&service).await.unwrap(), 2);
}

#[tokio::test]
async fn mysql_migrations_converge() {
    let Some(host) = env("MYSQL", "HOST") else {
        return;
    };
    let defaults = MySqlConfig::default();
    let config = MySqlConfig {
        host,
        port: env("MYSQL", "PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),
        user: env("MYSQL", "USER").unwrap_or(defaults.user),
        pass: env("MYSQL", "PASS").unwrap_or(defaults.pass),
        name: env("MYSQL", "NAME").unwrap_or(defaults.name),
    };
    let service = Service::<MySqlDriver>::connect(&config, &PoolConfig::default())
        .await
        .unwrap();
    exercise(service).await;
}

#[tokio::test]
async fn postgres_migrations_converge() {
    let Some(host) = env("POSTGRES", "HOST") else {
        return;
    };
    let defaults = PostgresConfig::default();
    let config = PostgresConfig {
        host,
        port: env("POSTGRES", "PORT").and_then(|p| p.parse().ok()).unwrap_or(defaults.port),
        user: env("POSTGRES", "USER").unwrap_or(defaults.user),
        pass: env("POSTGRES", "PASS").unwrap_or(defaults.pass),
        name: env("POSTGRES", "NAME").unwrap_or(defaults.name),
    };
    let service = Service::<PostgresDriver>::connect(&config, &PoolConfig::default())
        .await
        .unwrap();
    exercise(service).await;
}
