//! keel-migrate CLI
//!
//! Command-line tool for inspecting and migrating databases from a JSON
//! schema file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use keel_migrate::prelude::*;

/// Schema-driven database migrations.
#[derive(Parser)]
#[command(name = "keel-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend to connect to.
    #[arg(long, env = "KEEL_DRIVER", value_enum, default_value_t = Backend::Sqlite)]
    driver: Backend,

    /// SQLite database file.
    #[arg(long, env = "KEEL_DB_PATH", default_value = "keel.db")]
    path: String,

    /// Server host.
    #[arg(long, env = "KEEL_DB_HOST", default_value = "localhost")]
    host: String,

    /// Server port (backend default if not specified).
    #[arg(long, env = "KEEL_DB_PORT")]
    port: Option<u16>,

    /// User name.
    #[arg(long, env = "KEEL_DB_USER")]
    user: Option<String>,

    /// Password.
    #[arg(long, env = "KEEL_DB_PASS", default_value = "")]
    pass: String,

    /// Database name.
    #[arg(long, env = "KEEL_DB_NAME", default_value = "keel")]
    name: String,

    /// Per-statement timeout in seconds.
    #[arg(long, env = "KEEL_STATEMENT_TIMEOUT")]
    statement_timeout: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Sqlite,
    Mysql,
    Postgres,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the physical shape of tables as JSON.
    Inspect {
        /// Tables to inspect.
        #[arg(required = true)]
        tables: Vec<String>,
    },

    /// Show the statements a migration would run.
    Plan {
        /// JSON file holding an array of entity schemas.
        #[arg(short, long)]
        schema: PathBuf,

        /// Tables to drop if they still exist.
        #[arg(long)]
        retire: Vec<String>,
    },

    /// Apply a migration.
    Migrate {
        /// JSON file holding an array of entity schemas.
        #[arg(short, long)]
        schema: PathBuf,

        /// Tables to drop if they still exist.
        #[arg(long)]
        retire: Vec<String>,
    },
}

fn load_schemas(path: &Path) -> anyhow::Result<Vec<EntitySchema>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading schema file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing schema file {}", path.display()))
}

fn migration(schema: &Path, retire: Vec<String>) -> anyhow::Result<Migration> {
    let migration = Migration::new().entities(load_schemas(schema)?);
    Ok(retire.into_iter().fold(migration, Migration::retire_table))
}

async fn run<D: Driver>(service: Service<D>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Inspect { tables } => {
            let mut found = Vec::with_capacity(tables.len());
            for name in &tables {
                found.push(service.introspect(name).await?);
            }
            println!("{}", serde_json::to_string_pretty(&found)?);
        }

        Commands::Plan { schema, retire } => {
            let plan = migration(&schema, retire)?.plan(&service).await?;
            if plan.is_empty() {
                info!("Database is up to date.");
            }
            for statement in plan.into_statements() {
                println!("{statement};");
            }
        }

        Commands::Migrate { schema, retire } => {
            let executed = migration(&schema, retire)?.run(&service).await?;
            info!("Applied {executed} statement(s).");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let pool = PoolConfig {
        statement_timeout_secs: cli.statement_timeout,
        ..PoolConfig::default()
    };

    match cli.driver {
        Backend::Sqlite => {
            let config = SqliteConfig::file(cli.path);
            run(Service::<SqliteDriver>::connect(&config, &pool).await?, cli.command).await
        }
        Backend::Mysql => {
            let defaults = MySqlConfig::default();
            let config = MySqlConfig {
                host: cli.host,
                port: cli.port.unwrap_or(defaults.port),
                user: cli.user.unwrap_or(defaults.user),
                pass: cli.pass,
                name: cli.name,
            };
            run(Service::<MySqlDriver>::connect(&config, &pool).await?, cli.command).await
        }
        Backend::Postgres => {
            let defaults = PostgresConfig::default();
            let config = PostgresConfig {
                host: cli.host,
                port: cli.port.unwrap_or(defaults.port),
                user: cli.user.unwrap_or(defaults.user),
                pass: cli.pass,
                name: cli.name,
            };
            run(Service::<PostgresDriver>::connect(&config, &pool).await?, cli.command).await
        }
    }
}
