//! Connection settings.
//!
//! Every struct deserializes with defaults so partial configuration files
//! work.

use std::time::Duration;

use serde::Deserialize;

/// Path SQLite treats as a private in-memory database.
pub const SQLITE_MEMORY: &str = ":memory:";

/// Pool sizing and timeouts shared by every driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound of pooled connections.
    pub max_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout_secs: u64,
    /// Per-statement timeout; none when unset.
    pub statement_timeout_secs: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout_secs: 30,
            statement_timeout_secs: None,
        }
    }
}

impl PoolConfig {
    /// Connection acquisition timeout.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Statement timeout, if configured.
    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }
}

/// SQLite database file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// File path, or `:memory:`.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self::memory()
    }
}

impl SqliteConfig {
    /// Database stored at `path`, created if missing.
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Private in-memory database.
    #[must_use]
    pub fn memory() -> Self {
        Self::file(SQLITE_MEMORY)
    }

    /// Whether this configuration points at an in-memory database.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path == SQLITE_MEMORY
    }
}

/// Network server settings.
macro_rules! server_config {
    ($(#[$meta:meta])* $name:ident, $port:expr, $user:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
        #[serde(default)]
        pub struct $name {
            /// Server host name.
            pub host: String,
            /// Server port.
            pub port: u16,
            /// User name.
            pub user: String,
            /// Password.
            pub pass: String,
            /// Database name.
            pub name: String,
        }

        impl Default for $name {
            fn default() -> Self {
                Self {
                    host: "localhost".to_string(),
                    port: $port,
                    user: $user.to_string(),
                    pass: String::new(),
                    name: "keel".to_string(),
                }
            }
        }
    };
}

server_config!(
    /// MySQL server settings.
    MySqlConfig,
    3306,
    "root"
);

server_config!(
    /// PostgreSQL server settings.
    PostgresConfig,
    5432,
    "postgres"
);
