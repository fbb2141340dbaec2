//! Database Selection
//!
//! Resolves which database (if any) the session talks to and builds the
//! matching backend. A missing or unusable database is not an error here:
//! the executor reports "not configured" for every statement instead.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use askdb_sql::QueryBackend;

use super::postgres::PostgresBackend;
use super::sqlite::SqliteBackend;
use crate::models::settings::AppConfig;

pub const DEFAULT_POSTGRES_HOST: &str = "localhost";
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// PostgreSQL connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for PostgresSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl PostgresSettings {
    /// Read `POSTGRES_*` from the process environment.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from a variable lookup.
    ///
    /// User, password and database name are required; host and port have
    /// defaults. Empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let user = get("POSTGRES_USER")?;
        let password = get("POSTGRES_PASSWORD")?;
        let dbname = get("POSTGRES_DB")?;
        let host = get("POSTGRES_HOST").unwrap_or_else(|| DEFAULT_POSTGRES_HOST.to_string());
        let port = match get("POSTGRES_PORT") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(value = %raw, "invalid POSTGRES_PORT, using default");
                    DEFAULT_POSTGRES_PORT
                }
            },
            None => DEFAULT_POSTGRES_PORT,
        };

        Some(Self {
            host,
            port,
            dbname,
            user,
            password,
        })
    }
}

/// The database a session runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Sqlite(PathBuf),
    Postgres(PostgresSettings),
}

impl DatabaseTarget {
    /// Resolve the target from config and environment.
    ///
    /// Order: `ASKDB_SQLITE_PATH`, then `database.sqlite_path`, then the
    /// `POSTGRES_*` variables. `None` when nothing usable is set.
    pub fn resolve(config: &AppConfig, lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        if let Some(path) = lookup("ASKDB_SQLITE_PATH").filter(|p| !p.trim().is_empty()) {
            return Some(Self::Sqlite(PathBuf::from(path)));
        }
        if let Some(path) = &config.database.sqlite_path {
            return Some(Self::Sqlite(path.clone()));
        }
        PostgresSettings::from_lookup(lookup).map(Self::Postgres)
    }

    /// Name shown in the banner.
    pub fn display_name(&self) -> String {
        match self {
            Self::Sqlite(path) => path.display().to_string(),
            Self::Postgres(settings) => settings.dbname.clone(),
        }
    }
}

/// Build the backend for `target`. Failures are logged and yield `None`.
pub fn connect(target: Option<&DatabaseTarget>) -> Option<Arc<dyn QueryBackend>> {
    let Some(target) = target else {
        tracing::warn!("no database configured; SQL will not be executed");
        return None;
    };

    let backend: Result<Arc<dyn QueryBackend>, _> = match target {
        DatabaseTarget::Sqlite(path) => {
            SqliteBackend::open(path).map(|b| Arc::new(b) as Arc<dyn QueryBackend>)
        }
        DatabaseTarget::Postgres(settings) => {
            PostgresBackend::connect(settings).map(|b| Arc::new(b) as Arc<dyn QueryBackend>)
        }
    };

    match backend {
        Ok(backend) => Some(backend),
        Err(e) => {
            tracing::error!(
                error = %e,
                database = %target.display_name(),
                "failed to set up database backend"
            );
            None
        }
    }
}
