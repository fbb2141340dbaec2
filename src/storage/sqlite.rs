//! SQLite Backend
//!
//! Local database backend using rusqlite with r2d2 connection pooling.
//! Used for offline work against a file and as the in-memory test fixture.
//!
//! rusqlite is synchronous, so every call runs on the blocking pool.

use std::path::Path;

use askdb_sql::{BackendError, ColumnInfo, QueryBackend, Row, TableSchema};
use async_trait::async_trait;
use base64::Engine;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use serde_json::Value;

use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Query backend over a pooled SQLite database
#[derive(Clone)]
pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    /// Create a backend from an existing connection pool.
    pub fn from_pool(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) a database file.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        tracing::info!(path = %path.display(), "opened sqlite database");
        Ok(Self { pool })
    }

    /// Create an in-memory database.
    ///
    /// The pool holds a single connection so every caller sees the same data.
    pub fn in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;
        Ok(Self { pool })
    }

    /// Run one or more statements outside the read-only gate (fixtures, setup).
    pub fn execute_batch(&self, sql: &str) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Check if the database is healthy
    pub fn is_healthy(&self) -> bool {
        if let Ok(conn) = self.pool.get() {
            conn.query_row("SELECT 1", [], |_| Ok(())).is_ok()
        } else {
            false
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, BackendError>
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, BackendError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| BackendError::connection(format!("Failed to get connection: {}", e)))?;
            f(&mut *conn)
        })
        .await
        .map_err(|e| BackendError::query(format!("sqlite worker failed: {}", e)))?
    }
}

fn query_error(e: rusqlite::Error) -> BackendError {
    BackendError::query(e.to_string())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

/// Run `sql` inside a transaction that is rolled back afterwards.
fn fetch_rows_blocking(conn: &mut rusqlite::Connection, sql: &str) -> Result<Vec<Row>, BackendError> {
    let tx = conn.transaction().map_err(query_error)?;
    let rows = {
        let mut stmt = tx.prepare(sql).map_err(query_error)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut cursor = stmt.query([]).map_err(query_error)?;

        let mut rows = Vec::new();
        while let Some(row) = cursor.next().map_err(query_error)? {
            let mut out = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(query_error)?;
                out.insert(name.clone(), value_to_json(value));
            }
            rows.push(out);
        }
        rows
    };
    tx.rollback().map_err(query_error)?;
    Ok(rows)
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| fetch_rows_blocking(conn, &sql))
            .await
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )
                .map_err(query_error)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(query_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_error)?;
            Ok(names)
        })
        .await
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema, BackendError> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            let sql = format!("PRAGMA table_info({})", quote_identifier(&table));
            let mut stmt = conn.prepare(&sql).map_err(query_error)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get::<_, String>(2)?.to_lowercase(),
                    })
                })
                .map_err(query_error)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(query_error)?;
            Ok(TableSchema {
                name: table,
                columns,
            })
        })
        .await
    }
}
