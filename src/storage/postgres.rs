//! PostgreSQL Backend
//!
//! Production query backend using deadpool-postgres connection pooling.
//!
//! Each statement checks out its own pooled client, runs inside a
//! transaction that is rolled back afterwards, and returns the client to the
//! pool. Column values are decoded to JSON by their Postgres type.

use askdb_sql::{BackendError, ColumnInfo, QueryBackend, Row, TableSchema};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::{Config, ManagerConfig, Pool, RecyclingMethod, Runtime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::Type;
use tokio_postgres::NoTls;
use uuid::Uuid;

use super::connection::PostgresSettings;
use crate::utils::error::{AppError, AppResult};

const LIST_TABLES_SQL: &str = "SELECT table_name::text
     FROM information_schema.tables
     WHERE table_schema = 'public'
     ORDER BY table_name";

const DESCRIBE_TABLE_SQL: &str = "SELECT column_name::text, data_type::text
     FROM information_schema.columns
     WHERE table_schema = 'public' AND table_name = $1
     ORDER BY ordinal_position";

/// Query backend over a pooled PostgreSQL database
#[derive(Clone)]
pub struct PostgresBackend {
    pool: Pool,
}

impl PostgresBackend {
    /// Create a backend with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build the connection pool. No connection is opened until the first
    /// statement runs.
    pub fn connect(settings: &PostgresSettings) -> AppResult<Self> {
        let mut cfg = Config::new();
        cfg.host = Some(settings.host.clone());
        cfg.port = Some(settings.port);
        cfg.dbname = Some(settings.dbname.clone());
        cfg.user = Some(settings.user.clone());
        cfg.password = Some(settings.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::database(format!("Failed to create pool: {}", e)))?;

        tracing::info!(
            host = %settings.host,
            port = settings.port,
            dbname = %settings.dbname,
            "postgres pool created"
        );
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_client(&self) -> Result<deadpool_postgres::Object, BackendError> {
        self.pool
            .get()
            .await
            .map_err(|e| BackendError::connection(e.to_string()))
    }
}

/// Prefer the server's message over the driver's wrapper text.
fn pg_error(e: tokio_postgres::Error) -> BackendError {
    match e.as_db_error() {
        Some(db) => BackendError::query(db.message()),
        None => BackendError::query(e.to_string()),
    }
}

fn decimal_to_json(d: Decimal) -> Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(d.to_string()))
}

fn float_to_json(f: f64) -> Value {
    serde_json::Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Value of a column whose type has no JSON mapping, from its attempted
/// text decode. A failed decode becomes `null` and is logged.
fn unmapped_to_json<E: std::fmt::Display>(
    column: &str,
    ty: &Type,
    decoded: Result<Option<String>, E>,
) -> Option<Value> {
    match decoded {
        Ok(text) => text.map(Value::String),
        Err(e) => {
            tracing::debug!(
                column,
                column_type = %ty,
                error = %e,
                "no decoder for column type; value dropped"
            );
            None
        }
    }
}

fn decode_value(
    row: &tokio_postgres::Row,
    idx: usize,
    name: &str,
    ty: &Type,
) -> Result<Value, tokio_postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(Value::from)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?.map(Value::from)
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?.map(Value::from)
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(Value::from)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)?.map(Value::from)
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map(|f| float_to_json(f64::from(f)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(float_to_json)
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(idx)?.map(decimal_to_json)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
    {
        row.try_get::<_, Option<String>>(idx)?.map(Value::String)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<Value>>(idx)?
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)?
            .map(|d| Value::String(d.to_string()))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|d| Value::String(d.to_string()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|d| Value::String(d.to_rfc3339()))
    } else if *ty == Type::TIME {
        row.try_get::<_, Option<NaiveTime>>(idx)?
            .map(|t| Value::String(t.to_string()))
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<Uuid>>(idx)?
            .map(|u| Value::String(u.to_string()))
    } else {
        // Types without a JSON mapping: text if the driver allows it
        unmapped_to_json(name, ty, row.try_get::<_, Option<String>>(idx))
    };
    Ok(value.unwrap_or(Value::Null))
}

fn row_to_json(row: &tokio_postgres::Row) -> Result<Row, BackendError> {
    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.name(), column.type_()).map_err(|e| {
            BackendError::Decode {
                column: column.name().to_string(),
                message: e.to_string(),
            }
        })?;
        out.insert(column.name().to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl QueryBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn fetch_rows(&self, sql: &str) -> Result<Vec<Row>, BackendError> {
        let mut client = self.get_client().await?;
        let tx = client.transaction().await.map_err(pg_error)?;
        let rows = tx.query(sql, &[]).await.map_err(pg_error)?;
        let out = rows
            .iter()
            .map(row_to_json)
            .collect::<Result<Vec<_>, _>>()?;
        tx.rollback().await.map_err(pg_error)?;
        Ok(out)
    }

    async fn list_tables(&self) -> Result<Vec<String>, BackendError> {
        let client = self.get_client().await?;
        let rows = client
            .query(LIST_TABLES_SQL, &[])
            .await
            .map_err(pg_error)?;
        rows.iter()
            .map(|r| r.try_get::<_, String>(0).map_err(pg_error))
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<TableSchema, BackendError> {
        let client = self.get_client().await?;
        let rows = client
            .query(DESCRIBE_TABLE_SQL, &[&table])
            .await
            .map_err(pg_error)?;
        let columns = rows
            .iter()
            .map(|r| {
                Ok(ColumnInfo {
                    name: r.try_get(0).map_err(pg_error)?,
                    data_type: r.try_get(1).map_err(pg_error)?,
                })
            })
            .collect::<Result<Vec<_>, BackendError>>()?;
        Ok(TableSchema {
            name: table.to_string(),
            columns,
        })
    }
}
