//! Schema Introspection
//!
//! Builds the schema description, first table name and sample rows that are
//! shown to the model. Introspection failures are folded into the text so a
//! broken database still yields a usable prompt.

use std::sync::Arc;

use askdb_sql::{BackendError, QueryBackend};
use serde::{Deserialize, Serialize};

pub const NOT_CONFIGURED_SCHEMA: &str = "Database connection not configured.";
pub const NO_TABLE: &str = "N/A";
pub const NO_TABLES_SAMPLE: &str = "No tables found in the database.";

/// Database facts injected into the system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaContext {
    /// One line per table: `Table t: columns = a (integer), b (text)`
    pub schema_text: String,
    /// First table by name, or `N/A`
    pub table_name: String,
    /// Pretty-printed JSON of the first rows of `table_name`
    pub sample_rows: String,
}

impl SchemaContext {
    /// Context used when no database is configured.
    pub fn unconfigured() -> Self {
        Self {
            schema_text: NOT_CONFIGURED_SCHEMA.to_string(),
            table_name: NO_TABLE.to_string(),
            sample_rows: NO_TABLES_SAMPLE.to_string(),
        }
    }

    pub fn has_table(&self) -> bool {
        self.table_name != NO_TABLE
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Every table with its columns, one line per table.
pub async fn schema_text(backend: &dyn QueryBackend) -> Result<String, BackendError> {
    let mut lines = Vec::new();
    for table in backend.list_tables().await? {
        let schema = backend.describe_table(&table).await?;
        let columns: Vec<String> = schema
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.data_type))
            .collect();
        lines.push(format!("Table {}: columns = {}", table, columns.join(", ")));
    }
    Ok(lines.join("\n"))
}

/// Up to `limit` rows of `table` as pretty JSON.
pub async fn sample_rows(
    backend: &dyn QueryBackend,
    table: &str,
    limit: usize,
) -> Result<String, BackendError> {
    let sql = format!("SELECT * FROM {} LIMIT {}", quote_identifier(table), limit);
    let rows = backend.fetch_rows(&sql).await?;
    serde_json::to_string_pretty(&rows).map_err(|e| BackendError::query(e.to_string()))
}

/// Introspect the database for the prompt.
pub async fn load_schema_context(
    backend: Option<&Arc<dyn QueryBackend>>,
    limit: usize,
) -> SchemaContext {
    let Some(backend) = backend else {
        return SchemaContext::unconfigured();
    };
    let backend = backend.as_ref();

    let schema = match schema_text(backend).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "schema introspection failed");
            format!("Error reading schema: {}", e)
        }
    };

    let first = match backend.list_tables().await {
        Ok(tables) => tables.into_iter().next(),
        Err(e) => {
            tracing::warn!(error = %e, "listing tables failed");
            None
        }
    };

    let Some(table) = first else {
        return SchemaContext {
            schema_text: schema,
            table_name: NO_TABLE.to_string(),
            sample_rows: NO_TABLES_SAMPLE.to_string(),
        };
    };

    let samples = match sample_rows(backend, &table, limit).await {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, table = %table, "fetching sample rows failed");
            format!("Error fetching sample rows: {}", e)
        }
    };

    tracing::info!(table = %table, "loaded schema context");
    SchemaContext {
        schema_text: schema,
        table_name: table,
        sample_rows: samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteBackend;

    fn backend() -> Arc<dyn QueryBackend> {
        let db = SqliteBackend::in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE t (x NUMERIC, note TEXT);
             INSERT INTO t VALUES (1, 'a'), (2, 'b'), (3, 'c');
             CREATE TABLE u (id INTEGER);",
        )
        .unwrap();
        Arc::new(db)
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let ctx = load_schema_context(None, 5).await;
        assert_eq!(ctx, SchemaContext::unconfigured());
        assert!(!ctx.has_table());
    }

    #[tokio::test]
    async fn test_schema_context_from_sqlite() {
        let backend = backend();
        let ctx = load_schema_context(Some(&backend), 2).await;

        assert_eq!(
            ctx.schema_text,
            "Table t: columns = x (numeric), note (text)\nTable u: columns = id (integer)"
        );
        assert_eq!(ctx.table_name, "t");

        let rows: Vec<serde_json::Value> = serde_json::from_str(&ctx.sample_rows).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["note"], "a");
    }

    #[tokio::test]
    async fn test_empty_database() {
        let backend: Arc<dyn QueryBackend> = Arc::new(SqliteBackend::in_memory().unwrap());
        let ctx = load_schema_context(Some(&backend), 5).await;
        assert_eq!(ctx.schema_text, "");
        assert_eq!(ctx.table_name, NO_TABLE);
        assert_eq!(ctx.sample_rows, NO_TABLES_SAMPLE);
    }
}
