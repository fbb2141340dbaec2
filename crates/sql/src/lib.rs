//! askdb SQL
//!
//! Everything between a model's raw reply and a set of row results:
//! - `safety`: the read-only statement gate
//! - `decision`: decision parsing and SQL fallback extraction
//! - `literal`: permissive parsing of Python-style literals
//! - `executor`: the `QueryBackend` trait and the error-isolating executor

pub mod decision;
pub mod executor;
pub mod literal;
pub mod safety;

pub use decision::{
    extract_sql_fallback, normalize_statement, parse_decision, parse_decision_detailed,
    strip_code_fences, Decision, ParseStrategy, ParsedDecision,
};
pub use executor::{
    BackendError, ColumnInfo, ExecutionReport, QueryBackend, QueryResult, Row, SqlExecutor,
    StatementOutcome, TableSchema, NOT_CONFIGURED_MESSAGE, QUERY_BLOCKED_MESSAGE,
};
pub use safety::is_safe;
