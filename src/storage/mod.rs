//! Storage Layer
//!
//! Handles data access: the query backends (PostgreSQL, SQLite), database
//! selection, schema introspection, and the JSON config file.

pub mod config;
pub mod connection;
pub mod postgres;
pub mod schema;
pub mod sqlite;

pub use config::*;
pub use connection::*;
pub use postgres::*;
pub use schema::*;
pub use sqlite::*;
