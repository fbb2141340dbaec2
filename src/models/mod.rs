//! Data Models
//!
//! Contains the data structures shared across services.

pub mod session;
pub mod settings;

pub use session::*;
pub use settings::*;
