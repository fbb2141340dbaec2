//! Static Reference Text
//!
//! Loads the optional plain-text file describing the data (column meanings,
//! units, conventions) that is appended to the system prompt and indexed for
//! retrieval.

use std::path::Path;

/// Read and trim the reference file.
///
/// A missing or unreadable file yields an empty string.
pub fn load_reference_text(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) => text.trim().to_string(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no reference file");
            String::new()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read reference file");
            String::new()
        }
    }
}
