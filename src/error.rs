// 🚨 Ingestion Error Taxonomy
// Every failure that can abort a cycle maps to exactly one of these variants.
// Element-level problems inside a well-formed feed never reach this type:
// the parser skips the element and keeps going.

use thiserror::Error;

/// Cycle-aborting errors, surfaced to the scheduler.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Feed unreachable, timed out, or answered with a non-success status
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Payload bytes are not valid under the feed's code page
    #[error("encoding error: payload is not valid {encoding}")]
    Encoding { encoding: &'static str },

    /// Decoded text is not a well-formed XML document
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// Transaction, constraint or commit failure in the store
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl IngestError {
    /// Short stable label, used as a structured logging field
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Transport { .. } => "transport",
            IngestError::Encoding { .. } => "encoding",
            IngestError::MalformedDocument(_) => "malformed_document",
            IngestError::Storage(_) => "storage",
        }
    }
}
