//! Error types for the inventory lifecycle service.
//!
//! Every failure a caller can observe maps to a distinguishable JSON-RPC
//! error code so the facades never collapse the taxonomy into a generic
//! internal error.

use thiserror::Error;

/// Main error type for surveyor operations.
#[derive(Debug, Error)]
pub enum SurveyorError {
    /// The datastore is unreachable or the connection is unusable.
    /// Surfaced to the caller, never retried automatically.
    #[error("datastore unavailable: {message}")]
    Connectivity { message: String },

    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("inventory index not found: {id}")]
    NotFound { id: i64 },

    /// Delete attempted while a worker may still be writing the index.
    #[error("inventory index {id} is still running")]
    Conflict { id: i64 },

    #[error("duplicate inventory index id: {id}")]
    DuplicateId { id: i64 },

    /// The crawl body raised. Once the index row exists this is absorbed
    /// into a committed FAILURE status rather than propagated.
    #[error("crawl failed: {message}")]
    CrawlFailure { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for surveyor operations.
pub type Result<T> = std::result::Result<T, SurveyorError>;

impl From<rusqlite::Error> for SurveyorError {
    fn from(err: rusqlite::Error) -> Self {
        SurveyorError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for SurveyorError {
    fn from(err: std::io::Error) -> Self {
        SurveyorError::Connectivity {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SurveyorError {
    fn from(err: serde_json::Error) -> Self {
        SurveyorError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SurveyorError {
    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Datastore connectivity error
    /// - -32001: Index not found
    /// - -32002: Conflict (index still running)
    /// - -32003: Crawl failure
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            SurveyorError::Connectivity { .. } => -32000,
            SurveyorError::NotFound { .. } => -32001,
            SurveyorError::Conflict { .. } => -32002,
            SurveyorError::CrawlFailure { .. } => -32003,
            SurveyorError::InvalidParams { .. } => -32602,
            _ => -32603,
        }
    }

    /// Reconstruct an error from a JSON-RPC error code on the client side.
    ///
    /// `id` is the index id the failed call referenced, where one exists.
    pub fn from_rpc(code: i32, message: String, id: Option<i64>) -> Self {
        match (code, id) {
            (-32000, _) => SurveyorError::Connectivity { message },
            (-32001, Some(id)) => SurveyorError::NotFound { id },
            (-32002, Some(id)) => SurveyorError::Conflict { id },
            (-32003, _) => SurveyorError::CrawlFailure { message },
            (-32602, _) => SurveyorError::InvalidParams { message },
            _ => SurveyorError::Other(message),
        }
    }
}
