//! Error types
//!
//! Fetch and load failures surface through [`Error`]. Failures while filling a single
//! record field are [`ExtractError`]s and never leave the extraction engine.

use crate::query::QueryError;

/// Crate-level error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport-level failure talking to the upstream site
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status
    #[error("Failed to fetch {url}: {status}")]
    Status { url: String, status: u16 },

    /// Reading a local HTML file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pagination or base URL could not be parsed or joined
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A query expression failed to compile
    #[error(transparent)]
    Query(#[from] QueryError),

    /// No schema is registered under this type name
    #[error("Unknown schema type '{0}'")]
    UnknownSchema(String),

    /// A page record did not have the shape a typed view expects
    #[error("Unexpected page shape: {0}")]
    PageShape(String),

    /// Building a JSON response failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be parsed
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure while extracting or transforming one record field
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("Unknown schema type '{0}'")]
    UnknownSchema(String),

    #[error("Transform failed: {0}")]
    Transform(String),
}

impl From<ExtractError> for Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Query(e) => Error::Query(e),
            ExtractError::UnknownSchema(name) => Error::UnknownSchema(name),
            ExtractError::Transform(msg) => Error::PageShape(msg),
        }
    }
}
