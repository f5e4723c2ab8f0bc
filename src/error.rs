//! Error types for the gateway. Kinds follow spec §7 "Error handling design".

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway.
///
/// Each variant corresponds to one of the kinds named in spec §7:
/// `Config`, `Validation`, `Evaluation`, `Upstream`, `Decoding`, `Batching`,
/// plus the ambient `Io`/`Serialization`/`Other` carried over from the
/// teacher's error enum.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration or directive, reported once at publish/check time.
    #[error("config error: {0}")]
    Config(String),

    /// GraphQL document fails to parse/validate against the schema.
    #[error("validation error: {0}")]
    Validation(String),

    /// Runtime failure inside an `Expression` (type mismatch, missing
    /// binding, divide-by-zero, explicit `die`).
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// HTTP non-2xx, connection refused, timeout, or malformed JSON body
    /// from an upstream call.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Upstream response does not match the field's declared output schema.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A batched upstream call failed; carried verbatim to every logical
    /// caller in that batch window.
    #[error("batching error: {0}")]
    Batching(String),

    /// Authentication/authorization errors (`@protected`).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Serialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error.
    #[error("error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Produce an owned copy carrying the same message and, for our own
    /// variants, the same kind. Needed where an `Arc<Error>` is shared across
    /// multiple callers (e.g. deduped/batched `DataLoader` calls) and each
    /// caller needs its own owned `Error` to return.
    pub fn duplicate(&self) -> Error {
        match self {
            Error::Config(s) => Error::Config(s.clone()),
            Error::Validation(s) => Error::Validation(s.clone()),
            Error::Evaluation(s) => Error::Evaluation(s.clone()),
            Error::Upstream(s) => Error::Upstream(s.clone()),
            Error::Decoding(s) => Error::Decoding(s.clone()),
            Error::Batching(s) => Error::Batching(s.clone()),
            Error::Unauthorized(s) => Error::Unauthorized(s.clone()),
            other => Error::Upstream(other.to_string()),
        }
    }

    /// Convert error to GraphQL error format
    pub fn to_graphql_error(&self) -> GraphQLError {
        GraphQLError {
            message: self.to_string(),
            extensions: self.extensions(),
        }
    }

    /// Get error code for extensions
    fn extensions(&self) -> std::collections::HashMap<String, serde_json::Value> {
        let mut map = std::collections::HashMap::new();
        let code = match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Evaluation(_) => "EVALUATION_ERROR",
            Error::Upstream(_) => "UPSTREAM_ERROR",
            Error::Decoding(_) => "DECODING_ERROR",
            Error::Batching(_) => "BATCHING_ERROR",
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        };
        map.insert("code".to_string(), serde_json::json!(code));
        map
    }
}

/// GraphQL error response format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "std::collections::HashMap::is_empty")]
    pub extensions: std::collections::HashMap<String, serde_json::Value>,
}

impl From<Error> for GraphQLError {
    fn from(err: Error) -> Self {
        err.to_graphql_error()
    }
}
