use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No usable bearer token after the auth retry budget was spent.
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    /// Transport error or unexpected HTTP status after the retry budget was spent.
    #[error("request failed: {0}")]
    RequestFailure(String),
    #[error("fetching {endpoint} failed: {reason}")]
    FetchFailure { endpoint: String, reason: String },
    #[error("downstream request for {entity_id} failed (status {status}): {body}")]
    ReconcileFailure {
        entity_id: String,
        status: u16,
        body: String,
    },
    #[error("Home Assistant unreachable: {0}")]
    ConnectivityFailure(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Error::ConfigError(error.to_string())
    }
}
