use loadmatch_common::LoadmatchError;
use loadmatch_graph::GraphError;
use thiserror::Error;

/// Mapping-service failures. Never leave the geometry provider: every one of
/// them turns into the straight-line fallback.
#[derive(Debug, Error)]
pub enum DirectionsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No route found")]
    NoRoute,

    #[error("Maps API key not configured")]
    MissingCredential,
}

impl From<reqwest::Error> for DirectionsError {
    fn from(err: reqwest::Error) -> Self {
        DirectionsError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for DirectionsError {
    fn from(err: serde_json::Error) -> Self {
        DirectionsError::Parse(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("Load {0} not found")]
    NotFound(String),

    #[error("No suitable drivers/vehicles found for load {0}")]
    NoCandidates(String),

    #[error("Load {0} has no pickup or delivery coordinates")]
    IncompleteLoad(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Store error: {0}")]
    Store(#[from] LoadmatchError),
}
