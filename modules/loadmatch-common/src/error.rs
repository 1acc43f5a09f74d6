use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadmatchError {
    /// Bus or store connectivity. Recovered through redelivery, never retried in-process.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<serde_json::Error> for LoadmatchError {
    fn from(err: serde_json::Error) -> Self {
        LoadmatchError::Decode(err.to_string())
    }
}
