use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Document '{id}' already exists in namespace '{namespace}'")]
    DuplicateDocument { id: String, namespace: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index sync failed: {0}")]
    IndexSync(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self { Error::Serialization(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;
