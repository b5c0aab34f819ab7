//! Error types for simulation operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Error, Debug, Clone)]
pub enum ConsensusError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown node n{node} (network has {total} nodes)")]
    UnknownNode { node: usize, total: usize },

    #[error("Unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Prometheus metric error: {0}")]
    Metrics(String),
}

impl From<serde_json::Error> for ConsensusError {
    fn from(e: serde_json::Error) -> Self {
        ConsensusError::Serialization(e.to_string())
    }
}

impl From<prometheus::Error> for ConsensusError {
    fn from(e: prometheus::Error) -> Self {
        ConsensusError::Metrics(e.to_string())
    }
}

impl From<std::io::Error> for ConsensusError {
    fn from(e: std::io::Error) -> Self {
        ConsensusError::Storage(e.to_string())
    }
}
