use thiserror::Error;

use super::config::ConfigError;
use crate::core::lattice::LatticeError;
use crate::core::neighbors::NeighborError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Lattice setup failed: {source}")]
    Lattice {
        #[from]
        source: LatticeError,
    },

    #[error("Invalid neighbor offsets: {source}")]
    Neighbor {
        #[from]
        source: NeighborError,
    },

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("{0}")]
    InvalidOperation(String),

    #[error("Cannot choose an event: the event list is empty")]
    NoEvents,

    #[error("Failed to write output '{path}': {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
