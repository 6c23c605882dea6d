//! Error types for the Strata memory substrate
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for ad-hoc propagation at the edges.

use thiserror::Error;

/// Main error type for Strata operations
#[derive(Error, Debug)]
pub enum StrataError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Metadata store reported a failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Chunk not found
    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    /// Relationship rejected before any write
    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    /// Relationship type string did not match the catalogue
    #[error("Unknown relationship type: {0}")]
    UnknownRelationshipType(String),

    /// Chunk type string did not match the catalogue
    #[error("Unknown chunk type: {0}")]
    UnknownChunkType(String),

    /// Maintenance job name did not match any job
    #[error("Unknown maintenance job: {0}")]
    UnknownJob(String),

    /// Retrieval backend or category collaborator failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Strata operations
pub type Result<T> = std::result::Result<T, StrataError>;

impl From<rusqlite::Error> for StrataError {
    fn from(err: rusqlite::Error) -> Self {
        StrataError::Database(err.to_string())
    }
}

/// Convert anyhow::Error to StrataError
impl From<anyhow::Error> for StrataError {
    fn from(err: anyhow::Error) -> Self {
        StrataError::Other(err.to_string())
    }
}
