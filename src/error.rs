//! Error types for the quadrant planning and generation engine.

use crate::grid::Coord;
use crate::queue::{JobId, JobStatus};
use std::time::Duration;
use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Image codec error: {0}")]
    Image(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors surfaced by planning, validation, codec and queue operations
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("No generation edge: {0}")]
    NoGenerationEdge(String),

    #[error("Ambiguous generation edge: {0}")]
    AmbiguousGenerationEdge(String),

    #[error("Illegal batch: {0}")]
    IllegalBatch(String),

    #[error("Conflict: quadrants already generated: {}", format_coords(.0))]
    Conflict(Vec<Coord>),

    #[error("Malformed output: expected {expected:?}, got {actual:?}")]
    MalformedOutput {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Invalid target area: {0}")]
    InvalidArea(String),

    #[error("Missing reference pixels for quadrant {0}")]
    MissingReference(Coord),

    #[error("Endpoint error: {0}")]
    EndpointError(String),

    #[error("Endpoint request failed: {0}")]
    EndpointRequestFailed(String),

    #[error("Endpoint authentication failed: {0}")]
    EndpointAuthFailed(String),

    #[error("Endpoint rate limit exceeded: {0}")]
    EndpointRateLimit(String),

    #[error("Endpoint not configured: {0}")]
    EndpointNotConfigured(String),

    #[error("Endpoint timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {id} is {status}, operation not allowed")]
    InvalidJobState { id: JobId, status: JobStatus },

    #[error("Queue is full ({0} jobs)")]
    QueueFull(usize),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

fn format_coords(coords: &[Coord]) -> String {
    coords
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<image::ImageError> for ApiError {
    fn from(err: image::ImageError) -> Self {
        ApiError::StorageError(StorageError::Image(err.to_string()))
    }
}

impl From<sled::Error> for ApiError {
    fn from(err: sled::Error) -> Self {
        ApiError::StorageError(err.into())
    }
}
