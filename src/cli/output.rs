//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::Conflict(_) | ApiError::IllegalBatch(_) => format!("rejected: {}", e),
        ApiError::ConfigError(_) | ApiError::EndpointNotConfigured(_) => {
            format!("configuration: {}", e)
        }
        _ => e.to_string(),
    }
}
