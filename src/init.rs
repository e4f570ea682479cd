//! Workspace initialization for `mosaic init`.
//!
//! Writes a starter `config/config.toml` and creates the store directory.
//! Existing files are left alone unless `force` is set.

use crate::config::{ConfigLoader, MosaicConfig};
use crate::error::ApiError;
use std::path::Path;

/// Result of initialization operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitResult {
    pub created: Vec<String>,
    pub skipped: Vec<String>,
}

/// Initialize a workspace rooted at `workspace_root`.
pub fn initialize_workspace(workspace_root: &Path, force: bool) -> Result<InitResult, ApiError> {
    let mut result = InitResult::default();

    let config_dir = workspace_root.join("config");
    let config_file = config_dir.join("config.toml");
    if config_file.exists() && !force {
        result.skipped.push(config_file.display().to_string());
    } else {
        std::fs::create_dir_all(&config_dir).map_err(|e| {
            ApiError::ConfigError(format!("Failed to create {}: {}", config_dir.display(), e))
        })?;
        std::fs::write(&config_file, ConfigLoader::default_toml()?).map_err(|e| {
            ApiError::ConfigError(format!("Failed to write {}: {}", config_file.display(), e))
        })?;
        result.created.push(config_file.display().to_string());
    }

    let store_path = MosaicConfig::default()
        .storage
        .resolve_store_path(workspace_root);
    if store_path.exists() {
        result.skipped.push(store_path.display().to_string());
    } else {
        std::fs::create_dir_all(&store_path).map_err(|e| {
            ApiError::ConfigError(format!("Failed to create {}: {}", store_path.display(), e))
        })?;
        result.created.push(store_path.display().to_string());
    }

    Ok(result)
}
