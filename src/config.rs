//! Configuration System
//!
//! Layered configuration: built-in defaults, then the global user file, then
//! workspace files, then `MOSAIC__` environment variables. Validation reports
//! every problem at once.

use crate::endpoint::EndpointConfig;
use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::planner::PlannerConfig;
use crate::queue::QueueConfig;
use crate::template::TemplateConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod merge;
mod sources;

/// Storage paths
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory, relative paths resolve against the workspace
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".mosaic/store")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_store_path(&self, workspace_root: &Path) -> PathBuf {
        if self.store_path.is_absolute() {
            self.store_path.clone()
        } else {
            workspace_root.join(&self.store_path)
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MosaicConfig {
    /// Endpoint started by `run` when none is named
    #[serde(default)]
    pub default_endpoint: Option<String>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub template: TemplateConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    /// Model endpoints by name
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Endpoint(String, String),
    Storage(String),
    Template(String),
    Queue(String),
    Planner(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Endpoint(name, msg) => write!(f, "Endpoint '{}': {}", name, msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Template(msg) => write!(f, "Template: {}", msg),
            ValidationError::Queue(msg) => write!(f, "Queue: {}", msg),
            ValidationError::Planner(msg) => write!(f, "Planner: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl MosaicConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.store_path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }
        if let Err(e) = self.template.validate() {
            errors.push(ValidationError::Template(e));
        }
        if let Err(e) = self.queue.validate() {
            errors.push(ValidationError::Queue(e));
        }
        if let Err(e) = self.planner.validate() {
            errors.push(ValidationError::Planner(e));
        }
        for (name, endpoint) in &self.endpoints {
            if let Err(e) = endpoint.validate() {
                errors.push(ValidationError::Endpoint(name.clone(), e));
            }
        }
        if let Some(name) = &self.default_endpoint {
            if !self.endpoints.contains_key(name) {
                errors.push(ValidationError::Endpoint(
                    name.clone(),
                    "default_endpoint names an endpoint that is not configured".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding all problems into one error.
    pub fn validated(self) -> Result<Self, ApiError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(self)
    }

    /// Enabled endpoints in name order.
    pub fn enabled_endpoints(&self) -> impl Iterator<Item = (&String, &EndpointConfig)> {
        self.endpoints.iter().filter(|(_, e)| e.enabled)
    }
}

/// Loads [`MosaicConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    pub fn load(workspace_root: &Path) -> Result<MosaicConfig, ApiError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = sources::environment::add_to_builder(builder);
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Load configuration from a single explicit file.
    pub fn load_from_file(path: &Path) -> Result<MosaicConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let builder = merge::merge_policy::builder_with_defaults()?
            .add_source(config::File::from(path.to_path_buf()).required(true));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Global config file location, if a home directory can be determined.
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    /// Config written by `mosaic init`.
    pub fn default_toml() -> Result<String, ApiError> {
        let mut config = MosaicConfig::default();
        config.endpoints.insert(
            "local".to_string(),
            EndpointConfig {
                url: "http://localhost:8888/edit-b64".to_string(),
                ..EndpointConfig::default()
            },
        );
        config.default_endpoint = Some("local".to_string());
        toml::to_string_pretty(&config)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}
