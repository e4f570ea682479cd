//! Model Endpoints
//!
//! Abstract contract for the external image model: a template image and a
//! prompt go in, a single image of identical dimensions comes out. The HTTP
//! implementation speaks a small JSON protocol with base64-encoded images.

use crate::error::ApiError;
use crate::template::{decode_image, encode_png};
use async_trait::async_trait;
use base64::Engine;
use image::RgbaImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Prompt used when neither the job nor the endpoint supplies one.
pub const DEFAULT_PROMPT: &str = "Fill in the outlined section with the missing pixels, \
    removing the border and exactly following the shape, style and structure of the \
    surrounding image (if present).";

/// Per-endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Full URL of the generation route
    #[serde(default)]
    pub url: String,

    /// Environment variable holding a bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,

    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default)]
    pub default_prompt: Option<String>,

    #[serde(default)]
    pub default_negative_prompt: Option<String>,

    /// Overrides the queue-wide invocation timeout
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_inference_steps() -> u32 {
    28
}

fn default_true() -> bool {
    true
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: None,
            num_inference_steps: default_inference_steps(),
            seed: None,
            default_prompt: None,
            default_negative_prompt: None,
            timeout_secs: None,
            enabled: true,
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("url cannot be empty".to_string());
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("url '{}' must start with http:// or https://", self.url));
        }
        if self.num_inference_steps == 0 {
            return Err("num_inference_steps must be greater than zero".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Everything an endpoint needs for one invocation.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub template: RgbaImage,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub num_inference_steps: u32,
    pub seed: Option<u64>,
}

/// External image model.
#[async_trait]
pub trait ModelEndpoint: Send + Sync {
    /// Identity used for job affinity and worker naming.
    fn name(&self) -> &str;

    /// Run the model on a template.
    async fn generate(&self, request: EndpointRequest) -> Result<RgbaImage, ApiError>;
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    image_b64: String,
    prompt: &'a str,
    negative_prompt: Option<&'a str>,
    steps: u32,
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    image_b64: String,
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        match status.as_u16() {
            401 | 403 => ApiError::EndpointAuthFailed(format!("Authentication failed: {}", error)),
            429 => ApiError::EndpointRateLimit(format!("Rate limit exceeded: {}", error)),
            404 => ApiError::EndpointRequestFailed(format!("Route not found: {}", error)),
            _ => ApiError::EndpointRequestFailed(format!(
                "Request failed with status {}: {}",
                status, error
            )),
        }
    } else if error.is_timeout() {
        ApiError::EndpointRequestFailed(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::EndpointRequestFailed(format!("Connection error: {}", error))
    } else if error.is_decode() {
        ApiError::EndpointError(format!("Invalid response body: {}", error))
    } else {
        ApiError::EndpointError(format!("HTTP error: {}", error))
    }
}

const ENDPOINT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_endpoint_http_client(request_timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(ENDPOINT_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ApiError::EndpointError(format!("Failed to create HTTP client: {}", e)))
}

/// Endpoint reached over HTTP with base64 JSON payloads.
pub struct HttpEndpoint {
    name: String,
    url: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEndpoint {
    /// Build a client for `config`; `request_timeout` bounds each HTTP call.
    pub fn new(
        name: impl Into<String>,
        config: &EndpointConfig,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let name = name.into();
        config
            .validate()
            .map_err(|e| ApiError::EndpointNotConfigured(format!("{}: {}", name, e)))?;
        let api_key = match &config.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                ApiError::EndpointNotConfigured(format!(
                    "{}: environment variable {} is not set",
                    name, var
                ))
            })?),
            None => None,
        };
        Ok(Self {
            client: build_endpoint_http_client(request_timeout)?,
            url: config.url.clone(),
            api_key,
            name,
        })
    }
}

#[async_trait]
impl ModelEndpoint for HttpEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        let engine = base64::engine::general_purpose::STANDARD;
        let body = GenerateBody {
            image_b64: engine.encode(encode_png(&request.template)?),
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            steps: request.num_inference_steps,
            seed: request.seed,
        };

        let started = Instant::now();
        let mut http_request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }
        let response: GenerateResponse = http_request
            .send()
            .await
            .map_err(map_http_error)?
            .error_for_status()
            .map_err(map_http_error)?
            .json()
            .await
            .map_err(map_http_error)?;

        debug!(
            endpoint = %self.name,
            duration_ms = started.elapsed().as_millis() as u64,
            "Endpoint responded"
        );

        let bytes = engine
            .decode(response.image_b64.as_bytes())
            .map_err(|e| ApiError::EndpointError(format!("Invalid base64 image: {}", e)))?;
        decode_image(&bytes)
    }
}
