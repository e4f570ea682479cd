//! Shared test utilities for integration tests
//!
//! Mock model endpoints plus helpers that open a service over a temporary
//! store with small 8px quadrants.

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use mosaic::api::GenerationService;
use mosaic::config::MosaicConfig;
use mosaic::endpoint::{EndpointConfig, EndpointRequest, ModelEndpoint};
use mosaic::error::ApiError;
use mosaic::grid::{Coord, Rect};
use mosaic::queue::{GenerationQueue, QueueConfig};
use mosaic::template::TemplateConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const QUADRANT: u32 = 8;
pub const REFERENCE_COLOR: [u8; 4] = [40, 80, 120, 255];

pub fn c(x: i32, y: i32) -> Coord {
    Coord::new(x, y)
}

pub fn rect(tl: (i32, i32), br: (i32, i32)) -> Rect {
    Rect::new(c(tl.0, tl.1), c(br.0, br.1)).unwrap()
}

pub fn solid(size: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(size, size, Rgba(color))
}

pub fn template_config() -> TemplateConfig {
    TemplateConfig {
        quadrant_size: QUADRANT,
        border_width: 1,
        border_color: [255, 0, 0, 255],
    }
}

pub fn test_config() -> MosaicConfig {
    MosaicConfig {
        template: template_config(),
        queue: QueueConfig {
            invocation_timeout_secs: 5,
            poll_interval_ms: 10,
            ..QueueConfig::default()
        },
        ..MosaicConfig::default()
    }
}

/// A service over a fresh store. Keep the `TempDir` alive for the test.
pub fn create_test_service() -> (GenerationService, TempDir) {
    create_test_service_with_config(test_config())
}

pub fn create_test_service_with_config(config: MosaicConfig) -> (GenerationService, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let service = GenerationService::open(temp_dir.path(), config).unwrap();
    (service, temp_dir)
}

/// Store solid reference tiles for every quadrant of `area`.
pub fn seed_references(service: &GenerationService, area: Rect) {
    for coord in area.points() {
        service
            .import_reference(coord, &solid(QUADRANT, REFERENCE_COLOR))
            .unwrap();
    }
}

/// A queue over the service's store with the given endpoints registered.
pub fn create_queue(
    service: &GenerationService,
    endpoints: Vec<Arc<dyn ModelEndpoint>>,
) -> GenerationQueue {
    let queue = GenerationQueue::new(
        Arc::clone(service.store()),
        service.config().template.clone(),
        service.config().queue.clone(),
    );
    for endpoint in endpoints {
        queue
            .register_endpoint(endpoint, EndpointConfig::default())
            .unwrap();
    }
    queue
}

/// Paints the whole canvas one color, optionally after a delay.
pub struct PaintEndpoint {
    name: String,
    color: [u8; 4],
    delay: Duration,
    calls: AtomicUsize,
}

impl PaintEndpoint {
    pub fn new(name: &str, color: [u8; 4]) -> Arc<Self> {
        Self::with_delay(name, color, Duration::ZERO)
    }

    pub fn with_delay(name: &str, color: [u8; 4], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            color,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelEndpoint for PaintEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let (w, h) = request.template.dimensions();
        Ok(RgbaImage::from_pixel(w, h, Rgba(self.color)))
    }
}

/// Records every request and returns the template unchanged.
pub struct EchoEndpoint {
    name: String,
    pub requests: parking_lot::Mutex<Vec<EndpointRequest>>,
}

impl EchoEndpoint {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            requests: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ModelEndpoint for EchoEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        let image = request.template.clone();
        self.requests.lock().push(request);
        Ok(image)
    }
}

/// Always fails with a request error.
pub struct FailingEndpoint {
    name: String,
}

impl FailingEndpoint {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

#[async_trait]
impl ModelEndpoint for FailingEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        Err(ApiError::EndpointRequestFailed(
            "HTTP 500: model crashed".to_string(),
        ))
    }
}

/// Returns an image of the wrong size.
pub struct WrongSizeEndpoint;

#[async_trait]
impl ModelEndpoint for WrongSizeEndpoint {
    fn name(&self) -> &str {
        "wrong-size"
    }

    async fn generate(&self, _request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        Ok(RgbaImage::new(3, 3))
    }
}

/// Blocks inside `generate` until released.
pub struct GatedEndpoint {
    pub entered: Notify,
    pub release: Notify,
}

impl GatedEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl ModelEndpoint for GatedEndpoint {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(&self, request: EndpointRequest) -> Result<RgbaImage, ApiError> {
        self.entered.notify_one();
        self.release.notified().await;
        let (w, h) = request.template.dimensions();
        Ok(RgbaImage::from_pixel(w, h, Rgba([0, 255, 0, 255])))
    }
}
