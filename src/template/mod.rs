//! Template Codec
//!
//! Builds the composite image sent to a model endpoint for one batch and
//! extracts per-quadrant results from the endpoint's response. Every template
//! covers a 2x2 quadrant window; the batch occupies part or all of it and the
//! remaining cells carry generated context or reference pixels.

pub mod codec;
pub mod placement;

use crate::error::ApiError;
use crate::grid::Coord;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub use codec::{
    build_template, decode_image, encode_png, extract_outputs, split_into_quadrants, Template,
};
pub use placement::Placement;

/// Side length of a template window, in quadrants.
pub const TEMPLATE_QUADRANTS: u32 = 2;

/// Pixel geometry and border styling of templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Edge length of one quadrant in pixels
    #[serde(default = "default_quadrant_size")]
    pub quadrant_size: u32,

    /// Width of the outline drawn around the batch region; 0 disables it
    #[serde(default = "default_border_width")]
    pub border_width: u32,

    /// RGBA color of the outline
    #[serde(default = "default_border_color")]
    pub border_color: [u8; 4],
}

fn default_quadrant_size() -> u32 {
    512
}

fn default_border_width() -> u32 {
    2
}

fn default_border_color() -> [u8; 4] {
    [255, 0, 0, 255]
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            quadrant_size: default_quadrant_size(),
            border_width: default_border_width(),
            border_color: default_border_color(),
        }
    }
}

impl TemplateConfig {
    /// Edge length of the full template canvas in pixels.
    pub fn canvas_size(&self) -> u32 {
        self.quadrant_size * TEMPLATE_QUADRANTS
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.quadrant_size == 0 {
            return Err("quadrant_size must be greater than zero".to_string());
        }
        if self.border_width * 2 >= self.quadrant_size {
            return Err(format!(
                "border_width {} must be less than half of quadrant_size {}",
                self.border_width, self.quadrant_size
            ));
        }
        Ok(())
    }
}

/// Source of per-quadrant pixels.
///
/// Reference pixels are the "to be painted" input; generation pixels are the
/// model output stored for quadrants that have already been generated.
pub trait PixelSource {
    fn reference(&self, coord: Coord) -> Result<Option<RgbaImage>, ApiError>;
    fn generation(&self, coord: Coord) -> Result<Option<RgbaImage>, ApiError>;
}
