//! Template compositing and output extraction.

use crate::batch::Batch;
use crate::error::ApiError;
use crate::grid::{Coord, GridModel};
use crate::template::{PixelSource, Placement, TemplateConfig};
use image::imageops::{self, FilterType};
use image::{ImageOutputFormat, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::io::Cursor;
use tracing::debug;

/// A rendered template and the window it was rendered for.
#[derive(Debug, Clone)]
pub struct Template {
    pub image: RgbaImage,
    pub placement: Placement,
}

/// Composite the model input for `batch`.
///
/// Batch cells receive reference pixels. Other cells in the window receive
/// stored generation pixels when generated, otherwise reference pixels. An
/// outline is then painted over the batch region.
pub fn build_template(
    batch: &Batch,
    grid: &GridModel,
    pixels: &dyn PixelSource,
    config: &TemplateConfig,
) -> Result<Template, ApiError> {
    let placement = Placement::choose(batch, grid);
    let size = config.canvas_size();
    let mut canvas = RgbaImage::new(size, size);

    for coord in placement.footprint().points() {
        let tile = if batch.contains(coord) {
            Some(
                pixels
                    .reference(coord)?
                    .ok_or(ApiError::MissingReference(coord))?,
            )
        } else if grid.is_generated(coord) {
            match pixels.generation(coord)? {
                Some(tile) => Some(tile),
                None => {
                    debug!(coord = %coord, "No stored generation for context cell, using reference");
                    pixels.reference(coord)?
                }
            }
        } else {
            pixels.reference(coord)?
        };

        if let Some(tile) = tile {
            let tile = fit_to_quadrant(tile, config.quadrant_size);
            let (px, py) = placement.pixel_offset(coord, config.quadrant_size);
            imageops::replace(&mut canvas, &tile, px as i64, py as i64);
        }
    }

    draw_border(&mut canvas, batch, &placement, config);

    Ok(Template {
        image: canvas,
        placement,
    })
}

/// Crop each batch quadrant out of an endpoint response.
pub fn extract_outputs(
    image: &RgbaImage,
    batch: &Batch,
    placement: &Placement,
    config: &TemplateConfig,
) -> Result<BTreeMap<Coord, RgbaImage>, ApiError> {
    let size = config.canvas_size();
    if image.dimensions() != (size, size) {
        return Err(ApiError::MalformedOutput {
            expected: (size, size),
            actual: image.dimensions(),
        });
    }

    let q = config.quadrant_size;
    let mut outputs = BTreeMap::new();
    for &coord in batch.coords() {
        let (px, py) = placement.pixel_offset(coord, q);
        let cell = imageops::crop_imm(image, px, py, q, q).to_image();
        outputs.insert(coord, fit_to_quadrant(cell, q));
    }
    Ok(outputs)
}

fn fit_to_quadrant(tile: RgbaImage, quadrant_size: u32) -> RgbaImage {
    if tile.dimensions() == (quadrant_size, quadrant_size) {
        tile
    } else {
        imageops::resize(&tile, quadrant_size, quadrant_size, FilterType::Lanczos3)
    }
}

/// Paint a rectangle outline just inside the batch region.
fn draw_border(canvas: &mut RgbaImage, batch: &Batch, placement: &Placement, config: &TemplateConfig) {
    let width = config.border_width;
    if width == 0 {
        return;
    }
    let rect = batch.rect();
    let q = config.quadrant_size;
    let (x0, y0) = placement.pixel_offset(rect.tl, q);
    let x1 = x0 + rect.width() as u32 * q;
    let y1 = y0 + rect.height() as u32 * q;
    let color = Rgba(config.border_color);

    for y in y0..y1 {
        for x in x0..x1 {
            let on_edge = x < x0 + width || x >= x1 - width || y < y0 + width || y >= y1 - width;
            if on_edge {
                canvas.put_pixel(x, y, color);
            }
        }
    }
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// Decode PNG, JPEG or any other supported format into RGBA.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, ApiError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Cut a large image into quadrant tiles anchored at `tl`.
///
/// Partial tiles at the right and bottom edges are dropped.
pub fn split_into_quadrants(
    image: &RgbaImage,
    tl: Coord,
    quadrant_size: u32,
) -> Vec<(Coord, RgbaImage)> {
    let cols = image.width() / quadrant_size;
    let rows = image.height() / quadrant_size;
    let mut tiles = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            let tile = imageops::crop_imm(
                image,
                col * quadrant_size,
                row * quadrant_size,
                quadrant_size,
                quadrant_size,
            )
            .to_image();
            tiles.push((tl.offset(col as i32, row as i32), tile));
        }
    }
    tiles
}
