//! Choice of the 2x2 window a batch is rendered in.

use crate::batch::Batch;
use crate::grid::{Coord, GridModel, Rect};
use crate::template::TEMPLATE_QUADRANTS;
use serde::{Deserialize, Serialize};

/// Position of the template window in quadrant coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub origin: Coord,
}

impl Placement {
    /// Pick the window containing `batch` that includes the most generated context.
    ///
    /// Candidates are visited in raster order of their origin; the first
    /// candidate with the highest score wins.
    pub fn choose(batch: &Batch, grid: &GridModel) -> Self {
        let rect = batch.rect();
        let span = TEMPLATE_QUADRANTS as i32 - 1;
        let mut best: Option<(usize, Placement)> = None;
        for oy in (rect.br.y - span)..=rect.tl.y {
            for ox in (rect.br.x - span)..=rect.tl.x {
                let candidate = Placement {
                    origin: Coord::new(ox, oy),
                };
                let score = candidate
                    .footprint()
                    .points()
                    .filter(|c| !batch.contains(*c) && grid.is_generated(*c))
                    .count();
                if best.map_or(true, |(top, _)| score > top) {
                    best = Some((score, candidate));
                }
            }
        }
        best.map(|(_, placement)| placement).unwrap_or(Placement {
            origin: rect.tl,
        })
    }

    /// The quadrants covered by the window.
    pub fn footprint(&self) -> Rect {
        let span = TEMPLATE_QUADRANTS as i32 - 1;
        Rect {
            tl: self.origin,
            br: self.origin.offset(span, span),
        }
    }

    /// Pixel offset of a quadrant's cell inside the canvas.
    pub fn pixel_offset(&self, coord: Coord, quadrant_size: u32) -> (u32, u32) {
        let dx = (coord.x - self.origin.x) as u32;
        let dy = (coord.y - self.origin.y) as u32;
        (dx * quadrant_size, dy * quadrant_size)
    }
}
