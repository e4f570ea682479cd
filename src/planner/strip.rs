//! Strip planner: fill a band that borders generated content along one side.
//!
//! Work is expressed in a local frame: `a` runs parallel to the generation
//! edge (0..len) and `d` is the distance from it (0..depth).

use crate::batch::{Batch, BatchShape};
use crate::error::ApiError;
use crate::grid::{Coord, Edge, GridModel, Rect};
use crate::planner::{Plan, PlanBuilder, PlanKind};

/// Plan `rect` as a strip growing away from its single generated edge.
pub fn plan_strip(grid: &GridModel, rect: Rect) -> Result<Plan, ApiError> {
    let edge = find_generation_edge(grid, &rect)?;
    let mut builder = PlanBuilder::new(grid, rect);
    plan_band(&mut builder, rect, edge);
    Ok(builder.finish(PlanKind::Strip))
}

/// Locate the side of `rect` whose exterior neighbors are all generated.
///
/// Long sides are considered first; short sides only when no long side
/// qualifies. Two qualifying sides of the same rank are ambiguous.
pub fn find_generation_edge(grid: &GridModel, rect: &Rect) -> Result<Edge, ApiError> {
    let (long, short) = if rect.width() >= rect.height() {
        ([Edge::Top, Edge::Bottom], [Edge::Left, Edge::Right])
    } else {
        ([Edge::Left, Edge::Right], [Edge::Top, Edge::Bottom])
    };
    let fully_generated =
        |edge: &Edge| rect.exterior(*edge).iter().all(|c| grid.is_generated(*c));

    for sides in [long, short] {
        let found: Vec<Edge> = sides.into_iter().filter(fully_generated).collect();
        match found.as_slice() {
            [edge] => return Ok(*edge),
            [a, b] => {
                return Err(ApiError::AmbiguousGenerationEdge(format!(
                    "strip {} has generated neighbors on both the {} and {} sides",
                    rect, a, b
                )))
            }
            _ => {}
        }
    }
    Err(ApiError::NoGenerationEdge(format!(
        "no side of strip {} is fully bordered by generated quadrants",
        rect
    )))
}

/// Plan every open cell of `rect`, assuming context lies beyond `edge`.
pub(crate) fn plan_band(builder: &mut PlanBuilder, rect: Rect, edge: Edge) {
    let frame = StripFrame::new(rect, edge);
    let full_bands = frame.depth / 3;
    for band in 0..full_bands {
        plan_deep_band(builder, &frame, band * 3);
    }
    let start = full_bands * 3;
    for d in start..frame.depth {
        plan_row(builder, &frame, d);
    }
    builder.fill_singles(&rect);
}

/// One row: pairs with one-cell gaps, then singles in the gaps.
fn plan_row(builder: &mut PlanBuilder, frame: &StripFrame, d: i32) {
    let mut a = if builder.is_done(frame.at(-1, d)) { 1 } else { 0 };
    while a + 1 < frame.len {
        builder.push(frame.along_pair(a, d));
        a += 3;
    }
    for a in 0..frame.len {
        if builder.is_open(frame.at(a, d)) {
            builder.push(Batch::single(frame.at(a, d)));
        }
    }
}

/// Three rows starting at `d`: squares in the two far rows, bridges between
/// them, then the near row as a plain row.
fn plan_deep_band(builder: &mut PlanBuilder, frame: &StripFrame, d: i32) {
    let (r1, r2) = (d + 1, d + 2);
    let start = if builder.is_done(frame.at(-1, r1)) || builder.is_done(frame.at(-1, r2)) {
        1
    } else {
        0
    };
    let end = if builder.is_done(frame.at(frame.len, r1)) || builder.is_done(frame.at(frame.len, r2))
    {
        frame.len - 1
    } else {
        frame.len
    };

    let mut a = start;
    while a + 1 < end {
        builder.push(frame.square(a, r1));
        a += 3;
    }
    for a in 0..frame.len {
        if builder.is_open(frame.at(a, r1)) && builder.is_open(frame.at(a, r2)) {
            builder.push(frame.deep_pair(a, r1));
        }
    }
    plan_row(builder, frame, d);
}

/// Mapping between strip-local `(a, d)` and grid coordinates.
struct StripFrame {
    rect: Rect,
    edge: Edge,
    len: i32,
    depth: i32,
}

impl StripFrame {
    fn new(rect: Rect, edge: Edge) -> Self {
        let (len, depth) = if edge.is_horizontal() {
            (rect.width(), rect.height())
        } else {
            (rect.height(), rect.width())
        };
        Self {
            rect,
            edge,
            len,
            depth,
        }
    }

    fn at(&self, a: i32, d: i32) -> Coord {
        let Rect { tl, br } = self.rect;
        match self.edge {
            Edge::Top => Coord::new(tl.x + a, tl.y + d),
            Edge::Bottom => Coord::new(tl.x + a, br.y - d),
            Edge::Left => Coord::new(tl.x + d, tl.y + a),
            Edge::Right => Coord::new(br.x - d, tl.y + a),
        }
    }

    /// Two cells side by side along the edge.
    fn along_pair(&self, a: i32, d: i32) -> Batch {
        let first = self.at(a, d);
        if self.edge.is_horizontal() {
            Batch::with_shape(first, BatchShape::Horizontal)
        } else {
            Batch::with_shape(first, BatchShape::Vertical)
        }
    }

    /// Two cells stacked away from the edge, starting at depth `d`.
    fn deep_pair(&self, a: i32, d: i32) -> Batch {
        let origin = min_coord(self.at(a, d), self.at(a, d + 1));
        if self.edge.is_horizontal() {
            Batch::with_shape(origin, BatchShape::Vertical)
        } else {
            Batch::with_shape(origin, BatchShape::Horizontal)
        }
    }

    fn square(&self, a: i32, d: i32) -> Batch {
        let corners = [self.at(a, d), self.at(a + 1, d + 1)];
        let origin = Coord::new(
            corners[0].x.min(corners[1].x),
            corners[0].y.min(corners[1].y),
        );
        Batch::with_shape(origin, BatchShape::Square)
    }
}

fn min_coord(a: Coord, b: Coord) -> Coord {
    Coord::new(a.x.min(b.x), a.y.min(b.y))
}
