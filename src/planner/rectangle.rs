//! Rectangle planner: isolated squares, then bridging pairs, then singles.

use crate::batch::{Batch, BatchShape};
use crate::error::ApiError;
use crate::grid::{Coord, GridModel, Rect};
use crate::planner::{Plan, PlanBuilder, PlanKind};

/// Plan every non-generated quadrant of `rect`.
///
/// Phase 1 places 2x2 squares greedily in raster order wherever a square
/// touches nothing generated or already planned. Phase 2 repeatedly places
/// the first pair, vertical before horizontal, that leans on a fully
/// generated long side and has free cells at both ends. Phase 3 covers what
/// remains with singles, most-surrounded cell first.
pub fn plan_rectangle(grid: &GridModel, rect: Rect) -> Result<Plan, ApiError> {
    let mut builder = PlanBuilder::new(grid, rect);
    place_squares(&mut builder, &rect);
    place_pairs(&mut builder, &rect);
    place_singles(&mut builder, &rect);
    Ok(builder.finish(PlanKind::Rectangle))
}

fn place_squares(builder: &mut PlanBuilder, rect: &Rect) {
    for y in rect.tl.y..rect.br.y {
        for x in rect.tl.x..rect.br.x {
            let square = Batch::with_shape(Coord::new(x, y), BatchShape::Square);
            if builder.accepts(&square) {
                builder.push(square);
            }
        }
    }
}

fn place_pairs(builder: &mut PlanBuilder, rect: &Rect) {
    loop {
        let next = find_pair(builder, rect, BatchShape::Vertical)
            .or_else(|| find_pair(builder, rect, BatchShape::Horizontal));
        match next {
            Some(pair) => builder.push(pair),
            None => break,
        }
    }
}

fn find_pair(builder: &PlanBuilder, rect: &Rect, shape: BatchShape) -> Option<Batch> {
    rect.points()
        .map(|origin| Batch::with_shape(origin, shape))
        .find(|pair| is_bridge(builder, pair))
}

/// A pair whose ends are free and one of whose long sides is fully covered.
fn is_bridge(builder: &PlanBuilder, pair: &Batch) -> bool {
    if !pair.coords().iter().all(|c| builder.is_open(*c)) {
        return false;
    }
    let Some((a, b)) = pair.long_axis_ends() else {
        return false;
    };
    if builder.is_done(a) || builder.is_done(b) {
        return false;
    }
    let (side_a, side_b) = match pair.shape() {
        BatchShape::Vertical => ((-1, 0), (1, 0)),
        _ => ((0, -1), (0, 1)),
    };
    [side_a, side_b].iter().any(|(dx, dy)| {
        pair.coords()
            .iter()
            .all(|c| builder.is_done(c.offset(*dx, *dy)))
    })
}

fn place_singles(builder: &mut PlanBuilder, rect: &Rect) {
    let mut remaining = builder.open_cells(rect);
    while !remaining.is_empty() {
        // Reversed so ties resolve to the earliest cell in raster order
        let index = remaining
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, c)| builder.grid().count_generated_neighbors(**c))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let cell = remaining.remove(index);
        builder.push(Batch::single(cell));
    }
}
