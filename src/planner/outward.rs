//! Outward planner: grow an existing generated region to fill a bounding box.

use crate::batch::{Batch, BatchShape};
use crate::error::ApiError;
use crate::grid::{Coord, Edge, GridModel, Rect};
use crate::planner::strip::plan_band;
use crate::planner::{Plan, PlanBuilder, PlanKind};

/// Deepest band planned per expansion step.
const MAX_BAND_DEPTH: i32 = 3;

/// Plan `target` by first squaring off the generated region inside it, then
/// expanding that rectangle top, right, bottom, left until it covers `target`.
pub fn plan_outward(grid: &GridModel, target: Rect) -> Result<Plan, ApiError> {
    let Some(mut current) = grid.generated_bounds(Some(&target)) else {
        return Err(ApiError::NoGenerationEdge(format!(
            "no generated quadrants inside {} to grow from",
            target
        )));
    };

    let mut builder = PlanBuilder::new(grid, target);
    fill_interior(&mut builder, &current);

    while current != target {
        for edge in [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left] {
            let gap = match edge {
                Edge::Top => current.tl.y - target.tl.y,
                Edge::Right => target.br.x - current.br.x,
                Edge::Bottom => target.br.y - current.br.y,
                Edge::Left => current.tl.x - target.tl.x,
            };
            if gap <= 0 {
                continue;
            }
            let depth = gap.min(MAX_BAND_DEPTH);
            let (band, context_side) = match edge {
                Edge::Top => (
                    Rect {
                        tl: Coord::new(current.tl.x, current.tl.y - depth),
                        br: Coord::new(current.br.x, current.tl.y - 1),
                    },
                    Edge::Bottom,
                ),
                Edge::Right => (
                    Rect {
                        tl: Coord::new(current.br.x + 1, current.tl.y),
                        br: Coord::new(current.br.x + depth, current.br.y),
                    },
                    Edge::Left,
                ),
                Edge::Bottom => (
                    Rect {
                        tl: Coord::new(current.tl.x, current.br.y + 1),
                        br: Coord::new(current.br.x, current.br.y + depth),
                    },
                    Edge::Top,
                ),
                Edge::Left => (
                    Rect {
                        tl: Coord::new(current.tl.x - depth, current.tl.y),
                        br: Coord::new(current.tl.x - 1, current.br.y),
                    },
                    Edge::Right,
                ),
            };
            plan_band(&mut builder, band, context_side);
            current = Rect::bounding([current.tl, current.br, band.tl, band.br])
                .unwrap_or(current);
        }
    }

    builder.fill_singles(&target);
    Ok(builder.finish(PlanKind::Outward))
}

/// Fill the holes of the starting rectangle, best-surrounded cells first.
///
/// A cell is paired with a neighbor when the pair leans on a fully generated
/// long side and both of its ends are still empty; otherwise it goes alone.
fn fill_interior(builder: &mut PlanBuilder, rect: &Rect) {
    loop {
        let open = builder.open_cells(rect);
        let Some(cell) = open
            .iter()
            .rev()
            .max_by_key(|c| builder.grid().count_generated_neighbors(**c))
            .copied()
        else {
            break;
        };
        let pair = partners(cell)
            .into_iter()
            .filter(|(partner, _)| rect.contains(*partner))
            .filter_map(|(partner, shape)| {
                let origin = Coord::new(cell.x.min(partner.x), cell.y.min(partner.y));
                let pair = Batch::with_shape(origin, shape);
                leans_on_context(builder, &pair).then_some(pair)
            })
            .next();
        builder.push(pair.unwrap_or_else(|| Batch::single(cell)));
    }
}

fn partners(cell: Coord) -> [(Coord, BatchShape); 4] {
    [
        (cell.offset(1, 0), BatchShape::Horizontal),
        (cell.offset(0, 1), BatchShape::Vertical),
        (cell.offset(-1, 0), BatchShape::Horizontal),
        (cell.offset(0, -1), BatchShape::Vertical),
    ]
}

fn leans_on_context(builder: &PlanBuilder, pair: &Batch) -> bool {
    if !builder.accepts(pair) {
        return false;
    }
    let Some((a, b)) = pair.long_axis_ends() else {
        return false;
    };
    if builder.is_done(a) || builder.is_done(b) {
        return false;
    }
    let sides: [(i32, i32); 2] = if pair.shape() == BatchShape::Vertical {
        [(-1, 0), (1, 0)]
    } else {
        [(0, -1), (0, 1)]
    };
    sides.iter().any(|(dx, dy)| {
        pair.coords()
            .iter()
            .all(|c| builder.is_done(c.offset(*dx, *dy)))
    })
}
