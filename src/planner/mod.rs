//! Batch Planners
//!
//! Pure functions from a grid snapshot and a target area to an ordered list
//! of batches. Planners simulate the grid forward as they go: every batch is
//! checked against the state left by the batches before it, so executing a
//! plan in order never submits an illegal batch.

pub mod outward;
pub mod rectangle;
pub mod strip;

use crate::batch::{check_legality, Batch, BatchShape};
use crate::error::ApiError;
use crate::grid::{Coord, GridModel, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use outward::plan_outward;
pub use rectangle::plan_rectangle;
pub use strip::plan_strip;

/// Which planner produces a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    Strip,
    Rectangle,
    Outward,
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanKind::Strip => "strip",
            PlanKind::Rectangle => "rectangle",
            PlanKind::Outward => "outward",
        };
        f.write_str(name)
    }
}

impl FromStr for PlanKind {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strip" => Ok(PlanKind::Strip),
            "rect" | "rectangle" => Ok(PlanKind::Rectangle),
            "grow" | "outward" | "spiral" => Ok(PlanKind::Outward),
            other => Err(ApiError::InvalidArea(format!(
                "Unknown plan kind '{}' (expected strip, rect or grow)",
                other
            ))),
        }
    }
}

/// Hard ceiling on the number of quadrants in one target area.
pub const MAX_TARGET_AREA: usize = 1 << 24;

/// Planning limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Largest target area, in quadrants, the service will plan
    #[serde(default = "default_max_area")]
    pub max_area: usize,
}

fn default_max_area() -> usize {
    1 << 20
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_area: default_max_area(),
        }
    }
}

impl PlannerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_area == 0 || self.max_area > MAX_TARGET_AREA {
            return Err(format!(
                "max_area must be between 1 and {}",
                MAX_TARGET_AREA
            ));
        }
        Ok(())
    }

    /// Reject targets larger than `max_area`.
    pub fn check(&self, target: &TargetArea) -> Result<(), ApiError> {
        check_area(&target.rect, self.max_area)
    }
}

fn check_area(rect: &Rect, max_area: usize) -> Result<(), ApiError> {
    if rect.area() > max_area {
        return Err(ApiError::InvalidArea(format!(
            "area {} covers {} quadrants, more than the limit of {}",
            rect,
            rect.area(),
            max_area
        )));
    }
    Ok(())
}

/// Area to plan and the planner to use for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetArea {
    pub kind: PlanKind,
    pub rect: Rect,
}

impl TargetArea {
    pub fn new(kind: PlanKind, tl: Coord, br: Coord) -> Result<Self, ApiError> {
        let rect = Rect::new(tl, br)?;
        check_area(&rect, MAX_TARGET_AREA)?;
        Ok(Self { kind, rect })
    }
}

/// Ordered batches covering a target area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub kind: PlanKind,
    pub area: Rect,
    pub batches: Vec<Batch>,
}

/// Batch and quadrant counts of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub batches: usize,
    pub quadrants: usize,
    pub by_shape: BTreeMap<BatchShape, usize>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Every quadrant the plan generates, in plan order.
    pub fn coords(&self) -> impl Iterator<Item = Coord> + '_ {
        self.batches.iter().flat_map(|b| b.coords().iter().copied())
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            batches: self.batches.len(),
            ..PlanSummary::default()
        };
        for batch in &self.batches {
            summary.quadrants += batch.len();
            *summary.by_shape.entry(batch.shape()).or_insert(0) += 1;
        }
        summary
    }

    /// Replay the plan against `grid`, checking disjointness and legality in order.
    pub fn verify(&self, grid: &GridModel) -> Result<(), ApiError> {
        let mut sim = grid.clone();
        for (index, batch) in self.batches.iter().enumerate() {
            check_legality(batch, &sim)
                .into_result(batch)
                .map_err(|e| ApiError::IllegalBatch(format!("plan batch {}: {}", index, e)))?;
            sim.mark_generated(batch.coords())?;
        }
        Ok(())
    }
}

/// Run the planner selected by `target.kind`.
pub fn plan(grid: &GridModel, target: &TargetArea) -> Result<Plan, ApiError> {
    // Targets can arrive deserialized, bypassing TargetArea::new
    let rect = Rect::new(target.rect.tl, target.rect.br)?;
    check_area(&rect, MAX_TARGET_AREA)?;
    let plan = match target.kind {
        PlanKind::Strip => plan_strip(grid, target.rect)?,
        PlanKind::Rectangle => plan_rectangle(grid, target.rect)?,
        PlanKind::Outward => plan_outward(grid, target.rect)?,
    };
    let summary = plan.summary();
    debug!(
        kind = %plan.kind,
        area = %plan.area,
        batches = summary.batches,
        quadrants = summary.quadrants,
        "Plan created"
    );
    Ok(plan)
}

/// Forward simulation shared by all planners.
///
/// Batches that would be illegal against the simulated grid are split:
/// a 2x2 into two horizontal pairs, a pair into singles. Cells that are
/// outside the area or already covered are dropped.
pub(crate) struct PlanBuilder {
    area: Rect,
    sim: GridModel,
    batches: Vec<Batch>,
}

impl PlanBuilder {
    pub(crate) fn new(grid: &GridModel, area: Rect) -> Self {
        Self {
            area,
            sim: grid.clone(),
            batches: Vec::new(),
        }
    }

    pub(crate) fn area(&self) -> Rect {
        self.area
    }

    pub(crate) fn grid(&self) -> &GridModel {
        &self.sim
    }

    /// Generated in the simulation, either before planning or by an earlier batch.
    pub(crate) fn is_done(&self, c: Coord) -> bool {
        self.sim.is_generated(c)
    }

    /// Inside the area and still to be planned.
    pub(crate) fn is_open(&self, c: Coord) -> bool {
        self.area.contains(c) && !self.sim.is_generated(c)
    }

    pub(crate) fn open_cells(&self, rect: &Rect) -> Vec<Coord> {
        rect.points().filter(|c| self.is_open(*c)).collect()
    }

    /// Whether `batch` could be emitted as-is.
    pub(crate) fn accepts(&self, batch: &Batch) -> bool {
        batch.coords().iter().all(|c| self.is_open(*c))
            && check_legality(batch, &self.sim).is_legal()
    }

    /// Emit `batch`, splitting it if it is not acceptable.
    pub(crate) fn push(&mut self, batch: Batch) {
        if self.accepts(&batch) {
            self.commit(batch);
            return;
        }
        let origin = batch.origin();
        match batch.shape() {
            BatchShape::Square => {
                self.push(Batch::with_shape(origin, BatchShape::Horizontal));
                self.push(Batch::with_shape(origin.offset(0, 1), BatchShape::Horizontal));
            }
            BatchShape::Vertical | BatchShape::Horizontal => {
                for &c in batch.coords() {
                    self.push(Batch::single(c));
                }
            }
            BatchShape::Single => {}
        }
    }

    /// Emit singles for every open cell of `rect`, in raster order.
    pub(crate) fn fill_singles(&mut self, rect: &Rect) {
        for c in self.open_cells(rect) {
            self.push(Batch::single(c));
        }
    }

    fn commit(&mut self, batch: Batch) {
        // accepts() checked every cell is open, so marking cannot conflict
        let marked = self.sim.mark_generated(batch.coords());
        debug_assert!(marked.is_ok(), "accepted batch {} conflicted", batch);
        self.batches.push(batch);
    }

    pub(crate) fn finish(self, kind: PlanKind) -> Plan {
        Plan {
            kind,
            area: self.area,
            batches: self.batches,
        }
    }
}
