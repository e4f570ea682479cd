//! Batches and the Legality Validator
//!
//! A batch is a group of 1, 2 or 4 adjacent quadrants generated together in a
//! single template. Whether a batch may be submitted depends on how much of its
//! surroundings are already generated: the template is bounded to a 2x2
//! quadrant window, so context may only arrive from a single frontier.

use crate::error::ApiError;
use crate::grid::{Coord, GridModel, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Admissible batch shapes, named width x height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BatchShape {
    #[serde(rename = "1x1")]
    Single,
    /// 1 wide, 2 tall
    #[serde(rename = "1x2")]
    Vertical,
    /// 2 wide, 1 tall
    #[serde(rename = "2x1")]
    Horizontal,
    #[serde(rename = "2x2")]
    Square,
}

impl BatchShape {
    pub fn len(self) -> usize {
        match self {
            BatchShape::Single => 1,
            BatchShape::Vertical | BatchShape::Horizontal => 2,
            BatchShape::Square => 4,
        }
    }

    pub fn is_pair(self) -> bool {
        matches!(self, BatchShape::Vertical | BatchShape::Horizontal)
    }

    /// Offsets from the top-left cell, in raster order.
    fn offsets(self) -> &'static [(i32, i32)] {
        match self {
            BatchShape::Single => &[(0, 0)],
            BatchShape::Vertical => &[(0, 0), (0, 1)],
            BatchShape::Horizontal => &[(0, 0), (1, 0)],
            BatchShape::Square => &[(0, 0), (1, 0), (0, 1), (1, 1)],
        }
    }
}

impl fmt::Display for BatchShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchShape::Single => "1x1",
            BatchShape::Vertical => "1x2",
            BatchShape::Horizontal => "2x1",
            BatchShape::Square => "2x2",
        };
        f.write_str(name)
    }
}

/// Immutable group of quadrants with a validated shape.
///
/// Coordinates are kept in raster order, so two batches covering the same
/// cells compare equal regardless of how they were built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coord>", into = "Vec<Coord>")]
pub struct Batch {
    coords: Vec<Coord>,
    shape: BatchShape,
}

impl Batch {
    /// Build a batch from arbitrary coordinates, classifying its shape.
    pub fn new(coords: Vec<Coord>) -> Result<Self, ApiError> {
        let mut sorted = coords;
        sorted.sort();
        let Some(&origin) = sorted.first() else {
            return Err(ApiError::IllegalBatch("batch is empty".to_string()));
        };
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(ApiError::IllegalBatch(format!(
                "batch {} contains duplicate quadrants",
                describe(&sorted)
            )));
        }
        let shape = [
            BatchShape::Single,
            BatchShape::Vertical,
            BatchShape::Horizontal,
            BatchShape::Square,
        ]
        .into_iter()
        .filter(|shape| shape.len() == sorted.len())
        .find(|shape| Self::cells(origin, *shape) == sorted)
        .ok_or_else(|| {
            ApiError::IllegalBatch(format!(
                "quadrants {} do not form a 1x1, 1x2, 2x1 or 2x2 shape",
                describe(&sorted)
            ))
        })?;
        Ok(Self {
            coords: sorted,
            shape,
        })
    }

    /// Build a batch of the given shape anchored at its top-left cell.
    pub fn with_shape(origin: Coord, shape: BatchShape) -> Self {
        Self {
            coords: Self::cells(origin, shape),
            shape,
        }
    }

    pub fn single(c: Coord) -> Self {
        Self::with_shape(c, BatchShape::Single)
    }

    fn cells(origin: Coord, shape: BatchShape) -> Vec<Coord> {
        shape
            .offsets()
            .iter()
            .map(|(dx, dy)| origin.offset(*dx, *dy))
            .collect()
    }

    pub fn coords(&self) -> &[Coord] {
        &self.coords
    }

    pub fn shape(&self) -> BatchShape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn origin(&self) -> Coord {
        self.coords[0]
    }

    pub fn rect(&self) -> Rect {
        let origin = self.origin();
        let last = self.coords[self.coords.len() - 1];
        Rect {
            tl: origin,
            br: last,
        }
    }

    pub fn contains(&self, c: Coord) -> bool {
        self.coords.contains(&c)
    }

    pub fn overlaps(&self, other: &Batch) -> bool {
        self.coords.iter().any(|c| other.contains(*c))
    }

    /// Cells adjacent (4-neighborhood) to the batch but outside it.
    pub fn border_cells(&self) -> Vec<Coord> {
        let mut border: Vec<Coord> = self
            .coords
            .iter()
            .flat_map(|c| c.neighbors4())
            .filter(|n| !self.contains(*n))
            .collect();
        border.sort();
        border.dedup();
        border
    }

    /// The two cells beyond the ends of a pair's long axis.
    pub fn long_axis_ends(&self) -> Option<(Coord, Coord)> {
        let first = self.coords[0];
        let last = self.coords[self.coords.len() - 1];
        match self.shape {
            BatchShape::Horizontal => Some((first.offset(-1, 0), last.offset(1, 0))),
            BatchShape::Vertical => Some((first.offset(0, -1), last.offset(0, 1))),
            _ => None,
        }
    }
}

impl TryFrom<Vec<Coord>> for Batch {
    type Error = ApiError;

    fn try_from(coords: Vec<Coord>) -> Result<Self, Self::Error> {
        Batch::new(coords)
    }
}

impl From<Batch> for Vec<Coord> {
    fn from(batch: Batch) -> Self {
        batch.coords
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.shape, describe(&self.coords))
    }
}

fn describe(coords: &[Coord]) -> String {
    coords
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("")
}

/// Why a batch cannot be submitted against the current grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IllegalReason {
    /// Some batch quadrants are already generated.
    AlreadyGenerated(Vec<Coord>),
    /// A pair has generated neighbors at both ends of its long axis.
    WrapsContext { ends: (Coord, Coord) },
    /// A 2x2 block touches generated quadrants outside itself.
    TouchesContext(Vec<Coord>),
}

impl fmt::Display for IllegalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IllegalReason::AlreadyGenerated(coords) => {
                write!(f, "already generated: {}", describe(coords))
            }
            IllegalReason::WrapsContext { ends } => write!(
                f,
                "generated neighbors at both long-axis ends {} and {}",
                ends.0, ends.1
            ),
            IllegalReason::TouchesContext(coords) => write!(
                f,
                "2x2 block touches generated neighbors {}",
                describe(coords)
            ),
        }
    }
}

/// Result of a legality check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Legality {
    Legal,
    Illegal(IllegalReason),
}

impl Legality {
    pub fn is_legal(&self) -> bool {
        matches!(self, Legality::Legal)
    }

    /// Convert to a `Result`, naming the batch in the error.
    pub fn into_result(self, batch: &Batch) -> Result<(), ApiError> {
        match self {
            Legality::Legal => Ok(()),
            Legality::Illegal(reason) => {
                Err(ApiError::IllegalBatch(format!("{}: {}", batch, reason)))
            }
        }
    }
}

/// Decide whether `batch` may be generated against `grid`.
pub fn check_legality(batch: &Batch, grid: &GridModel) -> Legality {
    let generated: Vec<Coord> = batch
        .coords()
        .iter()
        .copied()
        .filter(|c| grid.is_generated(*c))
        .collect();
    if !generated.is_empty() {
        return Legality::Illegal(IllegalReason::AlreadyGenerated(generated));
    }

    match batch.shape() {
        BatchShape::Single => Legality::Legal,
        BatchShape::Vertical | BatchShape::Horizontal => match batch.long_axis_ends() {
            Some((a, b)) if grid.is_generated(a) && grid.is_generated(b) => {
                Legality::Illegal(IllegalReason::WrapsContext { ends: (a, b) })
            }
            _ => Legality::Legal,
        },
        BatchShape::Square => {
            let touching: Vec<Coord> = batch
                .border_cells()
                .into_iter()
                .filter(|c| grid.is_generated(*c))
                .collect();
            if touching.is_empty() {
                Legality::Legal
            } else {
                Legality::Illegal(IllegalReason::TouchesContext(touching))
            }
        }
    }
}

/// Build a batch from caller-supplied coordinates and require it to be legal.
pub fn validate_batch(coords: Vec<Coord>, grid: &GridModel) -> Result<Batch, ApiError> {
    for c in &coords {
        c.validate()?;
    }
    let batch = Batch::new(coords)?;
    check_legality(&batch, grid).into_result(&batch)?;
    Ok(batch)
}
