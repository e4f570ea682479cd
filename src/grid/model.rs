//! In-memory quadrant state.

use crate::error::ApiError;
use crate::grid::{Coord, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// State of a single quadrant. Absent coordinates are `Empty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuadrantState {
    Empty,
    Generated,
}

/// Set of generated quadrants over unbounded integer coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridModel {
    generated: BTreeSet<Coord>,
}

impl GridModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_generated<I: IntoIterator<Item = Coord>>(coords: I) -> Self {
        Self {
            generated: coords.into_iter().collect(),
        }
    }

    pub fn state_of(&self, c: Coord) -> QuadrantState {
        if self.generated.contains(&c) {
            QuadrantState::Generated
        } else {
            QuadrantState::Empty
        }
    }

    pub fn is_generated(&self, c: Coord) -> bool {
        self.state_of(c) == QuadrantState::Generated
    }

    /// Mark every coordinate generated, or none of them.
    ///
    /// Fails with `Conflict` listing each coordinate that is already generated.
    pub fn mark_generated(&mut self, coords: &[Coord]) -> Result<(), ApiError> {
        let conflicts: Vec<Coord> = coords
            .iter()
            .copied()
            .filter(|c| self.generated.contains(c))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !conflicts.is_empty() {
            return Err(ApiError::Conflict(conflicts));
        }
        self.generated.extend(coords.iter().copied());
        Ok(())
    }

    /// Generated coordinates in raster order.
    pub fn generated(&self) -> impl Iterator<Item = Coord> + '_ {
        self.generated.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.generated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generated.is_empty()
    }

    /// Bounding box of generated quadrants, optionally restricted to an area.
    pub fn generated_bounds(&self, within: Option<&Rect>) -> Option<Rect> {
        Rect::bounding(
            self.generated()
                .filter(|c| within.map_or(true, |area| area.contains(*c))),
        )
    }

    /// Number of generated quadrants among the 8 surrounding cells.
    pub fn count_generated_neighbors(&self, c: Coord) -> usize {
        c.neighbors8()
            .iter()
            .filter(|n| self.generated.contains(n))
            .count()
    }

    /// Copy of this grid with extra coordinates treated as generated.
    ///
    /// Used to plan around quadrants that queued jobs will produce.
    pub fn with_reserved<I: IntoIterator<Item = Coord>>(&self, reserved: I) -> Self {
        let mut snapshot = self.clone();
        snapshot.generated.extend(reserved);
        snapshot
    }
}
