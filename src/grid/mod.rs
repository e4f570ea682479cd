//! Grid Model
//!
//! Quadrant coordinates, rectangular areas, and the in-memory view of which
//! quadrants have been generated. The model performs no I/O; persistence is
//! handled by the store.

pub mod coord;
pub mod model;

pub use coord::{parse_coord_list, Coord, Edge, Rect};
pub use model::{GridModel, QuadrantState};
