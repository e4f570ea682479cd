//! Mosaic: Quadrant Planning and Generation Orchestration
//!
//! Plans seam-safe generation batches over an unbounded grid of image
//! quadrants, composites model templates for each batch, and drives a
//! persistent job queue against one or more model endpoints.

pub mod api;
pub mod batch;
pub mod cli;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod grid;
pub mod init;
pub mod logging;
pub mod planner;
pub mod queue;
pub mod store;
pub mod template;
