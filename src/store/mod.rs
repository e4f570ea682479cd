//! Generation Store
//!
//! Durable home of quadrant state, reference and generated pixels, and job
//! records. Quadrant state changes only through job completion, which also
//! closes the job in the same transaction.

pub mod persistence;

pub use persistence::SledGenerationStore;

use crate::error::{ApiError, StorageError};
use crate::grid::{Coord, GridModel};
use crate::queue::{Job, JobId, JobStatus, NewJob};
use crate::template::{decode_image, PixelSource};
use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persisted state of one generated quadrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadrantRecord {
    pub coord: Coord,
    pub generated_at: DateTime<Utc>,
    /// Job that produced the pixels; `None` for imported generations
    pub job_id: Option<JobId>,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Pending job deleted
    Removed,
    /// Processing job flagged; it finishes as an error when its call returns
    Requested,
    /// Job already complete or failed
    Finished,
}

/// Outcome of storing an endpoint result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Completed(Job),
    /// Cancellation was requested while the call was in flight; outputs discarded
    Cancelled(Job),
}

/// Queue state seen by an admission check, read under the job lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Live grid
    pub grid: GridModel,
    /// Quadrants claimed by pending or processing jobs
    pub reserved: BTreeSet<Coord>,
    /// Pending plus processing jobs
    pub active: usize,
}

impl Admission {
    /// Grid with every queued quadrant treated as generated.
    pub fn planning_grid(&self) -> GridModel {
        self.grid.with_reserved(self.reserved.iter().copied())
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub complete: usize,
    pub error: usize,
    /// Processing job per endpoint
    pub processing_by_endpoint: BTreeMap<String, JobId>,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.complete + self.error
    }
}

/// Storage contract for the orchestration queue.
pub trait GenerationStore: Send + Sync {
    /// Current grid state.
    fn load_grid(&self) -> Result<GridModel, StorageError>;

    fn quadrant(&self, coord: Coord) -> Result<Option<QuadrantRecord>, StorageError>;

    fn put_reference(&self, coord: Coord, png: &[u8]) -> Result<(), StorageError>;
    fn reference_png(&self, coord: Coord) -> Result<Option<Vec<u8>>, StorageError>;
    fn generation_png(&self, coord: Coord) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store pixels for quadrants generated outside the queue.
    fn import_generation(&self, coord: Coord, png: &[u8]) -> Result<(), ApiError>;

    /// Persist new pending jobs, returning their ids in input order.
    fn insert_jobs(&self, jobs: Vec<NewJob>) -> Result<Vec<JobId>, StorageError>;

    /// Persist new pending jobs if `admit` accepts the current queue state.
    ///
    /// The check and the insert run under one lock, so no other enqueue can
    /// reserve quadrants in between.
    fn admit_jobs(
        &self,
        jobs: Vec<NewJob>,
        admit: &dyn Fn(&Admission) -> Result<(), ApiError>,
    ) -> Result<Vec<JobId>, ApiError>;

    /// Allocate an id for a new plan.
    fn next_plan_id(&self) -> Result<u64, StorageError>;

    fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError>;

    /// Jobs in id order, optionally filtered by status.
    fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, StorageError>;

    /// Atomically claim the oldest runnable pending job for `endpoint`.
    ///
    /// A job is runnable when its model matches, none of its quadrants belong
    /// to a processing job, and all earlier jobs of its plan are complete.
    fn claim_next(&self, endpoint: &str) -> Result<Option<Job>, StorageError>;

    /// Mark the job's quadrants generated, store their pixels and complete the
    /// job in one transaction. Fails with `Conflict` and changes nothing if any
    /// quadrant is already generated.
    fn complete_job(
        &self,
        id: JobId,
        outputs: &BTreeMap<Coord, Vec<u8>>,
    ) -> Result<Completion, ApiError>;

    fn fail_job(&self, id: JobId, message: &str) -> Result<Job, StorageError>;

    fn cancel_job(&self, id: JobId) -> Result<CancelOutcome, StorageError>;

    /// Move an errored job back to pending.
    fn retry_job(&self, id: JobId) -> Result<Job, ApiError>;

    /// Return jobs left processing by a previous process to pending.
    fn reset_processing(&self) -> Result<usize, StorageError>;

    /// Delete finished jobs that completed before `cutoff`.
    fn prune_finished(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;

    fn stats(&self) -> Result<QueueStats, StorageError>;

    /// Quadrants claimed by pending or processing jobs.
    fn reserved_coords(&self) -> Result<BTreeSet<Coord>, StorageError>;
}

/// Pixel access over a store, decoding stored PNGs.
pub struct StorePixels<'a>(pub &'a dyn GenerationStore);

impl PixelSource for StorePixels<'_> {
    fn reference(&self, coord: Coord) -> Result<Option<RgbaImage>, ApiError> {
        self.0
            .reference_png(coord)?
            .map(|bytes| decode_image(&bytes))
            .transpose()
    }

    fn generation(&self, coord: Coord) -> Result<Option<RgbaImage>, ApiError> {
        self.0
            .generation_png(coord)?
            .map(|bytes| decode_image(&bytes))
            .transpose()
    }
}
