//! Plan Request API
//!
//! `GenerationService` is the entry point used by the CLI and by embedders:
//! it plans against the stored grid, enqueues validated jobs, answers status
//! queries and builds the worker pool from configured endpoints.

use crate::batch::{check_legality, validate_batch};
use crate::config::MosaicConfig;
use crate::endpoint::HttpEndpoint;
use crate::error::ApiError;
use crate::grid::{Coord, GridModel, Rect};
use crate::planner::{self, Plan, TargetArea};
use crate::queue::{EnqueueOptions, GenerationQueue, Job, JobId, JobStatus, NewJob, PlanRef};
use crate::store::{
    Admission, CancelOutcome, GenerationStore, QueueStats, SledGenerationStore,
};
use crate::template::{decode_image, encode_png, split_into_quadrants};
use chrono::Utc;
use image::RgbaImage;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Overview of the grid and its queue reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridSummary {
    pub generated: usize,
    /// Bounding rectangle of generated quadrants
    pub bounds: Option<Rect>,
    /// Quadrants held by pending or processing jobs
    pub reserved: usize,
}

/// Planning, enqueueing and job management over one store.
pub struct GenerationService {
    config: MosaicConfig,
    store: Arc<dyn GenerationStore>,
}

impl GenerationService {
    /// Open the sled store configured for `workspace_root`.
    pub fn open(workspace_root: &Path, config: MosaicConfig) -> Result<Self, ApiError> {
        let config = config.validated()?;
        let store_path = config.storage.resolve_store_path(workspace_root);
        debug!(store_path = %store_path.display(), "Opening generation store");
        let store = SledGenerationStore::new(&store_path)?;
        Ok(Self::with_store(Arc::new(store), config))
    }

    /// Wrap an already-open store.
    pub fn with_store(store: Arc<dyn GenerationStore>, config: MosaicConfig) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &MosaicConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GenerationStore> {
        &self.store
    }

    /// Grid with every queued quadrant treated as generated.
    pub fn planning_grid(&self) -> Result<GridModel, ApiError> {
        let grid = self.store.load_grid()?;
        Ok(grid.with_reserved(self.store.reserved_coords()?))
    }

    /// Plan `target` against the planning grid.
    pub fn plan(&self, target: &TargetArea) -> Result<Plan, ApiError> {
        self.config.planner.check(target)?;
        planner::plan(&self.planning_grid()?, target)
    }

    /// Enqueue every batch of `plan` as one ordered plan.
    ///
    /// The plan is replayed against the planning grid under the store's job
    /// lock; nothing is stored if any batch would be illegal.
    pub fn enqueue_plan(&self, plan: &Plan, options: EnqueueOptions) -> Result<Vec<JobId>, ApiError> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }

        let plan_id = self.store.next_plan_id()?;
        let jobs = plan
            .batches
            .iter()
            .enumerate()
            .map(|(seq, batch)| NewJob {
                batch: batch.clone(),
                plan: Some(PlanRef {
                    plan_id,
                    seq: seq as u32,
                }),
                options: options.clone(),
            })
            .collect();
        let ids = self.store.admit_jobs(jobs, &|admission| {
            plan.verify(&admission.planning_grid())?;
            self.ensure_capacity(admission, plan.batches.len())
        })?;

        let summary = plan.summary();
        info!(
            plan_id,
            kind = %plan.kind,
            area = %plan.area,
            batches = summary.batches,
            quadrants = summary.quadrants,
            "Enqueued plan"
        );
        Ok(ids)
    }

    /// Enqueue a single ad hoc batch.
    ///
    /// Rejected when the batch is illegal against the live grid or overlaps a
    /// pending or processing job.
    pub fn enqueue_batch(&self, coords: Vec<Coord>, options: EnqueueOptions) -> Result<JobId, ApiError> {
        let batch = validate_batch(coords, &self.store.load_grid()?)?;

        let ids = self.store.admit_jobs(
            vec![NewJob {
                batch: batch.clone(),
                plan: None,
                options,
            }],
            &|admission| {
                // The grid may have moved since the first check
                check_legality(&batch, &admission.grid).into_result(&batch)?;
                let overlapping: Vec<Coord> = batch
                    .coords()
                    .iter()
                    .copied()
                    .filter(|c| admission.reserved.contains(c))
                    .collect();
                if !overlapping.is_empty() {
                    return Err(ApiError::IllegalBatch(format!(
                        "{} overlaps queued quadrants {}",
                        batch,
                        overlapping
                            .iter()
                            .map(|c| c.to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
                self.ensure_capacity(admission, 1)
            },
        )?;
        let id = ids
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::EndpointError("store returned no job id".to_string()))?;
        info!(job_id = %id, batch = %batch, "Enqueued batch");
        Ok(id)
    }

    fn ensure_capacity(&self, admission: &Admission, additional: usize) -> Result<(), ApiError> {
        let limit = self.config.queue.max_queue_size;
        if admission.active + additional > limit {
            return Err(ApiError::QueueFull(limit));
        }
        Ok(())
    }

    pub fn status(&self, id: JobId) -> Result<Job, ApiError> {
        self.store.get_job(id)?.ok_or(ApiError::JobNotFound(id))
    }

    /// Cancel a job. Returns false when the job had already finished.
    pub fn cancel(&self, id: JobId) -> Result<bool, ApiError> {
        if self.store.get_job(id)?.is_none() {
            return Err(ApiError::JobNotFound(id));
        }
        let outcome = self.store.cancel_job(id)?;
        info!(job_id = %id, outcome = ?outcome, "Cancel requested");
        Ok(outcome != CancelOutcome::Finished)
    }

    /// Return an errored job to pending.
    pub fn retry(&self, id: JobId) -> Result<Job, ApiError> {
        let job = self.store.retry_job(id)?;
        info!(job_id = %id, "Job returned to pending");
        Ok(job)
    }

    pub fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, ApiError> {
        Ok(self.store.list_jobs(status)?)
    }

    pub fn stats(&self) -> Result<QueueStats, ApiError> {
        Ok(self.store.stats()?)
    }

    /// Delete finished jobs older than `older_than`.
    pub fn prune(&self, older_than: Duration) -> Result<usize, ApiError> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| ApiError::ConfigError(format!("Invalid prune age: {}", e)))?;
        let removed = self.store.prune_finished(Utc::now() - age)?;
        info!(removed, "Pruned finished jobs");
        Ok(removed)
    }

    /// Store reference pixels for one quadrant.
    pub fn import_reference(&self, coord: Coord, image: &RgbaImage) -> Result<(), ApiError> {
        coord.validate()?;
        self.store.put_reference(coord, &encode_png(image)?)?;
        Ok(())
    }

    /// Split a large render into quadrant references anchored at `tl`.
    pub fn import_reference_grid(&self, tl: Coord, image: &RgbaImage) -> Result<Vec<Coord>, ApiError> {
        let tiles = split_into_quadrants(image, tl, self.config.template.quadrant_size);
        let mut imported = Vec::with_capacity(tiles.len());
        for (coord, tile) in tiles {
            self.import_reference(coord, &tile)?;
            imported.push(coord);
        }
        info!(count = imported.len(), tl = %tl, "Imported reference grid");
        Ok(imported)
    }

    /// Mark a quadrant generated with externally produced pixels.
    pub fn import_generation(&self, coord: Coord, image: &RgbaImage) -> Result<(), ApiError> {
        coord.validate()?;
        self.store.import_generation(coord, &encode_png(image)?)
    }

    /// Stored generation pixels for a quadrant.
    pub fn export_generation(&self, coord: Coord) -> Result<RgbaImage, ApiError> {
        let bytes = self.store.generation_png(coord)?.ok_or_else(|| {
            ApiError::InvalidArea(format!("quadrant {} has no generated pixels", coord))
        })?;
        decode_image(&bytes)
    }

    pub fn grid_summary(&self) -> Result<GridSummary, ApiError> {
        let grid = self.store.load_grid()?;
        Ok(GridSummary {
            generated: grid.len(),
            bounds: grid.generated_bounds(None),
            reserved: self.store.reserved_coords()?.len(),
        })
    }

    /// Build a queue with an HTTP worker for each selected endpoint.
    ///
    /// `only` restricts the pool to one endpoint; otherwise `default_endpoint`
    /// is used when set, and every enabled endpoint when it is not.
    pub fn queue(&self, only: Option<&str>) -> Result<GenerationQueue, ApiError> {
        let queue = GenerationQueue::new(
            Arc::clone(&self.store),
            self.config.template.clone(),
            self.config.queue.clone(),
        );

        let selected = only.or(self.config.default_endpoint.as_deref());
        for (name, settings) in self.config.enabled_endpoints() {
            if selected.map_or(false, |s| s != name) {
                continue;
            }
            let timeout = settings
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| self.config.queue.invocation_timeout());
            let endpoint = HttpEndpoint::new(name.clone(), settings, timeout)?;
            queue.register_endpoint(Arc::new(endpoint), settings.clone())?;
        }

        if queue.endpoint_names().is_empty() {
            return Err(ApiError::EndpointNotConfigured(match selected {
                Some(name) => format!("endpoint '{}' is not configured or disabled", name),
                None => "no enabled endpoints in configuration".to_string(),
            }));
        }
        Ok(queue)
    }
}
