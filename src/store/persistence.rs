//! Sled-backed generation store

use crate::error::{ApiError, StorageError};
use crate::grid::{Coord, GridModel};
use crate::queue::{Job, JobId, JobStatus, NewJob};
use crate::store::{
    Admission, CancelOutcome, Completion, GenerationStore, QuadrantRecord, QueueStats,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

const QUADRANTS_TREE: &str = "quadrants";
const GENERATIONS_TREE: &str = "generations";
const REFERENCES_TREE: &str = "references";
const JOBS_TREE: &str = "jobs";

/// Error message recorded on jobs cancelled while processing.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Sled-based implementation of GenerationStore
pub struct SledGenerationStore {
    db: sled::Db,
    quadrants: sled::Tree,
    generations: sled::Tree,
    references: sled::Tree,
    jobs: sled::Tree,
    /// Serializes job state transitions within this process
    job_lock: Mutex<()>,
}

/// Reasons a transaction is aborted.
#[derive(Debug)]
enum TxAbort {
    NotFound(JobId),
    InvalidState(JobId, JobStatus),
    Conflict(Vec<Coord>),
    MissingOutput(Coord),
    Codec(String),
}

impl From<TxAbort> for ApiError {
    fn from(abort: TxAbort) -> Self {
        match abort {
            TxAbort::NotFound(id) => ApiError::JobNotFound(id),
            TxAbort::InvalidState(id, status) => ApiError::InvalidJobState { id, status },
            TxAbort::Conflict(coords) => ApiError::Conflict(coords),
            TxAbort::MissingOutput(coord) => {
                ApiError::EndpointError(format!("no output extracted for quadrant {}", coord))
            }
            TxAbort::Codec(msg) => ApiError::StorageError(StorageError::Serialization(msg)),
        }
    }
}

fn map_tx_error(err: TransactionError<TxAbort>) -> ApiError {
    match err {
        TransactionError::Abort(abort) => abort.into(),
        TransactionError::Storage(e) => ApiError::StorageError(e.into()),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

fn tx_codec<T>(result: Result<T, StorageError>) -> Result<T, ConflictableTransactionError<TxAbort>> {
    result.map_err(|e| ConflictableTransactionError::Abort(TxAbort::Codec(e.to_string())))
}

/// Fixed-width key that sorts coordinates in raster order.
fn coord_key(c: Coord) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[..4].copy_from_slice(&((c.y as u32) ^ 0x8000_0000).to_be_bytes());
    key[4..].copy_from_slice(&((c.x as u32) ^ 0x8000_0000).to_be_bytes());
    key
}

impl SledGenerationStore {
    /// Write new pending jobs. Callers hold `job_lock`.
    fn insert_locked(&self, jobs: Vec<NewJob>) -> Result<Vec<JobId>, StorageError> {
        let now = Utc::now();
        let mut batch = sled::Batch::default();
        let mut ids = Vec::with_capacity(jobs.len());
        for new_job in jobs {
            let id = JobId(self.db.generate_id()? + 1);
            let job = Job::from_new(id, new_job, now);
            batch.insert(&id.to_key()[..], encode(&job)?);
            ids.push(id);
        }
        self.jobs.apply_batch(batch)?;
        Ok(ids)
    }

    /// Open (or create) a store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        Self::from_db(db)
    }

    /// Build a store over an already opened database
    pub fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            quadrants: db.open_tree(QUADRANTS_TREE)?,
            generations: db.open_tree(GENERATIONS_TREE)?,
            references: db.open_tree(REFERENCES_TREE)?,
            jobs: db.open_tree(JOBS_TREE)?,
            db,
            job_lock: Mutex::new(()),
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn read_job(&self, id: JobId) -> Result<Job, StorageError> {
        match self.jobs.get(&id.to_key()[..])? {
            Some(bytes) => decode(&bytes),
            None => Err(StorageError::JobNotFound(id)),
        }
    }

    fn write_job(&self, job: &Job) -> Result<(), StorageError> {
        self.jobs.insert(&job.id.to_key()[..], encode(job)?)?;
        Ok(())
    }
}

impl GenerationStore for SledGenerationStore {
    fn load_grid(&self) -> Result<GridModel, StorageError> {
        let mut coords = Vec::new();
        for item in self.quadrants.iter() {
            let (_, value) = item?;
            let record: QuadrantRecord = decode(&value)?;
            coords.push(record.coord);
        }
        Ok(GridModel::from_generated(coords))
    }

    fn quadrant(&self, coord: Coord) -> Result<Option<QuadrantRecord>, StorageError> {
        self.quadrants
            .get(&coord_key(coord)[..])?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn put_reference(&self, coord: Coord, png: &[u8]) -> Result<(), StorageError> {
        self.references.insert(&coord_key(coord)[..], png)?;
        Ok(())
    }

    fn reference_png(&self, coord: Coord) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .references
            .get(&coord_key(coord)[..])?
            .map(|bytes| bytes.to_vec()))
    }

    fn generation_png(&self, coord: Coord) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self
            .generations
            .get(&coord_key(coord)[..])?
            .map(|bytes| bytes.to_vec()))
    }

    fn import_generation(&self, coord: Coord, png: &[u8]) -> Result<(), ApiError> {
        let key = coord_key(coord);
        let record = encode(&QuadrantRecord {
            coord,
            generated_at: Utc::now(),
            job_id: None,
        })?;
        (&self.quadrants, &self.generations)
            .transaction(|(quadrants, generations)| {
                if quadrants.get(&key[..])?.is_some() {
                    return Err(ConflictableTransactionError::Abort(TxAbort::Conflict(vec![
                        coord,
                    ])));
                }
                quadrants.insert(&key[..], record.clone())?;
                generations.insert(&key[..], png)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    fn insert_jobs(&self, jobs: Vec<NewJob>) -> Result<Vec<JobId>, StorageError> {
        let _guard = self.job_lock.lock();
        self.insert_locked(jobs)
    }

    fn admit_jobs(
        &self,
        jobs: Vec<NewJob>,
        admit: &dyn Fn(&Admission) -> Result<(), ApiError>,
    ) -> Result<Vec<JobId>, ApiError> {
        let _guard = self.job_lock.lock();
        let active: Vec<Job> = self
            .list_jobs(None)?
            .into_iter()
            .filter(|job| job.status.is_active())
            .collect();
        let admission = Admission {
            grid: self.load_grid()?,
            reserved: active
                .iter()
                .flat_map(|job| job.batch.coords().iter().copied())
                .collect(),
            active: active.len(),
        };
        admit(&admission)?;
        Ok(self.insert_locked(jobs)?)
    }

    fn next_plan_id(&self) -> Result<u64, StorageError> {
        Ok(self.db.generate_id()? + 1)
    }

    fn get_job(&self, id: JobId) -> Result<Option<Job>, StorageError> {
        self.jobs
            .get(&id.to_key()[..])?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>, StorageError> {
        let mut jobs = Vec::new();
        for item in self.jobs.iter() {
            let (_, value) = item?;
            let job: Job = decode(&value)?;
            if status.map_or(true, |s| s == job.status) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    fn claim_next(&self, endpoint: &str) -> Result<Option<Job>, StorageError> {
        let _guard = self.job_lock.lock();
        let jobs = self.list_jobs(None)?;

        let busy: BTreeSet<Coord> = jobs
            .iter()
            .filter(|job| job.status == JobStatus::Processing)
            .flat_map(|job| job.batch.coords().iter().copied())
            .collect();

        // Lowest unfinished sequence number per plan
        let mut plan_front: HashMap<u64, u32> = HashMap::new();
        for job in jobs.iter().filter(|job| job.status != JobStatus::Complete) {
            if let Some(plan) = job.plan {
                let front = plan_front.entry(plan.plan_id).or_insert(plan.seq);
                *front = (*front).min(plan.seq);
            }
        }

        for job in jobs.into_iter().filter(|job| job.status == JobStatus::Pending) {
            if !job.accepts_endpoint(endpoint) {
                continue;
            }
            if job.batch.coords().iter().any(|c| busy.contains(c)) {
                continue;
            }
            if let Some(plan) = job.plan {
                if plan_front.get(&plan.plan_id) != Some(&plan.seq) {
                    continue;
                }
            }

            let previous = encode(&job)?;
            let mut claimed = job;
            claimed.status = JobStatus::Processing;
            claimed.started_at = Some(Utc::now());
            claimed.endpoint = Some(endpoint.to_string());
            let swapped = self.jobs.compare_and_swap(
                &claimed.id.to_key()[..],
                Some(previous),
                Some(encode(&claimed)?),
            )?;
            if swapped.is_ok() {
                return Ok(Some(claimed));
            }
        }
        Ok(None)
    }

    fn complete_job(
        &self,
        id: JobId,
        outputs: &BTreeMap<Coord, Vec<u8>>,
    ) -> Result<Completion, ApiError> {
        let _guard = self.job_lock.lock();
        let now = Utc::now();
        let key = id.to_key();

        (&self.jobs, &self.quadrants, &self.generations)
            .transaction(|(jobs, quadrants, generations)| {
                let Some(bytes) = jobs.get(&key[..])? else {
                    return Err(ConflictableTransactionError::Abort(TxAbort::NotFound(id)));
                };
                let mut job: Job = tx_codec(decode(&bytes))?;
                if job.status != JobStatus::Processing {
                    return Err(ConflictableTransactionError::Abort(TxAbort::InvalidState(
                        id, job.status,
                    )));
                }

                if job.cancel_requested {
                    job.status = JobStatus::Error;
                    job.error_message = Some(CANCELLED_MESSAGE.to_string());
                    job.completed_at = Some(now);
                    jobs.insert(&key[..], tx_codec(encode(&job))?)?;
                    return Ok(Completion::Cancelled(job));
                }

                let mut conflicts = Vec::new();
                for coord in job.batch.coords() {
                    if quadrants.get(&coord_key(*coord)[..])?.is_some() {
                        conflicts.push(*coord);
                    }
                }
                if !conflicts.is_empty() {
                    return Err(ConflictableTransactionError::Abort(TxAbort::Conflict(
                        conflicts,
                    )));
                }

                for coord in job.batch.coords() {
                    let Some(png) = outputs.get(coord) else {
                        return Err(ConflictableTransactionError::Abort(TxAbort::MissingOutput(
                            *coord,
                        )));
                    };
                    let record = QuadrantRecord {
                        coord: *coord,
                        generated_at: now,
                        job_id: Some(id),
                    };
                    let qkey = coord_key(*coord);
                    quadrants.insert(&qkey[..], tx_codec(encode(&record))?)?;
                    generations.insert(&qkey[..], png.clone())?;
                }

                job.status = JobStatus::Complete;
                job.completed_at = Some(now);
                job.error_message = None;
                jobs.insert(&key[..], tx_codec(encode(&job))?)?;
                Ok(Completion::Completed(job))
            })
            .map_err(map_tx_error)
    }

    fn fail_job(&self, id: JobId, message: &str) -> Result<Job, StorageError> {
        let _guard = self.job_lock.lock();
        let mut job = self.read_job(id)?;
        if job.status.is_finished() {
            return Ok(job);
        }
        job.status = JobStatus::Error;
        job.error_message = Some(message.to_string());
        job.completed_at = Some(Utc::now());
        self.write_job(&job)?;
        Ok(job)
    }

    fn cancel_job(&self, id: JobId) -> Result<CancelOutcome, StorageError> {
        let _guard = self.job_lock.lock();
        let mut job = self.read_job(id)?;
        match job.status {
            JobStatus::Pending => {
                self.jobs.remove(&id.to_key()[..])?;
                Ok(CancelOutcome::Removed)
            }
            JobStatus::Processing => {
                job.cancel_requested = true;
                self.write_job(&job)?;
                Ok(CancelOutcome::Requested)
            }
            JobStatus::Complete | JobStatus::Error => Ok(CancelOutcome::Finished),
        }
    }

    fn retry_job(&self, id: JobId) -> Result<Job, ApiError> {
        let _guard = self.job_lock.lock();
        let mut job = self.read_job(id).map_err(|e| match e {
            StorageError::JobNotFound(id) => ApiError::JobNotFound(id),
            other => other.into(),
        })?;
        if job.status != JobStatus::Error {
            return Err(ApiError::InvalidJobState {
                id,
                status: job.status,
            });
        }
        job.reset_to_pending();
        self.write_job(&job)?;
        Ok(job)
    }

    fn reset_processing(&self) -> Result<usize, StorageError> {
        let _guard = self.job_lock.lock();
        let now = Utc::now();
        let mut reset = 0;
        for mut job in self.list_jobs(Some(JobStatus::Processing))? {
            if job.cancel_requested {
                job.status = JobStatus::Error;
                job.error_message = Some(CANCELLED_MESSAGE.to_string());
                job.completed_at = Some(now);
            } else {
                job.reset_to_pending();
                reset += 1;
            }
            self.write_job(&job)?;
        }
        Ok(reset)
    }

    fn prune_finished(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let _guard = self.job_lock.lock();
        let mut removed = 0;
        for job in self.list_jobs(None)? {
            let expired = job.status.is_finished()
                && job.completed_at.map_or(false, |done| done < cutoff);
            if expired {
                self.jobs.remove(&job.id.to_key()[..])?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn stats(&self) -> Result<QueueStats, StorageError> {
        let mut stats = QueueStats::default();
        for job in self.list_jobs(None)? {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => {
                    stats.processing += 1;
                    if let Some(endpoint) = job.endpoint {
                        stats.processing_by_endpoint.insert(endpoint, job.id);
                    }
                }
                JobStatus::Complete => stats.complete += 1,
                JobStatus::Error => stats.error += 1,
            }
        }
        Ok(stats)
    }

    fn reserved_coords(&self) -> Result<BTreeSet<Coord>, StorageError> {
        Ok(self
            .list_jobs(None)?
            .into_iter()
            .filter(|job| job.status.is_active())
            .flat_map(|job| job.batch.coords().to_vec())
            .collect())
    }
}
