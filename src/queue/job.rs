//! Persisted job records.

use crate::batch::Batch;
use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Store-assigned job identifier, increasing with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn to_key(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(JobId)
            .map_err(|e| ApiError::ConfigError(format!("Invalid job id '{}': {}", s, e)))
    }
}

/// Lifecycle: pending -> processing -> complete | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }

    /// Pending or processing jobs hold a claim on their quadrants.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        };
        f.write_str(name)
    }
}

impl FromStr for JobStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "complete" | "completed" => Ok(JobStatus::Complete),
            "error" | "failed" => Ok(JobStatus::Error),
            other => Err(ApiError::ConfigError(format!(
                "Unknown job status '{}'",
                other
            ))),
        }
    }
}

/// Position of a job within an enqueued plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanRef {
    pub plan_id: u64,
    pub seq: u32,
}

/// Caller-supplied options shared by every job of one enqueue call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Restrict the job to one endpoint; any endpoint may claim it when unset
    pub model_id: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
}

/// A job before the store has assigned it an id.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub batch: Batch,
    pub plan: Option<PlanRef>,
    pub options: EnqueueOptions,
}

/// Execution record for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub batch: Batch,
    pub plan: Option<PlanRef>,
    pub model_id: Option<String>,
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Set when a caller cancels the job while it is processing
    pub cancel_requested: bool,
    /// Endpoint that claimed the job most recently
    pub endpoint: Option<String>,
}

impl Job {
    pub(crate) fn from_new(id: JobId, new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id,
            batch: new.batch,
            plan: new.plan,
            model_id: new.options.model_id,
            prompt: new.options.prompt,
            negative_prompt: new.options.negative_prompt,
            status: JobStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            error_message: None,
            cancel_requested: false,
            endpoint: None,
        }
    }

    /// Whether a worker for `endpoint` may run this job.
    pub fn accepts_endpoint(&self, endpoint: &str) -> bool {
        self.model_id.as_deref().map_or(true, |m| m == endpoint)
    }

    /// Move back to pending, clearing all claim and outcome fields.
    pub(crate) fn reset_to_pending(&mut self) {
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
        self.cancel_requested = false;
        self.endpoint = None;
    }
}
