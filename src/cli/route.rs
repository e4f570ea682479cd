//! CLI route: single route table and run context. Dispatches to the
//! generation service and presentation.

use crate::api::GenerationService;
use crate::config::ConfigLoader;
use crate::error::ApiError;
use crate::grid::{parse_coord_list, Coord};
use crate::init::initialize_workspace;
use crate::planner::{Plan, PlanKind, TargetArea};
use crate::queue::{EnqueueOptions, JobId, JobStatus};
use crate::template::decode_image;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::cli::parse::{AreaArgs, Commands, JobArgs, ReferenceCommands};
use crate::cli::presentation::{
    format_enqueued, format_grid_json, format_grid_text, format_init_summary, format_job_json,
    format_job_text, format_plan_json, format_plan_text, format_queue_json, format_queue_text,
    format_run_result,
};

/// Runtime context for CLI execution: workspace root and the generation service.
pub struct RunContext {
    service: GenerationService,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let service = GenerationService::open(&workspace_root, config)?;
        Ok(Self {
            service,
            workspace_root,
        })
    }

    pub fn service(&self) -> &GenerationService {
        &self.service
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Init { force } => {
                let result = initialize_workspace(&self.workspace_root, *force)?;
                Ok(format_init_summary(&result, *force))
            }
            Commands::Plan { area, out, format } => {
                let plan = self.service.plan(&parse_area(area)?)?;
                if let Some(path) = out {
                    write_file(path, format_plan_json(&plan).as_bytes())?;
                    info!(path = %path.display(), "Wrote plan");
                }
                render(format, || format_plan_text(&plan), || format_plan_json(&plan))
            }
            Commands::Submit {
                plan,
                kind,
                tl,
                br,
                job,
            } => {
                let plan = match plan {
                    Some(path) => load_plan(path)?,
                    None => {
                        let area = AreaArgs {
                            kind: required(kind, "kind")?,
                            tl: required(tl, "--tl")?,
                            br: required(br, "--br")?,
                        };
                        self.service.plan(&parse_area(&area)?)?
                    }
                };
                let ids = self.service.enqueue_plan(&plan, enqueue_options(job))?;
                Ok(format_enqueued(&ids))
            }
            Commands::Batch { quadrants, job } => {
                let coords = parse_coord_list(quadrants)?;
                let id = self.service.enqueue_batch(coords, enqueue_options(job))?;
                Ok(format_enqueued(&[id]))
            }
            Commands::Status { id, format } => {
                let job = self.service.status(id.parse::<JobId>()?)?;
                render(format, || format_job_text(&job), || format_job_json(&job))
            }
            Commands::Cancel { id } => {
                let id = id.parse::<JobId>()?;
                if self.service.cancel(id)? {
                    Ok(format!("Cancelled job {}", id))
                } else {
                    Ok(format!("Job {} has already finished", id))
                }
            }
            Commands::Retry { id } => {
                let job = self.service.retry(id.parse::<JobId>()?)?;
                Ok(format!("Job {} is {} again", job.id, job.status))
            }
            Commands::Queue { status, format } => {
                let status = status.as_deref().map(str::parse::<JobStatus>).transpose()?;
                let jobs = self.service.list_jobs(status)?;
                let stats = self.service.stats()?;
                render(
                    format,
                    || format_queue_text(&jobs, &stats),
                    || format_queue_json(&jobs, &stats),
                )
            }
            Commands::Prune { older_than_secs } => {
                let removed = self
                    .service
                    .prune(Duration::from_secs(*older_than_secs))?;
                Ok(format!("Pruned {} finished job(s)", removed))
            }
            Commands::Run {
                endpoint,
                timeout_secs,
            } => self.run_queue(endpoint.as_deref(), timeout_secs.map(Duration::from_secs)),
            Commands::Reference { command } => self.handle_reference_command(command),
            Commands::Export { at, path } => {
                let coord = at.parse::<Coord>()?;
                let image = self.service.export_generation(coord)?;
                image.save(path)?;
                Ok(format!("Exported {} to {}", coord, path.display()))
            }
            Commands::Grid { format } => {
                let summary = self.service.grid_summary()?;
                render(
                    format,
                    || format_grid_text(&summary),
                    || format_grid_json(&summary),
                )
            }
        }
    }

    fn run_queue(&self, endpoint: Option<&str>, timeout: Option<Duration>) -> Result<String, ApiError> {
        let queue = self.service.queue(endpoint)?;
        let workers = queue.endpoint_names();
        let runtime = tokio::runtime::Runtime::new().map_err(|e| {
            ApiError::ConfigError(format!("Failed to create async runtime: {}", e))
        })?;
        let stats = runtime.block_on(queue.run_until_idle(timeout))?;
        Ok(format_run_result(&stats, &workers))
    }

    fn handle_reference_command(&self, command: &ReferenceCommands) -> Result<String, ApiError> {
        match command {
            ReferenceCommands::Import { at, path } => {
                let coord = at.parse::<Coord>()?;
                self.service.import_reference(coord, &read_image(path)?)?;
                Ok(format!("Imported reference for {}", coord))
            }
            ReferenceCommands::ImportGrid { tl, path } => {
                let tl = tl.parse::<Coord>()?;
                let imported = self
                    .service
                    .import_reference_grid(tl, &read_image(path)?)?;
                Ok(format!(
                    "Imported {} reference quadrant(s) starting at {}",
                    imported.len(),
                    tl
                ))
            }
            ReferenceCommands::Seed { at, path } => {
                let coord = at.parse::<Coord>()?;
                self.service.import_generation(coord, &read_image(path)?)?;
                Ok(format!("Marked {} generated", coord))
            }
        }
    }
}

fn render(
    format: &str,
    text: impl FnOnce() -> String,
    json: impl FnOnce() -> String,
) -> Result<String, ApiError> {
    match format {
        "text" => Ok(text()),
        "json" => Ok(json()),
        other => Err(ApiError::ConfigError(format!(
            "Invalid format: {} (must be 'text' or 'json')",
            other
        ))),
    }
}

fn parse_area(area: &AreaArgs) -> Result<TargetArea, ApiError> {
    TargetArea::new(
        area.kind.parse::<PlanKind>()?,
        area.tl.parse::<Coord>()?,
        area.br.parse::<Coord>()?,
    )
}

fn required(value: &Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .clone()
        .ok_or_else(|| ApiError::ConfigError(format!("missing {}", name)))
}

fn enqueue_options(job: &JobArgs) -> EnqueueOptions {
    EnqueueOptions {
        model_id: job.model.clone(),
        prompt: job.prompt.clone(),
        negative_prompt: job.negative_prompt.clone(),
    }
}

fn load_plan(path: &Path) -> Result<Plan, ApiError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| ApiError::ConfigError(format!("Invalid plan file: {}", e)))?;
    // Accept both a bare plan and the `{ plan, summary }` document written by `plan --out`
    let plan_value = value.get("plan").cloned().unwrap_or(value);
    serde_json::from_value(plan_value)
        .map_err(|e| ApiError::ConfigError(format!("Invalid plan file: {}", e)))
}

fn read_image(path: &Path) -> Result<image::RgbaImage, ApiError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ApiError::ConfigError(format!("Failed to read {}: {}", path.display(), e)))?;
    decode_image(&bytes)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ApiError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            ApiError::ConfigError(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    std::fs::write(path, bytes)
        .map_err(|e| ApiError::ConfigError(format!("Failed to write {}: {}", path.display(), e)))
}
