//! Per-endpoint worker loop.

use crate::batch::check_legality;
use crate::endpoint::{EndpointConfig, EndpointRequest, ModelEndpoint, DEFAULT_PROMPT};
use crate::error::ApiError;
use crate::queue::{Job, Signal};
use crate::store::{Completion, GenerationStore, StorePixels};
use crate::template::{build_template, encode_png, extract_outputs, TemplateConfig};
use image::RgbaImage;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub(crate) struct WorkerContext {
    pub endpoint: Arc<dyn ModelEndpoint>,
    pub settings: EndpointConfig,
    pub store: Arc<dyn GenerationStore>,
    pub template: TemplateConfig,
    pub invocation_timeout: Duration,
    pub poll_interval: Duration,
    pub signal: Arc<Signal>,
    pub idle_epoch: Arc<AtomicU64>,
}

pub(crate) async fn worker_loop(ctx: WorkerContext) {
    let name = ctx.endpoint.name().to_string();
    debug!(endpoint = %name, "Worker started");

    while ctx.signal.is_running() {
        let epoch = ctx.signal.epoch();
        let job = match ctx.store.claim_next(&name) {
            Ok(job) => job,
            Err(e) => {
                error!(endpoint = %name, error = %e, "Failed to claim job");
                ctx.signal.wait(ctx.poll_interval).await;
                continue;
            }
        };

        let Some(job) = job else {
            ctx.idle_epoch.store(epoch, Ordering::SeqCst);
            ctx.signal.wait(ctx.poll_interval).await;
            continue;
        };
        ctx.idle_epoch.store(0, Ordering::SeqCst);

        let started = Instant::now();
        info!(
            endpoint = %name,
            job_id = %job.id,
            batch = %job.batch,
            "Processing job"
        );

        match run_job(&ctx, &job).await {
            Ok(Completion::Completed(_)) => {
                info!(
                    endpoint = %name,
                    job_id = %job.id,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job complete"
                );
            }
            Ok(Completion::Cancelled(_)) => {
                info!(endpoint = %name, job_id = %job.id, "Job cancelled during invocation");
            }
            Err(e) => {
                warn!(
                    endpoint = %name,
                    job_id = %job.id,
                    error = %e,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job failed"
                );
                if let Err(store_err) = ctx.store.fail_job(job.id, &e.to_string()) {
                    error!(job_id = %job.id, error = %store_err, "Failed to record job failure");
                }
            }
        }

        // Finishing a job may unblock the next one of its plan
        ctx.signal.wake();
    }

    debug!(endpoint = %name, "Worker stopped");
}

async fn run_job(ctx: &WorkerContext, job: &Job) -> Result<Completion, ApiError> {
    let grid = ctx.store.load_grid()?;
    check_legality(&job.batch, &grid).into_result(&job.batch)?;

    let template = build_template(
        &job.batch,
        &grid,
        &StorePixels(ctx.store.as_ref()),
        &ctx.template,
    )?;
    let request = resolve_request(job, &ctx.settings, template.image.clone());

    let image = tokio::time::timeout(ctx.invocation_timeout, ctx.endpoint.generate(request))
        .await
        .map_err(|_| ApiError::Timeout(ctx.invocation_timeout))??;

    let outputs = encode_outputs(extract_outputs(
        &image,
        &job.batch,
        &template.placement,
        &ctx.template,
    )?)?;
    ctx.store.complete_job(job.id, &outputs)
}

/// Job settings take precedence over endpoint defaults.
pub(crate) fn resolve_request(
    job: &Job,
    settings: &EndpointConfig,
    template: RgbaImage,
) -> EndpointRequest {
    EndpointRequest {
        template,
        prompt: job
            .prompt
            .clone()
            .or_else(|| settings.default_prompt.clone())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
        negative_prompt: job
            .negative_prompt
            .clone()
            .or_else(|| settings.default_negative_prompt.clone()),
        num_inference_steps: settings.num_inference_steps,
        seed: settings.seed,
    }
}

fn encode_outputs(
    outputs: BTreeMap<crate::grid::Coord, RgbaImage>,
) -> Result<BTreeMap<crate::grid::Coord, Vec<u8>>, ApiError> {
    outputs
        .into_iter()
        .map(|(coord, tile)| Ok((coord, encode_png(&tile)?)))
        .collect()
}
