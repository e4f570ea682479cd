//! Job and queue presentation.

use crate::queue::{Job, JobId};
use crate::store::QueueStats;
use chrono::{DateTime, Utc};
use comfy_table::Table;

fn timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn format_job_text(job: &Job) -> String {
    let mut output = format!("Job {}\n", job.id);
    output.push_str(&format!("  Status:    {}\n", job.status));
    output.push_str(&format!("  Batch:     {} ({})\n", job.batch, job.batch.shape()));
    if let Some(plan) = job.plan {
        output.push_str(&format!("  Plan:      {} step {}\n", plan.plan_id, plan.seq));
    }
    if let Some(model) = &job.model_id {
        output.push_str(&format!("  Model:     {}\n", model));
    }
    if let Some(endpoint) = &job.endpoint {
        output.push_str(&format!("  Endpoint:  {}\n", endpoint));
    }
    output.push_str(&format!("  Created:   {}\n", timestamp(Some(job.created_at))));
    output.push_str(&format!("  Started:   {}\n", timestamp(job.started_at)));
    output.push_str(&format!("  Finished:  {}\n", timestamp(job.completed_at)));
    if job.cancel_requested {
        output.push_str("  Cancel:    requested\n");
    }
    if let Some(message) = &job.error_message {
        output.push_str(&format!("  Error:     {}\n", message));
    }
    output
}

pub fn format_job_json(job: &Job) -> String {
    serde_json::to_string_pretty(job).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_queue_text(jobs: &[Job], stats: &QueueStats) -> String {
    let mut output = format!(
        "Queue: {} pending, {} processing, {} complete, {} error\n",
        stats.pending, stats.processing, stats.complete, stats.error
    );
    for (endpoint, id) in &stats.processing_by_endpoint {
        output.push_str(&format!("  {} is running job {}\n", endpoint, id));
    }
    if jobs.is_empty() {
        output.push_str("\nNo jobs.\n");
        return output;
    }
    output.push('\n');

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Status", "Batch", "Plan", "Endpoint", "Error"]);
    for job in jobs {
        let plan = job
            .plan
            .map(|p| format!("{}#{}", p.plan_id, p.seq))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            job.id.to_string(),
            job.status.to_string(),
            job.batch.to_string(),
            plan,
            job.endpoint.clone().unwrap_or_else(|| "-".to_string()),
            job.error_message.clone().unwrap_or_default(),
        ]);
    }
    output.push_str(&table.to_string());
    output
}

pub fn format_queue_json(jobs: &[Job], stats: &QueueStats) -> String {
    let out = serde_json::json!({ "stats": stats, "jobs": jobs });
    serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_enqueued(ids: &[JobId]) -> String {
    match ids {
        [] => "Nothing to enqueue: the area is already generated or queued.".to_string(),
        [id] => format!("Enqueued job {}", id),
        [first, .., last] => format!("Enqueued {} jobs ({}..{})", ids.len(), first, last),
    }
}

pub fn format_run_result(stats: &QueueStats, workers: &[String]) -> String {
    format!(
        "Processed with {} worker(s) [{}]\nQueue: {} pending, {} processing, {} complete, {} error",
        workers.len(),
        workers.join(", "),
        stats.pending,
        stats.processing,
        stats.complete,
        stats.error
    )
}
