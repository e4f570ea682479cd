//! CLI presentation: text and json formatters per command family.

mod grid;
mod init;
mod jobs;
mod plan;

pub use grid::{format_grid_json, format_grid_text};
pub use init::format_init_summary;
pub use jobs::{
    format_enqueued, format_job_json, format_job_text, format_queue_json, format_queue_text,
    format_run_result,
};
pub use plan::{format_plan_json, format_plan_text};
