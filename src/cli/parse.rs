//! CLI parse: clap types for mosaic. No behavior; definitions only.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Mosaic CLI - quadrant planning and generation orchestration
#[derive(Parser)]
#[command(name = "mosaic")]
#[command(about = "Plan and orchestrate quadrant-by-quadrant image generation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Target area shared by `plan` and `submit`.
#[derive(Args, Debug, Clone)]
pub struct AreaArgs {
    /// Planner: strip, rect or grow
    pub kind: String,

    /// Top-left quadrant, as x,y
    #[arg(long, allow_hyphen_values = true)]
    pub tl: String,

    /// Bottom-right quadrant, as x,y
    #[arg(long, allow_hyphen_values = true)]
    pub br: String,
}

/// Per-job options for enqueued work.
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Restrict jobs to one endpoint
    #[arg(long)]
    pub model: Option<String>,

    /// Prompt override
    #[arg(long)]
    pub prompt: Option<String>,

    /// Negative prompt override
    #[arg(long)]
    pub negative_prompt: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter config and create the store
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Compute a plan without enqueueing it
    Plan {
        #[command(flatten)]
        area: AreaArgs,
        /// Write the plan as JSON to this file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Plan an area (or load a saved plan) and enqueue it
    Submit {
        /// Saved plan file from `mosaic plan --out`
        #[arg(long, conflicts_with_all = ["kind", "tl", "br"])]
        plan: Option<PathBuf>,
        /// Planner: strip, rect or grow
        #[arg(required_unless_present = "plan")]
        kind: Option<String>,
        /// Top-left quadrant, as x,y
        #[arg(long, allow_hyphen_values = true, required_unless_present = "plan")]
        tl: Option<String>,
        /// Bottom-right quadrant, as x,y
        #[arg(long, allow_hyphen_values = true, required_unless_present = "plan")]
        br: Option<String>,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Enqueue one ad hoc batch
    Batch {
        /// Quadrants, e.g. "(0,0),(1,0)"
        #[arg(long, allow_hyphen_values = true)]
        quadrants: String,
        #[command(flatten)]
        job: JobArgs,
    },
    /// Show one job
    Status {
        id: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Cancel a pending or processing job
    Cancel { id: String },
    /// Return a failed job to pending
    Retry { id: String },
    /// List jobs and queue counts
    Queue {
        /// Only jobs with this status
        #[arg(long)]
        status: Option<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete finished jobs
    Prune {
        /// Minimum age of finished jobs to delete
        #[arg(long)]
        older_than_secs: u64,
    },
    /// Process queued jobs until nothing runnable remains
    Run {
        /// Run only this endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Manage reference pixels
    Reference {
        #[command(subcommand)]
        command: ReferenceCommands,
    },
    /// Write a generated quadrant to an image file
    Export {
        /// Quadrant, as x,y
        #[arg(long, allow_hyphen_values = true)]
        at: String,
        /// Output image path
        path: PathBuf,
    },
    /// Summarize generated quadrants
    Grid {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
pub enum ReferenceCommands {
    /// Import one quadrant of reference pixels
    Import {
        /// Quadrant, as x,y
        #[arg(long, allow_hyphen_values = true)]
        at: String,
        /// Image file
        path: PathBuf,
    },
    /// Split a large render into quadrant references
    ImportGrid {
        /// Quadrant that receives the image's top-left tile, as x,y
        #[arg(long, allow_hyphen_values = true)]
        tl: String,
        /// Image file
        path: PathBuf,
    },
    /// Mark a quadrant generated using existing pixels
    Seed {
        /// Quadrant, as x,y
        #[arg(long, allow_hyphen_values = true)]
        at: String,
        /// Image file
        path: PathBuf,
    },
}
