//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("storage.store_path", ".mosaic/store")?
        .set_default("template.quadrant_size", 512)?
        .set_default("template.border_width", 2)?
        .set_default("queue.invocation_timeout_secs", 600)?
        .set_default("queue.poll_interval_ms", 100)?
        .set_default("queue.max_queue_size", 10_000)?
        .set_default("planner.max_area", 1_048_576)
}
