//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to the generation service.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{AreaArgs, Cli, Commands, JobArgs, ReferenceCommands};
pub use route::RunContext;
