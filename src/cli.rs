//! CLI domain: parse, route, output, and presentation only.
//! No domain orchestration; single route table dispatches to domain services.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{map_error, ErrorStatus};
pub use parse::{CacheCommands, Cli, Commands, OutputFormat, SessionCommands, WorkflowArgs};
pub use route::RunContext;
