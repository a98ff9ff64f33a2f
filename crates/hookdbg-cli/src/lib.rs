//! Crate implementing the CLI commands.

mod cli;
mod config;
mod recorder;
mod run;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{BreakConfig, DebugConfig, ResumeMode};
pub use self::recorder::{HaltRecord, Record, RecordingHandler, TraceRecord};
pub use self::run::{evaluate_run, parse_run_config};
