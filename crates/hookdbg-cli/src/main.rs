#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use std::fs::File;
use std::path::PathBuf;

use miette::IntoDiagnostic;

use hookdbg_cli::{CliAction, CliOpts};

use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("HOOKDBG_LOG")
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let res = match cli.action {
        CliAction::Run {
            config,
            output,
            program,
        } => evaluate_run(config, output, program),
    };

    if let Err(e) = res {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

fn evaluate_run(config: String, output: Option<PathBuf>, program: PathBuf) -> miette::Result<()> {
    let config = hookdbg_cli::parse_run_config(config)?;

    if let Some(output) = output {
        let file = File::create(output).into_diagnostic()?;
        hookdbg_cli::evaluate_run(config, &program, file)
    } else {
        hookdbg_cli::evaluate_run(config, &program, std::io::stdout())
    }
}
