use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;

use hookdbg_core::{BreakpointPos, Builder, Debugger};
use hookdbg_replay::{Program, ReplayHost};
use kdl::KdlDocument;
use miette::IntoDiagnostic;

use crate::{BreakConfig, DebugConfig, RecordingHandler};

/// Runs the subcommand for replaying a program under the debugger.
///
/// Every halt (and every traced line, if tracing is enabled) is dumped to
/// `output` in KDL format, once the replay completed.
pub fn evaluate_run(
    config: DebugConfig,
    program: &Path,
    mut output: impl Write,
) -> miette::Result<()> {
    let program = Program::from_file(program)?;

    let mut builder = Builder::new()
        .with_host(ReplayHost::new())
        .with_handler(RecordingHandler::new(config.continue_with))
        .tracing(config.tracing)
        .post_mortem(config.post_mortem)
        .keep_frame_binding(config.keep_frame_binding)
        .debug(config.debug);

    if let Some(interval) = config.prune_interval {
        builder = builder.prune_interval(interval);
    }

    let debugger = builder.build();

    debugger.run(|debugger| replay(debugger, &config, &program))?;

    let mut kdl = KdlDocument::new();

    for record in debugger.handler().records() {
        kdl.nodes_mut().push(record.dump_to_kdl_node());
    }

    kdl.autoformat();

    output
        .write_all(kdl.to_string().as_bytes())
        .into_diagnostic()?;

    Ok(())
}

fn replay(
    debugger: &Debugger<ReplayHost, RecordingHandler>,
    config: &DebugConfig,
    program: &Program,
) -> miette::Result<()> {
    for breakpoint in &config.breakpoints {
        let pos = breakpoint_pos(breakpoint)?;

        let breakpoint = debugger
            .add_breakpoint(&breakpoint.source, pos, breakpoint.cond.as_deref())
            .into_diagnostic()?;

        tracing::info!(id = breakpoint.id(), breakpoint = %breakpoint, "breakpoint added");
    }

    debugger
        .set_catchpoint(config.catchpoint.as_deref())
        .into_diagnostic()?;

    let mut initial_step = config.step;

    hookdbg_replay::run_with(debugger, program, |thread, decl| {
        if decl.is_debugger() {
            return Ok(());
        }

        if let Some(steps) = initial_step.take() {
            debugger.thread_context(thread)?.step(i64::from(steps), false)?;
        }

        Ok(())
    })
    .into_diagnostic()
}

fn breakpoint_pos(breakpoint: &BreakConfig) -> miette::Result<BreakpointPos> {
    match (breakpoint.line, &breakpoint.method) {
        (Some(line), None) => Ok(BreakpointPos::Line(line)),
        (None, Some(method)) => Ok(BreakpointPos::Method(method.clone())),
        _ => miette::bail!(
            "breakpoint on `{}` needs exactly one of `line` or `method`",
            breakpoint.source
        ),
    }
}

/// Parses a debugging configuration, either inline or from a `.kdl` file.
pub fn parse_run_config(config: String) -> miette::Result<DebugConfig> {
    let path = Path::new(&config);

    let config = if let Some((filename, "kdl")) = path
        .file_name()
        .and_then(OsStr::to_str)
        .zip(path.extension().and_then(OsStr::to_str))
    {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        knus::parse(filename, &content)?
    } else {
        knus::parse("<content>", &config)?
    };

    Ok(config)
}
