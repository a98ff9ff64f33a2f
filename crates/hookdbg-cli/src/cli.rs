use std::path::PathBuf;

/// The hookdbg debugger.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to replay a scripted program under the debugger, and dump
    /// every halt of the session.
    Run {
        /// Debugging configuration (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file for the debugging session. Otherwise it is directly parsed as
        /// inline KDL-formatted configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Path to the optional destination of the session dump.
        #[clap(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Path to the program to replay (KDL format).
        program: PathBuf,
    },
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}
