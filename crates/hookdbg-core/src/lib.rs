//! This crate implements an in-process debugger, embedded in a host
//! interpreter as a VM event hook.
//!
//! The host notifies every VM event (line, call, return, class body,
//! native call, raise) to the [Debugger], on the thread the event occurred
//! on. The debugger maintains a shadow call stack for every thread, decides
//! whether the thread must halt (stepping, breakpoints, catch-point), and
//! calls the front-end synchronously when it does.
//!
//! Three components must be provided:
//! - A [Host](self::host::Host), giving access to the host runtime (threads,
//!   bindings, scopes, types, expression evaluation).
//! - An [EventHandler](self::handler::EventHandler), the front-end consuming
//!   halts and issuing stepping commands.
//! - Calls to [Debugger::handle_event] from the host's event hook.
//!
//! ```no_run
//! use std::convert::Infallible;
//!
//! use hookdbg_core::handler::EventHandler;
//! use hookdbg_core::{BreakpointPos, Builder, Context};
//! use hookdbg_replay::{Program, ReplayHost};
//! use miette::IntoDiagnostic;
//!
//! struct StepEverywhere;
//!
//! impl EventHandler<ReplayHost> for StepEverywhere {
//!     type Error = Infallible;
//!
//!     fn at_line(
//!         &self,
//!         _host: &ReplayHost,
//!         context: &Context<ReplayHost>,
//!         file: &str,
//!         line: u32,
//!     ) -> Result<(), Self::Error> {
//!         tracing::info!(file, line, "halted");
//!
//!         // halt again on the next line
//!         context.step(1, false).ok();
//!         Ok(())
//!     }
//! }
//!
//! let program = Program::parse("program.kdl", r#"thread "main" { line "a.src" 1; }"#)?;
//!
//! let debugger = Builder::new()
//!     .with_host(ReplayHost::new())
//!     .with_handler(StepEverywhere)
//!     .build();
//!
//! debugger.start();
//! debugger
//!     .add_breakpoint("a.src", BreakpointPos::Line(1), None)
//!     .into_diagnostic()?;
//!
//! hookdbg_replay::run(&debugger, &program).into_diagnostic()?;
//!
//! debugger.stop().into_diagnostic()?;
//! # Ok::<(), miette::Report>(())
//! ```

mod breakpoint;
mod context;
mod debugger;
mod error;

/// Module containing the trait for implementing a debugger front-end.
pub mod handler;

/// Module containing the trait for embedding the debugger in a host runtime.
pub mod host;

pub use self::breakpoint::{Breakpoint, BreakpointKind, BreakpointPos, TEMPORARY_BREAKPOINT_ID};
pub use self::context::{Context, StopReason};
pub use self::debugger::{
    Builder, DEFAULT_PRUNE_INTERVAL, Debugger, NeedsHandler, NeedsHost, PostMortem, Ready, Settings,
};
pub use self::error::{Error, HandlerError, HookError, Result};
