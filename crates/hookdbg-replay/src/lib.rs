//! This crate implements a scripted host runtime for `hookdbg-core`.
//!
//! A [Program] describes, in KDL, the steps executed by each thread of a
//! multi-threaded program: source lines, method calls, native calls with
//! blocks, class bodies, variable assignments and exception raises.
//! [run] replays it on real OS threads, notifying every VM event to a
//! [Debugger](hookdbg_core::Debugger) hosted by a [ReplayHost].

mod error;
mod eval;
mod host;
mod program;
mod runner;
mod value;

pub use self::error::{Error, EvalError};
pub use self::eval::evaluate;
pub use self::host::{ReplayHost, ReplayThread};
pub use self::program::{
    BlockStep, CallStep, ClassStep, ExceptionDecl, LineStep, NativeCallStep, Program, RaiseStep,
    RepeatStep, ReturnStep, SetStep, Step, ThreadDecl, TypeDecl, WaitStep,
};
pub use self::runner::{run, run_with};
pub use self::value::{BindingVars, ReplayBinding, ReplayScope, ReplayType, ReplayValue};
