use hookdbg_core::handler::EventHandler;
use hookdbg_core::{Breakpoint, Context, StopReason};
use hookdbg_replay::{ReplayHost, ReplayValue};
use kdl::{KdlEntry, KdlNode};
use parking_lot::Mutex;

use crate::config::ResumeMode;

/// Debugger front-end recording the halts of a session.
///
/// It never blocks: once a halt is recorded, the halted context is resumed
/// according to the configured [ResumeMode].
pub struct RecordingHandler {
    resume: ResumeMode,
    records: Mutex<Vec<Record>>,
    pending: Mutex<Option<Pending>>,
}

/// Callback received before the line callback of the same halt.
enum Pending {
    Breakpoint(u32),
    Catchpoint(String),
}

impl RecordingHandler {
    /// Creates a new recording front-end.
    pub const fn new(resume: ResumeMode) -> Self {
        Self {
            resume,
            records: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
        }
    }

    /// Returns the records of the session, in order of occurrence.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    fn resume(&self, context: &Context<ReplayHost>) -> hookdbg_core::Result<()> {
        match self.resume {
            ResumeMode::Continue => Ok(()),
            ResumeMode::Step => context.step(1, false),
            ResumeMode::Next => context.step_over(1, None, false),
            ResumeMode::Finish => context.stop_frame(0),
        }
    }
}

impl EventHandler<ReplayHost> for RecordingHandler {
    type Error = hookdbg_core::Error;

    fn at_line(
        &self,
        host: &ReplayHost,
        context: &Context<ReplayHost>,
        file: &str,
        line: u32,
    ) -> Result<(), Self::Error> {
        let pending = self.pending.lock().take();

        let locals = context
            .frame_locals(host, 0)?
            .into_iter()
            .map(|(name, value)| (name, value.to_string()))
            .collect();

        let record = HaltRecord {
            thread: context.thread()?.name().to_owned(),
            thnum: context.thnum(),
            file: file.to_owned(),
            line,
            reason: context.stop_reason()?,
            depth: context.stack_size()?,
            method: context.frame_method(0)?.map(|method| method.to_string()),
            breakpoint: match pending {
                Some(Pending::Breakpoint(id)) => Some(id),
                _ => None,
            },
            exception: match pending {
                Some(Pending::Catchpoint(ref class)) => Some(class.clone()),
                _ => None,
            },
            locals,
        };

        tracing::info!(
            thread = %record.thread,
            file,
            line,
            reason = ?record.reason,
            "halted"
        );

        self.records.lock().push(Record::Halt(record));
        self.resume(context)
    }

    fn at_breakpoint(
        &self,
        _host: &ReplayHost,
        _context: &Context<ReplayHost>,
        breakpoint: &Breakpoint,
    ) -> Result<(), Self::Error> {
        *self.pending.lock() = Some(Pending::Breakpoint(breakpoint.id()));
        Ok(())
    }

    fn at_catchpoint(
        &self,
        _host: &ReplayHost,
        _context: &Context<ReplayHost>,
        exception: &ReplayValue,
    ) -> Result<(), Self::Error> {
        let class = match exception {
            ReplayValue::Exception { class, .. } => class.to_string(),
            other => other.to_string(),
        };

        *self.pending.lock() = Some(Pending::Catchpoint(class));
        Ok(())
    }

    fn at_tracing(
        &self,
        _host: &ReplayHost,
        context: &Context<ReplayHost>,
        file: &str,
        line: u32,
    ) -> Result<(), Self::Error> {
        self.records.lock().push(Record::Trace(TraceRecord {
            thnum: context.thnum(),
            file: file.to_owned(),
            line,
            depth: context.stack_size()?,
        }));

        Ok(())
    }
}

/// Event recorded during a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// A context halted.
    Halt(HaltRecord),

    /// A traced line was executed.
    Trace(TraceRecord),
}

/// Information about a halt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaltRecord {
    /// Name of the halted thread.
    pub thread: String,

    /// Sequence number of the halted context.
    pub thnum: u64,

    /// Source file of the halt.
    pub file: String,

    /// Source line of the halt.
    pub line: u32,

    /// Why the context halted.
    pub reason: StopReason,

    /// Call stack depth.
    pub depth: usize,

    /// Method of the innermost frame.
    pub method: Option<String>,

    /// Breakpoint hit, if any.
    pub breakpoint: Option<u32>,

    /// Exception class caught, if any.
    pub exception: Option<String>,

    /// Local variables of the innermost frame.
    pub locals: Vec<(String, String)>,
}

/// Information about a traced line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Sequence number of the tracing context.
    pub thnum: u64,

    /// Source file of the line.
    pub file: String,

    /// Source line.
    pub line: u32,

    /// Call stack depth.
    pub depth: usize,
}

impl Record {
    pub(crate) fn dump_to_kdl_node(&self) -> KdlNode {
        match self {
            Self::Halt(halt) => halt.dump_to_kdl_node(),
            Self::Trace(trace) => trace.dump_to_kdl_node(),
        }
    }
}

impl HaltRecord {
    fn dump_to_kdl_node(&self) -> KdlNode {
        let mut node = KdlNode::new("halt");

        node.entries_mut().push(KdlEntry::new(self.file.as_str()));
        node.entries_mut().push(KdlEntry::new(i128::from(self.line)));

        node.entries_mut()
            .push(KdlEntry::new_prop("thread", self.thread.as_str()));
        node.entries_mut()
            .push(KdlEntry::new_prop("thnum", i128::from(self.thnum)));
        node.entries_mut()
            .push(KdlEntry::new_prop("reason", stop_reason_name(self.reason)));
        node.entries_mut().push(KdlEntry::new_prop(
            "depth",
            i128::try_from(self.depth).unwrap_or(i128::MAX),
        ));

        if let Some(ref method) = self.method {
            node.entries_mut()
                .push(KdlEntry::new_prop("method", method.as_str()));
        }

        if let Some(id) = self.breakpoint {
            node.entries_mut()
                .push(KdlEntry::new_prop("breakpoint", i128::from(id)));
        }

        if let Some(ref exception) = self.exception {
            node.entries_mut()
                .push(KdlEntry::new_prop("exception", exception.as_str()));
        }

        for (name, value) in &self.locals {
            node.ensure_children().nodes_mut().push({
                let mut local = KdlNode::new("local");
                local.entries_mut().push(KdlEntry::new(name.as_str()));
                local.entries_mut().push(KdlEntry::new(value.as_str()));
                local
            });
        }

        node
    }
}

impl TraceRecord {
    fn dump_to_kdl_node(&self) -> KdlNode {
        let mut node = KdlNode::new("trace");

        node.entries_mut().push(KdlEntry::new(self.file.as_str()));
        node.entries_mut().push(KdlEntry::new(i128::from(self.line)));

        node.entries_mut()
            .push(KdlEntry::new_prop("thnum", i128::from(self.thnum)));
        node.entries_mut().push(KdlEntry::new_prop(
            "depth",
            i128::try_from(self.depth).unwrap_or(i128::MAX),
        ));

        node
    }
}

fn stop_reason_name(reason: StopReason) -> &'static str {
    match reason {
        StopReason::Initial => "initial",
        StopReason::Step => "step",
        StopReason::Breakpoint => "breakpoint",
        StopReason::Catchpoint => "catchpoint",
        StopReason::PostMortem => "post-mortem",
    }
}
