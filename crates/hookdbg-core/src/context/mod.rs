mod frame;
mod table;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use parking_lot::{Mutex, MutexGuard};

pub(crate) use self::frame::{CallStack, Frame};
pub(crate) use self::table::ThreadTable;
use crate::breakpoint::{Breakpoint, BreakpointPos, TEMPORARY_BREAKPOINT_ID};
use crate::error::{Error, Result};
use crate::host::{self, Host, Locals, MethodId, Position, TypeShape};

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub(crate) struct ContextFlags: u16 {
        /// Suspended by a front-end command.
        const SUSPEND = 1 << 1;
        /// Trace notifications are enabled for this context.
        const TRACING = 1 << 2;
        /// Within a skipped section.
        const SKIPPED = 1 << 3;
        /// Never triggers debugger logic.
        const IGNORE = 1 << 4;
        /// Post-mortem copy of a context.
        const DEAD = 1 << 5;
        /// Was running when suspended.
        const WAS_RUNNING = 1 << 6;
        /// Position changed since the last halt.
        const MOVED = 1 << 7;
        /// A non-line event occurred since the last halt.
        const STEPPED = 1 << 8;
        /// Stepping ignores position changes.
        const FORCE_MOVE = 1 << 9;
    }
}

/// Why a context last halted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    /// The context never halted.
    #[default]
    Initial,

    /// Halted at the end of a step.
    Step,

    /// Halted on a breakpoint.
    Breakpoint,

    /// Halted on a raised exception matching the catch-point.
    Catchpoint,

    /// Post-mortem copy of a context.
    PostMortem,
}

/// Counter of remaining events before a halt.
///
/// A counter is either disabled or counting down to `0`. Ticking a counter
/// which reached `0` disables it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Countdown(Option<u32>);

impl Countdown {
    pub const DISABLED: Self = Self(None);

    pub fn armed(count: u32) -> Self {
        Self(Some(count))
    }

    pub fn is_due(self) -> bool {
        self.0 == Some(0)
    }

    pub fn tick(&mut self) {
        self.0 = match self.0 {
            Some(0) | None => None,
            Some(n) => Some(n - 1),
        };
    }
}

/// Mutable state of a context.
pub(crate) struct ContextState<H: Host> {
    pub flags: ContextFlags,
    pub stop_reason: StopReason,

    /// Remaining line events before a halt.
    pub stop_next: Countdown,

    /// Stack depth at which `stop_next` and `stop_line` are consulted.
    pub dest_frame: Option<usize>,

    /// Remaining position changes before a halt.
    pub stop_line: Countdown,

    /// Stack depth whose return arms a one-step halt.
    pub stop_frame: Option<usize>,

    /// Position of the last halt.
    pub last_position: Option<Position>,

    /// Temporary breakpoint of the context.
    pub breakpoint: Option<Arc<Breakpoint>>,

    pub stack: CallStack<H>,
}

impl<H: Host> ContextState<H> {
    fn new(flags: ContextFlags) -> Self {
        Self {
            flags,
            stop_reason: StopReason::Initial,
            stop_next: Countdown::DISABLED,
            dest_frame: None,
            stop_line: Countdown::DISABLED,
            stop_frame: None,
            last_position: None,
            breakpoint: None,
            stack: CallStack::default(),
        }
    }

    /// Records the position of the innermost frame as the position of the
    /// last halt.
    pub fn save_current_position(&mut self) {
        let Some(frame) = self.stack.top() else {
            return;
        };

        self.last_position = Some(Position::new(frame.file.clone(), frame.line));
        self.flags
            .remove(ContextFlags::MOVED | ContextFlags::STEPPED | ContextFlags::FORCE_MOVE);
    }

    pub fn reset_stepping(&mut self) {
        self.stop_next = Countdown::DISABLED;
        self.dest_frame = None;
        self.stop_line = Countdown::DISABLED;
    }

    fn frame(&self, index: i64) -> Result<&Frame<H>> {
        let size = self.stack.len();
        let pos = check_frame(index, size)?;

        self.stack
            .get(pos)
            .ok_or(Error::FrameOutOfRange { index, size })
    }
}

fn check_frame(index: i64, size: usize) -> Result<usize> {
    let pos = usize::try_from(index).map_err(|_| Error::InvalidFrame(index))?;

    if pos >= size {
        return Err(Error::FrameOutOfRange { index, size });
    }

    Ok(pos)
}

/// Debug context of a host thread.
///
/// Cloning a context is cheap, and clones refer to the same context.
pub struct Context<H: Host> {
    inner: Arc<ContextInner<H>>,
}

struct ContextInner<H: Host> {
    thread: H::Thread,
    thnum: u64,
    active: Arc<AtomicBool>,
    state: Mutex<ContextState<H>>,
}

impl<H: Host> Clone for Context<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: Host> PartialEq for Context<H> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<H: Host> Eq for Context<H> {}

impl<H: Host> fmt::Debug for Context<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("thnum", &self.inner.thnum)
            .field("thread", &self.inner.thread)
            .finish_non_exhaustive()
    }
}

impl<H: Host> Context<H> {
    pub(crate) fn new(
        thread: H::Thread,
        thnum: u64,
        active: Arc<AtomicBool>,
        ignored: bool,
    ) -> Self {
        let mut flags = ContextFlags::empty();
        flags.set(ContextFlags::IGNORE, ignored);

        Self {
            inner: Arc::new(ContextInner {
                thread,
                thnum,
                active,
                state: Mutex::new(ContextState::new(flags)),
            }),
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ContextState<H>> {
        self.inner.state.lock()
    }

    pub(crate) fn thread_ref(&self) -> &H::Thread {
        &self.inner.thread
    }

    /// Creates a dead copy of this context, whose frames no longer reference
    /// any live scope.
    pub(crate) fn freeze(&self, host: &H) -> Self {
        let state = self.state();

        let mut frozen = ContextState::new(ContextFlags::DEAD);
        frozen.stop_reason = state.stop_reason;
        frozen.last_position = state.last_position.clone();
        frozen.stack = state.stack.snapshot_all(host);

        Self {
            inner: Arc::new(ContextInner {
                thread: self.inner.thread.clone(),
                thnum: self.inner.thnum,
                active: self.inner.active.clone(),
                state: Mutex::new(frozen),
            }),
        }
    }

    /// Sets whether the context is within a skipped section, returning the
    /// previous value.
    pub(crate) fn replace_skipped(&self, skipped: bool) -> bool {
        let mut state = self.state();
        let previous = state.flags.contains(ContextFlags::SKIPPED);
        state.flags.set(ContextFlags::SKIPPED, skipped);
        previous
    }

    fn check_started(&self) -> Result<()> {
        if self.inner.active.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::NotStarted)
        }
    }

    fn flag(&self, flag: ContextFlags) -> Result<bool> {
        self.check_started()?;
        Ok(self.state().flags.contains(flag))
    }

    /// Returns the sequence number of the context.
    pub fn thnum(&self) -> u64 {
        self.inner.thnum
    }

    /// Returns the thread of the context.
    pub fn thread(&self) -> Result<H::Thread> {
        self.check_started()?;
        Ok(self.inner.thread.clone())
    }

    /// Returns the number of frames on the call stack.
    pub fn stack_size(&self) -> Result<usize> {
        self.check_started()?;
        Ok(self.state().stack.len())
    }

    /// Returns why the context last halted.
    pub fn stop_reason(&self) -> Result<StopReason> {
        self.check_started()?;

        let state = self.state();

        if state.flags.contains(ContextFlags::DEAD) {
            Ok(StopReason::PostMortem)
        } else {
            Ok(state.stop_reason)
        }
    }

    /// Returns whether the context is suspended.
    pub fn is_suspended(&self) -> Result<bool> {
        self.flag(ContextFlags::SUSPEND)
    }

    /// Returns whether the context never triggers any debugger logic.
    pub fn is_ignored(&self) -> Result<bool> {
        self.flag(ContextFlags::IGNORE)
    }

    /// Returns whether this context is a post-mortem copy.
    pub fn is_dead(&self) -> Result<bool> {
        self.flag(ContextFlags::DEAD)
    }

    /// Returns whether trace notifications are enabled for this context.
    pub fn tracing(&self) -> Result<bool> {
        self.flag(ContextFlags::TRACING)
    }

    /// Enables or disables trace notifications for this context.
    pub fn set_tracing(&self, enabled: bool) -> Result<()> {
        self.check_started()?;
        self.state().flags.set(ContextFlags::TRACING, enabled);
        Ok(())
    }

    /// Halts after the given number of line events.
    ///
    /// Unless `force` is set, only line events at a new position are counted.
    pub fn step(&self, steps: i64, force: bool) -> Result<()> {
        self.check_started()?;

        let steps = u32::try_from(steps).map_err(|_| Error::NegativeSteps)?;

        let mut state = self.state();
        state.stop_next = Countdown::armed(steps);
        state.flags.set(ContextFlags::FORCE_MOVE, force);

        tracing::debug!(thnum = self.inner.thnum, steps, force, "step");
        Ok(())
    }

    /// Halts after the given number of line changes, counted in the given
    /// frame (or the innermost frame).
    pub fn step_over(&self, lines: i64, frame: Option<i64>, force: bool) -> Result<()> {
        self.check_started()?;

        let lines = u32::try_from(lines).map_err(|_| Error::NegativeSteps)?;

        let mut state = self.state();
        let size = state.stack.len();

        if size == 0 {
            return Err(Error::NoFrames);
        }

        let dest_frame = match frame {
            Some(frame) => size - check_frame(frame, size)?,
            None => size,
        };

        state.stop_line = Countdown::armed(lines);
        state.flags.remove(ContextFlags::STEPPED);
        state.dest_frame = Some(dest_frame);
        state.flags.set(ContextFlags::FORCE_MOVE, force);

        tracing::debug!(thnum = self.inner.thnum, lines, dest_frame, force, "step over");
        Ok(())
    }

    /// Halts in the caller of the given frame, once the frame returned.
    pub fn stop_frame(&self, frame: i64) -> Result<()> {
        self.check_started()?;

        let mut state = self.state();
        let size = state.stack.len();
        let stop_frame = size - check_frame(frame, size)?;

        state.stop_frame = Some(stop_frame);

        tracing::debug!(thnum = self.inner.thnum, stop_frame, "stop frame");
        Ok(())
    }

    /// Halts on the next line event.
    pub fn interrupt(&self) -> Result<()> {
        self.step(1, false)
    }

    /// Returns the temporary breakpoint of the context.
    pub fn breakpoint(&self) -> Result<Option<Arc<Breakpoint>>> {
        self.check_started()?;
        Ok(self.state().breakpoint.clone())
    }

    /// Sets the temporary breakpoint of the context.
    ///
    /// It is cleared once it halted the context.
    pub fn set_breakpoint(
        &self,
        source: &str,
        pos: impl Into<BreakpointPos>,
        condition: Option<&str>,
    ) -> Result<Arc<Breakpoint>> {
        self.check_started()?;

        let bp = Arc::new(Breakpoint::new(
            TEMPORARY_BREAKPOINT_ID,
            source,
            pos.into(),
            condition,
        ));
        self.state().breakpoint = Some(bp.clone());

        Ok(bp)
    }

    /// Clears the temporary breakpoint of the context.
    pub fn clear_breakpoint(&self) -> Result<Option<Arc<Breakpoint>>> {
        self.check_started()?;
        Ok(self.state().breakpoint.take())
    }

    /// Returns the binding of the given frame.
    ///
    /// When no binding was captured for the frame, one is synthesized by the
    /// host from the frame's locals.
    pub fn frame_binding(&self, host: &H, frame: i64) -> Result<Option<H::Binding>> {
        self.check_started()?;

        let state = self.state();
        let frame = state.frame(frame)?;

        if let Some(binding) = &frame.binding {
            return Ok(Some(binding.clone()));
        }

        let locals = frame.locals(host);
        Ok(host.synthesize_binding(frame.receiver.as_ref(), &locals))
    }

    /// Returns the method of the given frame.
    pub fn frame_method(&self, frame: i64) -> Result<Option<MethodId>> {
        self.check_started()?;
        Ok(self.state().frame(frame)?.method.clone())
    }

    /// Returns the source file of the given frame.
    pub fn frame_file(&self, frame: i64) -> Result<Arc<str>> {
        self.check_started()?;
        Ok(self.state().frame(frame)?.file.clone())
    }

    /// Returns the source line of the given frame.
    pub fn frame_line(&self, frame: i64) -> Result<u32> {
        self.check_started()?;
        Ok(self.state().frame(frame)?.line)
    }

    /// Returns the local variables of the given frame.
    pub fn frame_locals(&self, host: &H, frame: i64) -> Result<Locals<H::Value>> {
        self.check_started()?;
        Ok(self.state().frame(frame)?.locals(host))
    }

    /// Returns the receiver of the given frame.
    pub fn frame_self(&self, frame: i64) -> Result<Option<H::Value>> {
        self.check_started()?;
        Ok(self.state().frame(frame)?.receiver.clone())
    }

    /// Returns the class or module enclosing the method of the given frame.
    pub fn frame_class(&self, host: &H, frame: i64) -> Result<Option<H::Type>> {
        self.check_started()?;

        let state = self.state();
        let frame = state.frame(frame)?;

        if state.flags.contains(ContextFlags::DEAD) {
            return Ok(None);
        }

        let Some(ty) = &frame.enclosing_type else {
            return Ok(None);
        };

        let ty = host::real_type(host, ty);

        match host.type_shape(&ty) {
            TypeShape::Class | TypeShape::Module => Ok(Some(ty)),
            _ => Ok(None),
        }
    }
}
