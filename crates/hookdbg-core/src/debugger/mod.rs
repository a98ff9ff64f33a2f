mod builder;
mod coordinator;
mod dispatch;
mod settings;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

pub use self::builder::{Builder, NeedsHandler, NeedsHost, Ready};
pub use self::settings::{DEFAULT_PRUNE_INTERVAL, Settings};
use crate::breakpoint::{Breakpoint, BreakpointManager, BreakpointPos};
use crate::context::{Context, ThreadTable};
use crate::error::{Error, HandlerError, HookError, Result};
use crate::handler::EventHandler;
use crate::host::Host;

/// In-process debugger, driven by the VM events of its host.
///
/// The host notifies every VM event to [handle_event](Self::handle_event),
/// on the thread the event occurred on. The debugger only processes events
/// while it is started (see [start](Self::start)).
pub struct Debugger<H: Host, F: EventHandler<H>> {
    host: H,
    handler: F,
    settings: Settings,

    shared: Mutex<Shared<H>>,

    /// Notified when the ticket is released, a context is resumed, or the
    /// debugger is stopped.
    wakeup: Condvar,

    /// Whether the debugger is started, shared with every context.
    active: Arc<AtomicBool>,

    /// Last assigned context sequence number.
    thnum_max: AtomicU64,

    /// Last assigned persistent breakpoint identifier.
    bkp_count: AtomicU32,
}

/// State shared by every thread processing events.
struct Shared<H: Host> {
    start_count: usize,
    session: Option<Session<H>>,
    catchpoint: Option<String>,
    hook_count: u64,
    last_check: u64,
    last_debugged_thnum: Option<u64>,
}

/// State living from the activation of the debugger to its deactivation.
struct Session<H: Host> {
    contexts: ThreadTable<H>,
    breakpoints: BreakpointManager,

    /// Thread currently holding the ticket.
    locker: Option<H::Thread>,

    /// Threads waiting for the ticket, in arrival order.
    waiting: VecDeque<H::Thread>,
}

impl<H: Host> Default for Session<H> {
    fn default() -> Self {
        Self {
            contexts: ThreadTable::default(),
            breakpoints: BreakpointManager::default(),
            locker: None,
            waiting: VecDeque::new(),
        }
    }
}

impl<H: Host, F: EventHandler<H>> Debugger<H, F> {
    pub(crate) fn new(host: H, handler: F, settings: Settings) -> Self {
        Self {
            host,
            handler,
            settings,
            shared: Mutex::new(Shared {
                start_count: 0,
                session: None,
                catchpoint: None,
                hook_count: 0,
                last_check: 0,
                last_debugged_thnum: None,
            }),
            wakeup: Condvar::new(),
            active: Arc::new(AtomicBool::new(false)),
            thnum_max: AtomicU64::new(0),
            bkp_count: AtomicU32::new(0),
        }
    }

    /// Returns the host runtime of the debugger.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Returns the front-end of the debugger.
    pub fn handler(&self) -> &F {
        &self.handler
    }

    /// Returns the settings of the debugger.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Returns whether the debugger is started.
    pub fn is_started(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Starts the debugger.
    ///
    /// Starts are counted, and the debugger only stops once
    /// [stop](Self::stop) was called as many times.
    ///
    /// Returns `true` if the debugger was not started yet.
    #[tracing::instrument(name = "Start", skip_all)]
    pub fn start(&self) -> bool {
        let mut shared = self.shared.lock();
        shared.start_count += 1;

        if shared.session.is_some() {
            return false;
        }

        shared.session = Some(Session::default());
        self.active.store(true, Ordering::Release);

        tracing::info!("debugger started");
        true
    }

    /// Stops the debugger.
    ///
    /// Returns `true` if the debugger was deactivated, or `false` if it is
    /// still started by other callers.
    #[tracing::instrument(name = "Stop", skip_all)]
    pub fn stop(&self) -> Result<bool> {
        let mut shared = self.shared.lock();

        if shared.session.is_none() {
            return Err(Error::NotStarted);
        }

        shared.start_count = shared.start_count.saturating_sub(1);

        if shared.start_count > 0 {
            tracing::debug!(start_count = shared.start_count, "still started");
            return Ok(false);
        }

        self.teardown(&mut shared);
        Ok(true)
    }

    /// Stops the debugger, regardless of how many times it was started.
    pub fn force_stop(&self) {
        let mut shared = self.shared.lock();
        shared.start_count = 0;

        if shared.session.is_some() {
            tracing::info!("forced deactivation");
            self.teardown(&mut shared);
        }
    }

    fn teardown(&self, shared: &mut Shared<H>) {
        shared.session = None;
        self.active.store(false, Ordering::Release);

        // parked threads check whether the debugger is still started
        self.wakeup.notify_all();

        tracing::info!("debugger stopped");
    }

    /// Starts the debugger, calls `f`, then stops the debugger.
    ///
    /// The debugger is stopped even if `f` panics.
    pub fn run<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.start();

        let _stop = StopOnDrop(self);
        f(self)
    }

    /// Runs `f` like [run](Self::run), from a fresh call stack of the current
    /// context.
    ///
    /// If `stop` is set, the current context halts on the first line event.
    pub fn load<R>(&self, stop: bool, f: impl FnOnce(&Self) -> R) -> Result<R> {
        self.run(|debugger| {
            let context = debugger.current_context()?;
            context.state().stack.clear();

            if stop {
                context.step(1, false)?;
            }

            Ok(f(debugger))
        })
    }

    /// Runs `f` without the debugger processing the events of the current
    /// thread.
    ///
    /// The previous state is restored even if `f` panics.
    pub fn skip<R>(&self, f: impl FnOnce() -> R) -> R {
        let Ok(context) = self.current_context() else {
            return f();
        };

        let previous = context.replace_skipped(true);
        let _restore = SkipGuard { context, previous };

        f()
    }

    pub(crate) fn new_context(&self, thread: &H::Thread) -> Context<H> {
        let thnum = self.thnum_max.fetch_add(1, Ordering::Relaxed) + 1;
        let ignored = self.host.is_debugger_thread(thread);

        Context::new(thread.clone(), thnum, self.active.clone(), ignored)
    }

    /// Returns the contexts of every live thread.
    ///
    /// Contexts of exited threads are discarded.
    pub fn contexts(&self) -> Result<Vec<Context<H>>> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        let threads = self.host.list_threads();
        Ok(session
            .contexts
            .rebuild(threads, |thread| self.new_context(thread)))
    }

    /// Returns the context of the current thread.
    pub fn current_context(&self) -> Result<Context<H>> {
        self.thread_context(&self.host.current_thread())
    }

    /// Returns the context of the given thread.
    pub fn thread_context(&self, thread: &H::Thread) -> Result<Context<H>> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        if !self.host.is_thread_alive(thread) {
            return Err(Error::UntrackedThread(format!("{thread:?}")));
        }

        Ok(session
            .contexts
            .lookup_or_create(thread, || self.new_context(thread)))
    }

    /// Returns the context which halted last, if it is still tracked.
    pub fn last_context(&self) -> Result<Option<Context<H>>> {
        let shared = self.shared.lock();
        let session = shared.session.as_ref().ok_or(Error::NotStarted)?;

        Ok(shared
            .last_debugged_thnum
            .and_then(|thnum| session.contexts.find_by_thnum(thnum)))
    }

    /// Makes the current context halt on its next line event.
    pub fn interrupt(&self) -> Result<()> {
        self.current_context()?.interrupt()
    }

    /// Makes the context which halted last halt on its next line event.
    ///
    /// Returns the interrupted context, if its thread is still alive.
    pub fn interrupt_last(&self) -> Result<Option<Context<H>>> {
        let Some(context) = self.last_context()? else {
            return Ok(None);
        };

        if !self.host.is_thread_alive(context.thread_ref()) {
            return Ok(None);
        }

        context.interrupt()?;
        Ok(Some(context))
    }

    /// Adds a persistent breakpoint.
    ///
    /// `source` is a file name when `pos` is a line, or a type name when
    /// `pos` is a method name.
    pub fn add_breakpoint(
        &self,
        source: &str,
        pos: impl Into<BreakpointPos>,
        condition: Option<&str>,
    ) -> Result<Arc<Breakpoint>> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        let id = self.bkp_count.fetch_add(1, Ordering::Relaxed) + 1;
        let bp = session
            .breakpoints
            .add(Breakpoint::new(id, source, pos.into(), condition));

        tracing::debug!(id, breakpoint = %bp, "breakpoint added");
        Ok(bp)
    }

    /// Removes a persistent breakpoint.
    pub fn remove_breakpoint(&self, id: u32) -> Result<Option<Arc<Breakpoint>>> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        let bp = session.breakpoints.remove(id);

        if bp.is_some() {
            tracing::debug!(id, "breakpoint removed");
        }

        Ok(bp)
    }

    /// Returns the persistent breakpoints, in creation order.
    pub fn breakpoints(&self) -> Result<Vec<Arc<Breakpoint>>> {
        let shared = self.shared.lock();
        let session = shared.session.as_ref().ok_or(Error::NotStarted)?;

        Ok(session.breakpoints.list())
    }

    /// Returns the name of the exception type halting the debugger when
    /// raised.
    pub fn catchpoint(&self) -> Result<Option<String>> {
        let shared = self.shared.lock();

        if shared.session.is_none() {
            return Err(Error::NotStarted);
        }

        Ok(shared.catchpoint.clone())
    }

    /// Sets or clears the catch-point.
    ///
    /// An exception matches the catch-point when its type, or any ancestor
    /// of its type, has the given name.
    pub fn set_catchpoint(&self, name: Option<&str>) -> Result<()> {
        let mut shared = self.shared.lock();

        if shared.session.is_none() {
            return Err(Error::NotStarted);
        }

        tracing::debug!(catchpoint = name, "catchpoint set");
        shared.catchpoint = name.map(str::to_owned);

        Ok(())
    }

    /// Enables or disables post-mortem tagging of raised exceptions.
    pub fn set_post_mortem(&self, enabled: bool) -> Result<()> {
        if !self.is_started() {
            return Err(Error::NotStarted);
        }

        self.settings.set_post_mortem(enabled);
        Ok(())
    }

    /// Runs `f` with post-mortem tagging of raised exceptions enabled.
    pub fn with_post_mortem<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        if self.settings.post_mortem() {
            return Err(Error::PostMortemActive);
        }

        self.set_post_mortem(true)?;
        let _restore = PostMortemGuard(&self.settings);

        Ok(f())
    }

    /// Enters the front-end on the dead context of a post-mortem.
    ///
    /// Other threads are suspended, and tracing is disabled, until the
    /// front-end returns.
    pub fn handle_post_mortem(
        &self,
        post_mortem: &PostMortem<H>,
    ) -> core::result::Result<(), HookError<F::Error>> {
        if post_mortem.context.state().stack.is_empty() {
            return Ok(());
        }

        let context = self.current_context()?;
        let tracing = (self.settings.tracing(), context.tracing()?);

        self.suspend_all()?;
        self.settings.set_tracing(false);
        context.set_tracing(false)?;

        tracing::info!(
            thnum = post_mortem.context.thnum(),
            file = &*post_mortem.file,
            line = post_mortem.line,
            "entering post-mortem"
        );

        let res = self
            .handler
            .at_line(&self.host, &post_mortem.context, &post_mortem.file, post_mortem.line)
            .map_err(HandlerError);

        self.settings.set_tracing(tracing.0);
        context.set_tracing(tracing.1)?;
        self.resume_all()?;

        Ok(res?)
    }
}

struct StopOnDrop<'a, H: Host, F: EventHandler<H>>(&'a Debugger<H, F>);

impl<H: Host, F: EventHandler<H>> Drop for StopOnDrop<'_, H, F> {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            tracing::debug!(error = %e, "debugger already stopped");
        }
    }
}

struct SkipGuard<H: Host> {
    context: Context<H>,
    previous: bool,
}

impl<H: Host> Drop for SkipGuard<H> {
    fn drop(&mut self) {
        self.context.replace_skipped(self.previous);
    }
}

struct PostMortemGuard<'a>(&'a Settings);

impl Drop for PostMortemGuard<'_> {
    fn drop(&mut self) {
        self.0.set_post_mortem(false);
    }
}

/// Post-mortem information attached to a raised exception.
pub struct PostMortem<H: Host> {
    file: Arc<str>,
    line: u32,
    binding: Option<H::Binding>,
    context: Context<H>,
}

impl<H: Host> PostMortem<H> {
    pub(crate) fn new(
        file: Arc<str>,
        line: u32,
        binding: Option<H::Binding>,
        context: Context<H>,
    ) -> Self {
        Self {
            file,
            line,
            binding,
            context,
        }
    }

    /// Returns the source file where the exception was raised.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Returns the source line where the exception was raised.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Returns the binding where the exception was raised.
    pub fn binding(&self) -> Option<&H::Binding> {
        self.binding.as_ref()
    }

    /// Returns the dead copy of the context which raised the exception.
    pub fn context(&self) -> &Context<H> {
        &self.context
    }
}

impl<H: Host> Clone for PostMortem<H> {
    fn clone(&self) -> Self {
        Self {
            file: self.file.clone(),
            line: self.line,
            binding: self.binding.clone(),
            context: self.context.clone(),
        }
    }
}

impl<H: Host> fmt::Debug for PostMortem<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostMortem")
            .field("file", &self.file)
            .field("line", &self.line)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
