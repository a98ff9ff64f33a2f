use super::Debugger;
use crate::context::{Context, ContextFlags};
use crate::error::{Error, Result};
use crate::handler::EventHandler;
use crate::host::{Host, ThreadStatus};

/// Permission to process an event, held by a single thread at a time.
///
/// The ticket is released when dropped.
pub(super) struct Ticket<'a, H: Host, F: EventHandler<H>> {
    debugger: &'a Debugger<H, F>,
}

impl<H: Host, F: EventHandler<H>> Drop for Ticket<'_, H, F> {
    fn drop(&mut self) {
        self.debugger.release_ticket();
    }
}

impl<H: Host, F: EventHandler<H>> Debugger<H, F> {
    /// Waits for the ticket to process an event on the given thread.
    ///
    /// The thread parks while another thread holds the ticket, or while its
    /// context is suspended. Waiting threads are handed the ticket in arrival
    /// order. Returns `None` if the debugger was stopped in the meantime, or
    /// if the thread already holds the ticket.
    pub(super) fn acquire_ticket(
        &self,
        thread: &H::Thread,
        context: &Context<H>,
    ) -> Option<Ticket<'_, H, F>> {
        let mut shared = self.shared.lock();

        // whether the ticket was handed over by a releasing thread
        let mut granted = false;

        loop {
            let session = shared.session.as_mut()?;

            let held_by_self = session.locker.as_ref().map(|locker| locker == thread);

            match held_by_self {
                None => session.locker = Some(thread.clone()),
                Some(true) => {
                    if !granted {
                        return None;
                    }
                }
                Some(false) => {
                    if !session.waiting.contains(thread) {
                        session.waiting.push_back(thread.clone());
                    }

                    // the releasing thread dequeues the waiter it hands over to
                    while shared
                        .session
                        .as_ref()
                        .is_some_and(|session| session.waiting.contains(thread))
                    {
                        self.wakeup.wait(&mut shared);
                    }

                    granted = true;
                    continue;
                }
            }

            if !context.state().flags.contains(ContextFlags::SUSPEND) {
                return Some(Ticket { debugger: self });
            }

            // suspended: pass the ticket on, and park until resumed
            session.locker = session.waiting.pop_front();
            granted = false;
            self.wakeup.notify_all();

            context.state().flags.insert(ContextFlags::WAS_RUNNING);
            tracing::debug!(thnum = context.thnum(), "parked while suspended");

            while shared.session.is_some() && context.state().flags.contains(ContextFlags::SUSPEND)
            {
                self.wakeup.wait(&mut shared);
            }
        }
    }

    /// Releases the ticket, handing it over to the first waiting thread.
    fn release_ticket(&self) {
        let mut guard = self.shared.lock();
        let shared = &mut *guard;

        if let Some(session) = shared.session.as_mut() {
            if shared.hook_count - shared.last_check > self.settings.prune_interval() {
                let pruned = session.contexts.prune(&self.host);
                shared.last_check = shared.hook_count;

                tracing::debug!(pruned, "pruned contexts of exited threads");
            }

            session.locker = session.waiting.pop_front();
        }

        drop(guard);
        self.wakeup.notify_all();
    }

    /// Suspends the contexts of every thread but the current one.
    pub fn suspend_all(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        let current = self.host.current_thread();
        let contexts = session
            .contexts
            .rebuild(self.host.list_threads(), |thread| self.new_context(thread));

        for context in contexts.iter().filter(|c| c.thread_ref() != &current) {
            self.suspend_context(context);
        }

        tracing::debug!(contexts = contexts.len(), "suspended all threads");
        Ok(())
    }

    /// Resumes the contexts of every thread but the current one.
    pub fn resume_all(&self) -> Result<()> {
        let mut shared = self.shared.lock();
        let session = shared.session.as_mut().ok_or(Error::NotStarted)?;

        let current = self.host.current_thread();
        let contexts = session
            .contexts
            .rebuild(self.host.list_threads(), |thread| self.new_context(thread));

        let mut resumed = 0;
        let mut wake = false;

        for context in contexts.iter().filter(|c| c.thread_ref() != &current) {
            if let Some(was_running) = resume_context(context) {
                resumed += 1;
                wake |= was_running;
            }
        }

        if wake {
            self.wakeup.notify_all();
        }

        tracing::debug!(resumed, wake, "resumed all threads");
        Ok(())
    }

    /// Suspends the given context.
    ///
    /// Its thread parks on its next event, until the context is resumed.
    pub fn suspend(&self, context: &Context<H>) -> Result<()> {
        let shared = self.shared.lock();

        if shared.session.is_none() {
            return Err(Error::NotStarted);
        }

        if context.state().flags.contains(ContextFlags::SUSPEND) {
            return Err(Error::AlreadySuspended);
        }

        self.suspend_context(context);
        Ok(())
    }

    /// Resumes the given context.
    pub fn resume(&self, context: &Context<H>) -> Result<()> {
        let shared = self.shared.lock();

        if shared.session.is_none() {
            return Err(Error::NotStarted);
        }

        let was_running = resume_context(context).ok_or(Error::NotSuspended)?;

        if was_running {
            self.wakeup.notify_all();
        }

        Ok(())
    }

    fn suspend_context(&self, context: &Context<H>) {
        let status = self.host.thread_status(context.thread_ref());
        let mut state = context.state();

        match status {
            ThreadStatus::Running => state.flags.insert(ContextFlags::WAS_RUNNING),
            ThreadStatus::Sleeping => state.flags.remove(ContextFlags::WAS_RUNNING),
            ThreadStatus::Other => return,
        }

        state.flags.insert(ContextFlags::SUSPEND);
    }
}

/// Clears the suspended flag of a context.
///
/// Returns whether the thread was running (and must be woken up), or `None`
/// if the context was not suspended. Threads which were sleeping when
/// suspended keep sleeping.
fn resume_context<H: Host>(context: &Context<H>) -> Option<bool> {
    let mut state = context.state();

    if !state.flags.contains(ContextFlags::SUSPEND) {
        return None;
    }

    state.flags.remove(ContextFlags::SUSPEND);
    Some(state.flags.contains(ContextFlags::WAS_RUNNING))
}
