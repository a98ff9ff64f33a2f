use std::sync::Arc;

use super::{Debugger, PostMortem};
use crate::breakpoint::Breakpoint;
use crate::context::{Context, ContextFlags, ContextState, Countdown, Frame, StopReason};
use crate::error::{HandlerError, HookError};
use crate::handler::EventHandler;
use crate::host::{self, Event, EventKind, Host, MethodId, Position, TypeShape};

type HookResult<E> = Result<(), HookError<E>>;

/// Data of the event being dispatched, besides its kind.
struct EventData<H: Host> {
    position: Position,
    receiver: Option<H::Value>,
    method: Option<MethodId>,
    enclosing_type: Option<H::Type>,
    scope: Option<H::Scope>,
}

impl<H: Host, F: EventHandler<H>> Debugger<H, F> {
    /// Processes a VM event which occurred on the current thread.
    ///
    /// This is the hook the host must call on every VM event. It returns
    /// once the event was processed, which includes the whole time spent in
    /// the front-end if the thread halted.
    ///
    /// # Errors
    ///
    /// Errors returned by the front-end are propagated.
    pub fn handle_event(&self, event: Event<H>) -> HookResult<F::Error> {
        if !self.is_started() {
            return Ok(());
        }

        let thread = self.host.current_thread();

        let context = {
            let mut shared = self.shared.lock();
            shared.hook_count += 1;

            if let Some(method) = &event.method {
                if self.host.is_allocator(method) {
                    return Ok(());
                }
            }

            let Some(session) = shared.session.as_mut() else {
                return Ok(());
            };

            session
                .contexts
                .lookup_or_create(&thread, || self.new_context(&thread))
        };

        if context.state().flags.contains(ContextFlags::IGNORE) {
            return Ok(());
        }

        let Some(_ticket) = self.acquire_ticket(&thread, &context) else {
            return Ok(());
        };

        self.dispatch(&context, event)
    }

    fn dispatch(&self, context: &Context<H>, event: Event<H>) -> HookResult<F::Error> {
        let Event {
            kind,
            position,
            receiver,
            method,
            enclosing_type,
            scope,
        } = event;

        if context.state().flags.contains(ContextFlags::SKIPPED) {
            return Ok(());
        }

        if self.settings.debug() {
            tracing::trace!(
                thnum = context.thnum(),
                event = kind.name(),
                file = position.as_ref().map(|pos| &*pos.file),
                line = position.as_ref().map(|pos| pos.line),
                method = method.as_ref().map(MethodId::as_str),
                "event"
            );
        }

        let moved = {
            let mut state = context.state();

            let moved = position
                .as_ref()
                .is_some_and(|pos| state.last_position.as_ref() != Some(pos));

            if moved {
                state.flags.insert(ContextFlags::MOVED);
            }

            if !matches!(kind, EventKind::Line { .. }) {
                state.flags.insert(ContextFlags::STEPPED);
            }

            moved
        };

        let Some(position) = position else {
            // nodeless events only matter for returns
            if matches!(kind, EventKind::Return) {
                self.on_return(context, method.as_ref());
            }
            return Ok(());
        };

        let data = EventData {
            position,
            receiver,
            method,
            enclosing_type,
            scope,
        };

        match kind {
            EventKind::Line { conditional } => self.on_line(context, data, conditional, moved),
            EventKind::Call => self.on_call(context, data),
            EventKind::NativeCall { block_given } => {
                if self.opens_native_frame(data.enclosing_type.as_ref(), block_given) {
                    context.state().stack.push(self.new_frame(&data));
                } else {
                    set_frame_source(&mut context.state(), &data, true);
                }
                Ok(())
            }
            EventKind::NativeReturn { block_given } => {
                if self.opens_native_frame(data.enclosing_type.as_ref(), block_given) {
                    self.on_return(context, data.method.as_ref());
                }
                Ok(())
            }
            EventKind::Return | EventKind::ClassClose => {
                self.on_return(context, data.method.as_ref());
                Ok(())
            }
            EventKind::ClassOpen => {
                let mut state = context.state();

                if let Some(frame) = state.stack.top_mut() {
                    frame.method = None;
                }

                state.stack.push(self.new_frame(&data));
                Ok(())
            }
            EventKind::Raise { exception } => self.on_raise(context, data, exception),
        }
    }

    fn on_line(
        &self,
        context: &Context<H>,
        data: EventData<H>,
        conditional: bool,
        moved: bool,
    ) -> HookResult<F::Error> {
        {
            let mut state = context.state();

            if state.stack.is_empty() {
                state.stack.push(self.new_frame(&data));
            } else {
                set_frame_source(&mut state, &data, false);
            }
        }

        // conditions of control structures never halt
        if conditional {
            return Ok(());
        }

        let Position { file, line } = &data.position;

        if self.settings.tracing() || context.state().flags.contains(ContextFlags::TRACING) {
            self.handler
                .at_tracing(&self.host, context, file, *line)
                .map_err(HandlerError)?;
        }

        let step_due = {
            let mut state = context.state();
            let depth = state.stack.len();
            let force = state.flags.contains(ContextFlags::FORCE_MOVE);

            match state.dest_frame {
                Some(dest) if depth < dest => {
                    // the frame of a step over returned
                    state.stop_next = Countdown::armed(0);
                }
                Some(dest) if depth > dest => (),
                _ => {
                    if moved || force {
                        state.stop_next.tick();
                    }

                    if moved || force || state.flags.contains(ContextFlags::STEPPED) {
                        state.stop_line.tick();
                        state.flags.remove(ContextFlags::STEPPED);
                    }
                }
            }

            state.stop_next.is_due() || state.stop_line.is_due()
        };

        let breakpoint = if step_due {
            None
        } else {
            match self.find_breakpoint(context, |bp| bp.matches_position(file, *line)) {
                Some(bp) => Some(bp),
                None => return Ok(()),
            }
        };

        let binding = data
            .receiver
            .as_ref()
            .map(|receiver| self.host.create_binding(receiver));

        {
            let mut state = context.state();
            save_top_binding(&mut state, binding.clone());
            state.stop_reason = StopReason::Step;
        }

        if let Some(bp) = breakpoint {
            if !self.check_condition(&bp, binding.as_ref()) {
                return Ok(());
            }

            self.notify_breakpoint(context, &bp)?;
        }

        context.state().reset_stepping();

        self.call_at_line(context, file, *line)
    }

    fn on_call(&self, context: &Context<H>, data: EventData<H>) -> HookResult<F::Error> {
        context.state().stack.push(self.new_frame(&data));

        let type_name = data
            .enclosing_type
            .as_ref()
            .and_then(|ty| self.host.type_name(&host::real_type(&self.host, ty)));

        let Some(bp) = self.find_breakpoint(context, |bp| {
            bp.matches_method(type_name.as_deref(), data.method.as_ref())
        }) else {
            return Ok(());
        };

        let binding = {
            let mut state = context.state();

            let binding = state
                .stack
                .top()
                .and_then(|frame| frame.binding.clone())
                .or_else(|| {
                    data.receiver
                        .as_ref()
                        .map(|receiver| self.host.create_binding(receiver))
                });

            save_top_binding(&mut state, binding.clone());
            binding
        };

        if !self.check_condition(&bp, binding.as_ref()) {
            return Ok(());
        }

        self.notify_breakpoint(context, &bp)?;

        self.call_at_line(context, &data.position.file, data.position.line)
    }

    fn on_return(&self, context: &Context<H>, method: Option<&MethodId>) {
        let mut state = context.state();

        if state.stop_frame == Some(state.stack.len()) {
            state.stop_next = Countdown::armed(1);
            state.stop_frame = None;

            tracing::debug!(thnum = context.thnum(), "frame finished, stopping in caller");
        }

        let popped = state.stack.pop_matching(method);

        if popped > 1 {
            tracing::warn!(
                thnum = context.thnum(),
                popped,
                method = method.map(MethodId::as_str),
                "return discarded unmatched frames"
            );
        }
    }

    fn on_raise(
        &self,
        context: &Context<H>,
        data: EventData<H>,
        exception: H::Value,
    ) -> HookResult<F::Error> {
        set_frame_source(&mut context.state(), &data, false);

        let mut binding = None;

        if self.settings.post_mortem() {
            if let Some(receiver) = &data.receiver {
                binding = Some(self.host.create_binding(receiver));

                let post_mortem = PostMortem::new(
                    data.position.file.clone(),
                    data.position.line,
                    binding.clone(),
                    context.freeze(&self.host),
                );

                self.host.attach_post_mortem(&exception, post_mortem);
            }
        }

        if self.host.is_exit_exception(&exception) {
            self.force_stop();
            return Ok(());
        }

        let Some(catchpoint) = self.shared.lock().catchpoint.clone() else {
            return Ok(());
        };

        let caught = self
            .host
            .exception_ancestors(&exception)
            .iter()
            .any(|name| *name == catchpoint);

        if !caught {
            return Ok(());
        }

        tracing::debug!(thnum = context.thnum(), catchpoint = %catchpoint, "exception caught");

        context.state().stop_reason = StopReason::Catchpoint;

        self.handler
            .at_catchpoint(&self.host, context, &exception)
            .map_err(HandlerError)?;

        if binding.is_none() {
            binding = data
                .receiver
                .as_ref()
                .map(|receiver| self.host.create_binding(receiver));
        }

        save_top_binding(&mut context.state(), binding);

        self.call_at_line(context, &data.position.file, data.position.line)
    }

    fn new_frame(&self, data: &EventData<H>) -> Frame<H> {
        let binding = if self.settings.keep_frame_binding() {
            data.receiver
                .as_ref()
                .map(|receiver| self.host.create_binding(receiver))
        } else {
            None
        };

        Frame::new(
            data.position.file.clone(),
            data.position.line,
            data.method.clone(),
            data.receiver.clone(),
            binding,
        )
        .with_type(data.enclosing_type.clone())
        .with_scope(data.scope.clone())
    }

    /// Returns whether a native call gets its own frame.
    fn opens_native_frame(&self, ty: Option<&H::Type>, block_given: bool) -> bool {
        if block_given {
            return true;
        }

        let Some(ty) = ty else {
            return false;
        };

        let ty = host::real_type(&self.host, ty);

        if !matches!(
            self.host.type_shape(&ty),
            TypeShape::Class | TypeShape::Module
        ) {
            return false;
        }

        self.host.type_name(&ty).is_some_and(|name| {
            self.settings
                .block_host_types()
                .iter()
                .any(|host_type| *host_type == name)
        })
    }

    /// Looks for a breakpoint matching the current event, starting with the
    /// temporary breakpoint of the context.
    ///
    /// Breakpoints only match once the context moved since its last halt.
    fn find_breakpoint(
        &self,
        context: &Context<H>,
        pred: impl Fn(&Breakpoint) -> bool,
    ) -> Option<Arc<Breakpoint>> {
        let temporary = {
            let state = context.state();

            if !state.flags.contains(ContextFlags::MOVED) {
                return None;
            }

            state.breakpoint.clone()
        };

        if let Some(bp) = temporary.filter(|bp| pred(&**bp)) {
            return Some(bp);
        }

        let shared = self.shared.lock();
        shared.session.as_ref()?.breakpoints.find(pred)
    }

    /// Evaluates the guard of a breakpoint.
    ///
    /// Evaluation failures are considered as a false guard.
    fn check_condition(&self, bp: &Breakpoint, binding: Option<&H::Binding>) -> bool {
        let Some(expr) = bp.condition() else {
            return true;
        };

        match self.host.eval_condition(expr, binding) {
            Ok(res) => res,
            Err(e) => {
                tracing::debug!(id = bp.id(), expr, error = %e, "breakpoint condition failed");
                false
            }
        }
    }

    /// Notifies a breakpoint halt to the front-end, or clears the temporary
    /// breakpoint which halted.
    fn notify_breakpoint(
        &self,
        context: &Context<H>,
        bp: &Arc<Breakpoint>,
    ) -> Result<(), HandlerError<F::Error>> {
        {
            let mut state = context.state();

            let is_temporary = state
                .breakpoint
                .as_ref()
                .is_some_and(|own| Arc::ptr_eq(own, bp));

            if is_temporary {
                state.breakpoint = None;
                return Ok(());
            }

            state.stop_reason = StopReason::Breakpoint;
        }

        tracing::debug!(thnum = context.thnum(), id = bp.id(), "breakpoint hit");

        self.handler
            .at_breakpoint(&self.host, context, bp)
            .map_err(HandlerError)
    }

    fn call_at_line(&self, context: &Context<H>, file: &str, line: u32) -> HookResult<F::Error> {
        self.shared.lock().last_debugged_thnum = Some(context.thnum());
        context.state().save_current_position();

        tracing::debug!(thnum = context.thnum(), file, line, "halted");

        self.handler
            .at_line(&self.host, context, file, line)
            .map_err(HandlerError)?;

        Ok(())
    }
}

/// Updates the innermost frame with the data of the current event.
fn set_frame_source<H: Host>(state: &mut ContextState<H>, data: &EventData<H>, native: bool) {
    let Some(frame) = state.stack.top_mut() else {
        return;
    };

    frame.receiver = data.receiver.clone();
    frame.file = data.position.file.clone();
    frame.line = data.position.line;
    frame.method = data.method.clone();

    // native calls have no scope of their own
    if !native && data.scope.is_some() {
        frame.set_scope(data.scope.clone());
    }
}

fn save_top_binding<H: Host>(state: &mut ContextState<H>, binding: Option<H::Binding>) {
    if let Some(frame) = state.stack.top_mut() {
        frame.binding = binding;
    }
}
