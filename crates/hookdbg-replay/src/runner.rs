use std::sync::Arc;
use std::time::Duration;

use hookdbg_core::handler::EventHandler;
use hookdbg_core::host::{Event, EventKind, MethodId, Position, ThreadStatus};
use hookdbg_core::{Debugger, HookError};
use parking_lot::Mutex;

use crate::error::Error;
use crate::host::{ReplayHost, ReplayThread};
use crate::program::{Program, Step, ThreadDecl};
use crate::value::{ReplayScope, ReplayType, ReplayValue};

/// Source file of top-level code, before the first line step.
const TOP_LEVEL_FILE: &str = "<main>";

/// Replays a program into a debugger.
///
/// Every thread of the program runs on its own OS thread, and they are all
/// started at once. Returns once all of them exited.
///
/// # Errors
///
/// The first error returned by the debugger hook ends its thread, and is
/// returned once every thread exited.
pub fn run<F>(debugger: &Debugger<ReplayHost, F>, program: &Program) -> Result<(), Error<F::Error>>
where
    F: EventHandler<ReplayHost>,
    F::Error: Send,
{
    run_with(debugger, program, |_, _| Ok(()))
}

/// Replays a program into a debugger, calling `spawned` on every replayed
/// thread before any of them starts.
///
/// This lets the caller prepare the context of a thread (e.g., arm a step)
/// before its first event.
///
/// # Errors
///
/// Same as [run]. An error returned by `spawned` aborts the replay before
/// any thread starts.
#[tracing::instrument(name = "Replay", skip_all)]
pub fn run_with<F>(
    debugger: &Debugger<ReplayHost, F>,
    program: &Program,
    mut spawned: impl FnMut(&ReplayThread, &ThreadDecl) -> hookdbg_core::Result<()>,
) -> Result<(), Error<F::Error>>
where
    F: EventHandler<ReplayHost>,
    F::Error: Send,
{
    let host = debugger.host();
    host.declare(program);

    let threads = program
        .threads
        .iter()
        .map(|decl| {
            let thread = host.spawn_thread(&decl.name);

            if decl.is_debugger() {
                host.set_debugger_thread(&thread);
            }

            (thread, decl)
        })
        .collect::<Vec<_>>();

    let prepared = threads
        .iter()
        .try_for_each(|(thread, decl)| spawned(thread, decl));

    if let Err(e) = prepared {
        for (thread, _) in &threads {
            host.exit_thread(thread);
        }

        return Err(HookError::<F::Error>::Debugger(e).into());
    }

    let first_error = Mutex::new(None);

    std::thread::scope(|s| {
        let handles: Vec<_> = threads
            .into_iter()
            .map(|(thread, decl)| {
                let first_error = &first_error;

                let handle = s.spawn(move || {
                    if let Err(e) = run_thread(debugger, &thread, decl) {
                        tracing::warn!(thread = %thread, error = %e, "replayed thread failed");
                        keep_first(first_error, e);
                    }
                });

                (decl.name.as_str(), handle)
            })
            .collect();

        for (name, handle) in handles {
            if handle.join().is_err() {
                keep_first(&first_error, Error::ThreadPanicked(name.to_owned()));
            }
        }
    });

    match first_error.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn keep_first<E>(slot: &Mutex<Option<Error<E>>>, e: Error<E>) {
    let mut slot = slot.lock();

    if slot.is_none() {
        *slot = Some(e);
    }
}

fn run_thread<F: EventHandler<ReplayHost>>(
    debugger: &Debugger<ReplayHost, F>,
    thread: &ReplayThread,
    decl: &ThreadDecl,
) -> Result<(), Error<F::Error>> {
    let host = debugger.host();
    host.bind_current(thread);

    let _span = tracing::info_span!("Thread", name = %thread).entered();

    let mut interp = Interpreter {
        debugger,
        thread,
        root: Activation {
            position: Position::new(TOP_LEVEL_FILE, 0),
            method: None,
            ty: Some(ReplayType::new("Object")),
            receiver: ReplayValue::Object {
                class: "Object".into(),
            },
            scope: ReplayScope::default(),
        },
        stack: vec![],
    };

    let res = interp.exec(&decl.steps);

    let res = match res {
        Ok(Flow::Raised(exception)) => interp.uncaught(&exception),
        Ok(Flow::Next) => Ok(()),
        Err(e) => Err(e),
    };

    host.exit_thread(thread);
    res
}

/// Outcome of executed steps.
enum Flow {
    Next,
    Raised(ReplayValue),
}

/// Call, block or class body activation of a replayed thread.
struct Activation {
    position: Position,
    method: Option<MethodId>,
    ty: Option<ReplayType>,
    receiver: ReplayValue,
    scope: ReplayScope,
}

struct Interpreter<'a, F: EventHandler<ReplayHost>> {
    debugger: &'a Debugger<ReplayHost, F>,
    thread: &'a ReplayThread,

    /// Top-level activation.
    root: Activation,

    /// Activations nested in the top-level one.
    stack: Vec<Activation>,
}

impl<F: EventHandler<ReplayHost>> Interpreter<'_, F> {
    fn exec(&mut self, steps: &[Step]) -> Result<Flow, Error<F::Error>> {
        for step in steps {
            if let Flow::Raised(exception) = self.step(step)? {
                return Ok(Flow::Raised(exception));
            }
        }

        Ok(Flow::Next)
    }

    fn step(&mut self, step: &Step) -> Result<Flow, Error<F::Error>> {
        match step {
            Step::Line(pos) | Step::Branch(pos) => {
                let top = self.top_mut();
                top.position = Position::new(pos.file.as_str(), pos.line);

                let conditional = matches!(step, Step::Branch(_));
                self.emit(self.event(EventKind::Line { conditional }))?;
            }
            Step::Call(call) => {
                let caller = self.top();

                let ty = call
                    .ty
                    .as_deref()
                    .map(ReplayType::new)
                    .or_else(|| caller.ty.clone());

                let receiver = match &ty {
                    Some(ty) => ReplayValue::Object {
                        class: ty.name().into(),
                    },
                    None => caller.receiver.clone(),
                };

                let position = Position::new(
                    call.file
                        .as_deref()
                        .map_or_else(|| caller.position.file.clone(), Arc::from),
                    call.line.unwrap_or(caller.position.line),
                );

                self.stack.push(Activation {
                    position,
                    method: Some(MethodId::new(call.method.as_str())),
                    ty,
                    receiver,
                    scope: ReplayScope::default(),
                });

                self.emit(self.event(EventKind::Call))?;
                let flow = self.exec(&call.body)?;
                self.emit(self.event(EventKind::Return))?;

                self.stack.pop();
                return Ok(flow);
            }
            Step::NativeCall(call) => {
                let block_given = !call.body.is_empty();
                let method = MethodId::new(call.method.as_str());
                let ty = call.ty.as_deref().map(ReplayType::new);

                self.emit(self.native_event(
                    EventKind::NativeCall { block_given },
                    &method,
                    ty.as_ref(),
                ))?;

                let flow = if block_given {
                    let caller = self.top();

                    let block = Activation {
                        position: caller.position.clone(),
                        method: caller.method.clone(),
                        ty: caller.ty.clone(),
                        receiver: caller.receiver.clone(),
                        scope: caller.scope.block(),
                    };

                    self.stack.push(block);
                    let flow = self.exec(&call.body);
                    self.stack.pop();

                    flow?
                } else {
                    Flow::Next
                };

                self.emit(self.native_event(
                    EventKind::NativeReturn { block_given },
                    &method,
                    ty.as_ref(),
                ))?;
                return Ok(flow);
            }
            Step::Class(class) => {
                let caller = self.top();

                let position = Position::new(
                    caller.position.file.clone(),
                    class.line.unwrap_or(caller.position.line),
                );

                self.stack.push(Activation {
                    position,
                    method: None,
                    ty: Some(ReplayType::new(class.name.as_str())),
                    receiver: ReplayValue::Object {
                        class: "Class".into(),
                    },
                    scope: ReplayScope::default(),
                });

                self.emit(self.event(EventKind::ClassOpen))?;
                let flow = self.exec(&class.body)?;
                self.emit(self.event(EventKind::ClassClose))?;

                self.stack.pop();
                return Ok(flow);
            }
            Step::Return(ret) => {
                let event = self
                    .event(EventKind::Return)
                    .with_method(ret.method.as_str());

                self.emit(event)?;
            }
            Step::Set(set) => {
                self.top().scope.set(&set.name, ReplayValue::parse(&set.value));
            }
            Step::Sleep(wait) => {
                let host = self.debugger.host();

                host.set_status(self.thread, ThreadStatus::Sleeping);
                std::thread::sleep(Duration::from_millis(wait.millis));
                host.set_status(self.thread, ThreadStatus::Running);
            }
            Step::Pause(wait) => std::thread::sleep(Duration::from_millis(wait.millis)),
            Step::Raise(raise) => {
                let exception = self.debugger.host().new_exception(&raise.class);

                tracing::debug!(thread = %self.thread, exception = %exception, "raise");

                self.emit(self.event(EventKind::Raise {
                    exception: exception.clone(),
                }))?;

                return Ok(Flow::Raised(exception));
            }
            Step::Rescue(block) => {
                if let Flow::Raised(exception) = self.exec(&block.body)? {
                    tracing::debug!(thread = %self.thread, exception = %exception, "rescued");
                }
            }
            Step::Repeat(repeat) => {
                for _ in 0..repeat.count {
                    if let Flow::Raised(exception) = self.exec(&repeat.body)? {
                        return Ok(Flow::Raised(exception));
                    }
                }
            }
        }

        Ok(Flow::Next)
    }

    /// Handles an exception which unwound the whole thread.
    ///
    /// The front-end is entered on the post-mortem context of the exception,
    /// if one was attached.
    fn uncaught(&self, exception: &ReplayValue) -> Result<(), Error<F::Error>> {
        tracing::info!(thread = %self.thread, exception = %exception, "uncaught exception");

        if !self.debugger.is_started() {
            return Ok(());
        }

        let Some(post_mortem) = self.debugger.host().post_mortem(exception) else {
            return Ok(());
        };

        self.debugger.handle_post_mortem(&post_mortem)?;
        Ok(())
    }

    fn top(&self) -> &Activation {
        self.stack.last().unwrap_or(&self.root)
    }

    fn top_mut(&mut self) -> &mut Activation {
        match self.stack.last_mut() {
            Some(top) => top,
            None => &mut self.root,
        }
    }

    fn event(&self, kind: EventKind<ReplayHost>) -> Event<ReplayHost> {
        let top = self.top();

        let mut event = Event::new(kind)
            .at(top.position.clone())
            .with_receiver(top.receiver.clone())
            .with_scope(top.scope.clone());

        if let Some(method) = &top.method {
            event = event.with_method(method.clone());
        }

        if let Some(ty) = &top.ty {
            event = event.with_type(ty.clone());
        }

        event
    }

    /// Creates an event for a native method, executing within the current
    /// activation.
    fn native_event(
        &self,
        kind: EventKind<ReplayHost>,
        method: &MethodId,
        ty: Option<&ReplayType>,
    ) -> Event<ReplayHost> {
        let event = self.event(kind).with_method(method.clone());

        match ty {
            Some(ty) => event.with_type(ty.clone()),
            None => event,
        }
    }

    fn emit(&self, event: Event<ReplayHost>) -> Result<(), Error<F::Error>> {
        let host = self.debugger.host();
        host.enter_scope(&self.top().scope);

        self.debugger.handle_event(event)?;
        Ok(())
    }
}
