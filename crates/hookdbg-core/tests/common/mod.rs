#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::{Duration, Instant};

use hookdbg_core::handler::EventHandler;
use hookdbg_core::{Breakpoint, BreakpointPos, Builder, Context, Debugger, StopReason};
use hookdbg_replay::{Program, ReplayHost, ReplayValue};
use parking_lot::Mutex;

pub type TestDebugger = Debugger<ReplayHost, Recorder>;

type Probe = Box<dyn Fn(&ReplayHost, &Context<ReplayHost>) -> String + Send + Sync>;

/// Stepping command issued by the recorder when a context halts.
#[derive(Clone, Debug)]
pub enum Command {
    Continue,
    Step(i64),
    StepForce(i64),
    Next,
    Finish,
    RunTo(&'static str, u32),
}

/// Halt observed by the recorder.
#[derive(Clone, Debug)]
pub struct Halt {
    pub thnum: u64,
    pub file: String,
    pub line: u32,
    pub reason: StopReason,
    pub depth: usize,
    pub locals: Vec<(String, String)>,
    pub probe: Option<String>,
    pub entered: Instant,
    pub left: Instant,
}

/// Front-end recording every callback, and replaying a script of stepping
/// commands.
#[derive(Default)]
pub struct Recorder {
    script: Mutex<VecDeque<Command>>,
    probe: Option<Probe>,
    dwell: Option<Duration>,

    pub halts: Mutex<Vec<Halt>>,
    pub breakpoints: Mutex<Vec<u32>>,
    pub catches: Mutex<Vec<String>>,
    pub traces: Mutex<Vec<(String, u32, usize)>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.script.lock().extend(commands);
        self
    }

    pub fn probe(
        mut self,
        probe: impl Fn(&ReplayHost, &Context<ReplayHost>) -> String + Send + Sync + 'static,
    ) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn dwell(mut self, dwell: Duration) -> Self {
        self.dwell = Some(dwell);
        self
    }

    pub fn halts(&self) -> Vec<Halt> {
        self.halts.lock().clone()
    }

    pub fn positions(&self) -> Vec<(String, u32)> {
        self.halts
            .lock()
            .iter()
            .map(|halt| (halt.file.clone(), halt.line))
            .collect()
    }
}

impl EventHandler<ReplayHost> for Recorder {
    type Error = Infallible;

    fn at_line(
        &self,
        host: &ReplayHost,
        context: &Context<ReplayHost>,
        file: &str,
        line: u32,
    ) -> Result<(), Self::Error> {
        let entered = Instant::now();

        let locals = context
            .frame_locals(host, 0)
            .expect("frame locals")
            .into_iter()
            .map(|(name, value)| (name, value.to_string()))
            .collect();

        let probe = self.probe.as_ref().map(|probe| probe(host, context));

        if let Some(dwell) = self.dwell {
            std::thread::sleep(dwell);
        }

        let command = self.script.lock().pop_front().unwrap_or(Command::Continue);

        match command {
            Command::Continue => (),
            Command::Step(n) => context.step(n, false).expect("step"),
            Command::StepForce(n) => context.step(n, true).expect("step"),
            Command::Next => context.step_over(1, None, false).expect("step over"),
            Command::Finish => context.stop_frame(0).expect("stop frame"),
            Command::RunTo(file, line) => {
                context
                    .set_breakpoint(file, BreakpointPos::Line(line), None)
                    .expect("set breakpoint");
            }
        }

        self.halts.lock().push(Halt {
            thnum: context.thnum(),
            file: file.to_owned(),
            line,
            reason: context.stop_reason().expect("stop reason"),
            depth: context.stack_size().expect("stack size"),
            locals,
            probe,
            entered,
            left: Instant::now(),
        });

        Ok(())
    }

    fn at_breakpoint(
        &self,
        _host: &ReplayHost,
        _context: &Context<ReplayHost>,
        breakpoint: &Breakpoint,
    ) -> Result<(), Self::Error> {
        self.breakpoints.lock().push(breakpoint.id());
        Ok(())
    }

    fn at_catchpoint(
        &self,
        _host: &ReplayHost,
        _context: &Context<ReplayHost>,
        exception: &ReplayValue,
    ) -> Result<(), Self::Error> {
        let ReplayValue::Exception { class, .. } = exception else {
            panic!("not an exception: {exception}");
        };

        self.catches.lock().push(class.to_string());
        Ok(())
    }

    fn at_tracing(
        &self,
        _host: &ReplayHost,
        context: &Context<ReplayHost>,
        file: &str,
        line: u32,
    ) -> Result<(), Self::Error> {
        let depth = context.stack_size().expect("stack size");
        self.traces.lock().push((file.to_owned(), line, depth));
        Ok(())
    }
}

pub fn debugger(recorder: Recorder) -> TestDebugger {
    Builder::new()
        .with_host(ReplayHost::new())
        .with_handler(recorder)
        .build()
}

pub fn replay(debugger: &TestDebugger, program: &str) {
    let program = Program::parse("<content>", program)
        .map_err(|e| format!("{e:?}"))
        .expect("parse program");

    hookdbg_replay::run(debugger, &program).expect("replay");
}

pub fn position(file: &str, line: u32) -> (String, u32) {
    (file.to_owned(), line)
}
