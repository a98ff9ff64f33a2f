// Once clippy takes `clippy.toml` into account (for `tests` targets),
// we can remove these.
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(missing_docs)]

mod common;

use hookdbg_core::{BreakpointPos, Builder, StopReason};
use hookdbg_replay::ReplayHost;
use test_log::test;

use self::common::{Command, Recorder, debugger, position, replay};

#[test]
fn breakpoint_halts_once_per_position() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    let bp = debugger
        .add_breakpoint("a.src", BreakpointPos::Line(10), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            line "a.src" 10
            line "a.src" 10
            line "a.src" 11
        }
        "#,
    );

    let recorder = debugger.handler();
    assert_eq!(recorder.positions(), [position("a.src", 10)]);
    assert_eq!(recorder.halts()[0].reason, StopReason::Breakpoint);
    assert_eq!(*recorder.breakpoints.lock(), [bp.id()]);
}

#[test]
fn breakpoint_matches_path_suffix() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    debugger
        .add_breakpoint("lib/a.src", BreakpointPos::Line(2), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "/src/other/a.src" 2
            line "/src/lib/a.src" 2
        }
        "#,
    );

    assert_eq!(
        debugger.handler().positions(),
        [position("/src/lib/a.src", 2)]
    );
}

#[test]
fn breakpoint_condition_guards_halt() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(10), Some("x > 5"))
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            set "x" "3"
            line "a.src" 10
            line "a.src" 11
            set "x" "7"
            line "a.src" 10
        }
        "#,
    );

    let halts = debugger.handler().halts();
    assert_eq!(halts.len(), 1);
    assert_eq!(halts[0].line, 10);
    assert_eq!(halts[0].locals, [("x".to_owned(), "7".to_owned())]);
}

#[test]
fn breakpoint_condition_error_is_false() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), Some("undefined == 1"))
        .expect("add breakpoint");

    replay(&debugger, r#"thread "main" { line "a.src" 1; }"#);

    assert!(debugger.handler().halts().is_empty());
}

#[test]
fn removed_breakpoint_no_longer_halts() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    let bp = debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), None)
        .expect("add breakpoint");

    let removed = debugger.remove_breakpoint(bp.id()).expect("remove");
    assert_eq!(removed.map(|bp| bp.id()), Some(bp.id()));
    assert!(debugger.breakpoints().expect("breakpoints").is_empty());

    replay(&debugger, r#"thread "main" { line "a.src" 1; }"#);

    assert!(debugger.handler().halts().is_empty());
}

#[test]
fn method_breakpoint_sees_through_singleton_types() {
    let recorder = Recorder::new().probe(|host, context| {
        context
            .frame_class(host, 0)
            .expect("frame class")
            .map(|ty| ty.name().to_owned())
            .unwrap_or_default()
    });

    let debugger = debugger(recorder);
    debugger.start();

    debugger
        .add_breakpoint("Worker", "run", None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r##"
        thread "main" {
            line "w.src" 1
            call "run" type="Other" file="o.src" line=7
            call "run" type="#<Class:Worker>" file="w.src" line=3 {
                line "w.src" 4
            }
        }
        "##,
    );

    let halts = debugger.handler().halts();
    assert_eq!(halts.len(), 1);
    assert_eq!((halts[0].file.as_str(), halts[0].line), ("w.src", 3));
    assert_eq!(halts[0].reason, StopReason::Breakpoint);
    assert_eq!(halts[0].depth, 2);
    assert_eq!(halts[0].probe.as_deref(), Some("Worker"));
}

#[test]
fn step_counts_new_positions() {
    let debugger = debugger(Recorder::new().script([Command::Step(2)]));
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            line "a.src" 2
            line "a.src" 3
            line "a.src" 4
        }
        "#,
    );

    let halts = debugger.handler().halts();
    assert_eq!(
        debugger.handler().positions(),
        [position("a.src", 1), position("a.src", 3)]
    );
    assert_eq!(halts[1].reason, StopReason::Step);
}

#[test]
fn forced_step_halts_on_same_position() {
    const PROGRAM: &str = r#"
        thread "main" {
            line "a.src" 4
            repeat 2 {
                line "a.src" 5
            }
            line "a.src" 6
        }
    "#;

    for (command, expected) in [
        (Command::Step(1), 6),
        (Command::StepForce(1), 5),
    ] {
        let debugger = debugger(Recorder::new().script([command]));
        debugger.start();

        debugger
            .add_breakpoint("a.src", BreakpointPos::Line(5), None)
            .expect("add breakpoint");

        replay(&debugger, PROGRAM);

        assert_eq!(
            debugger.handler().positions(),
            [position("a.src", 5), position("a.src", expected)]
        );
    }
}

#[test]
fn step_over_skips_calls() {
    let debugger = debugger(Recorder::new().script([Command::Next]));
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            call "foo" file="b.src" line=20 {
                line "b.src" 21
                line "b.src" 22
            }
            line "a.src" 2
        }
        "#,
    );

    let halts = debugger.handler().halts();
    assert_eq!(
        debugger.handler().positions(),
        [position("a.src", 1), position("a.src", 2)]
    );
    assert_eq!(halts[1].depth, 1);
}

#[test]
fn step_over_and_finish_from_callee() {
    const PROGRAM: &str = r#"
        thread "main" {
            line "a.src" 1
            call "foo" file="b.src" line=20 {
                line "b.src" 21
                line "b.src" 22
            }
            line "a.src" 2
        }
    "#;

    for (command, expected) in [
        (Command::Next, position("b.src", 22)),
        (Command::Finish, position("a.src", 2)),
    ] {
        let debugger = debugger(Recorder::new().script([command]));
        debugger.start();

        debugger
            .add_breakpoint("b.src", BreakpointPos::Line(21), None)
            .expect("add breakpoint");

        replay(&debugger, PROGRAM);

        assert_eq!(
            debugger.handler().positions(),
            [position("b.src", 21), expected]
        );
    }
}

#[test]
fn step_over_halts_in_caller_once_frame_returned() {
    let debugger = debugger(Recorder::new().script([Command::Next]));
    debugger.start();

    debugger
        .add_breakpoint("b.src", BreakpointPos::Line(21), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            call "foo" file="b.src" line=20 {
                line "b.src" 21
            }
            line "a.src" 2
        }
        "#,
    );

    let halts = debugger.handler().halts();
    assert_eq!(
        debugger.handler().positions(),
        [position("b.src", 21), position("a.src", 2)]
    );
    assert_eq!(halts[1].depth, 1);
}

#[test]
fn temporary_breakpoint_halts_once() {
    let debugger = debugger(Recorder::new().script([Command::RunTo("a.src", 3)]));
    debugger.start();

    let bp = debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            line "a.src" 2
            line "a.src" 3
            line "a.src" 4
            line "a.src" 3
        }
        "#,
    );

    let recorder = debugger.handler();
    let reasons: Vec<_> = recorder.halts().iter().map(|halt| halt.reason).collect();

    assert_eq!(
        recorder.positions(),
        [position("a.src", 1), position("a.src", 3)]
    );
    assert_eq!(reasons, [StopReason::Breakpoint, StopReason::Step]);
    assert_eq!(*recorder.breakpoints.lock(), [bp.id()]);
}

#[test]
fn call_stack_follows_calls_and_blocks() {
    let debugger = Builder::new()
        .with_host(ReplayHost::new())
        .with_handler(Recorder::new())
        .tracing(true)
        .build();

    debugger.start();

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            call "foo" line=10 {
                line "a.src" 11
                call "bar" line=20 {
                    line "a.src" 21
                }
                branch "a.src" 12
                line "a.src" 12
            }
            native-call "each" type="Array" {
                line "a.src" 3
            }
            native-call "puts" type="Kernel"
            native-call "size" type="Array"
            call "allocate" type="Worker"
            class "Worker" line=30 {
                line "a.src" 31
            }
            line "a.src" 2
        }
        "#,
    );

    let traces: Vec<_> = debugger
        .handler()
        .traces
        .lock()
        .iter()
        .map(|(_, line, depth)| (*line, *depth))
        .collect();

    assert_eq!(
        traces,
        [
            (1, 1),
            (11, 2),
            (21, 3),
            (12, 2),
            (3, 2),
            (31, 2),
            (2, 1)
        ]
    );
    assert!(debugger.handler().halts().is_empty());
}

#[test]
fn unmatched_return_discards_stack() {
    let debugger = Builder::new()
        .with_host(ReplayHost::new())
        .with_handler(Recorder::new())
        .tracing(true)
        .build();

    debugger.start();

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            call "foo" line=10 {
                line "a.src" 11
                return "nothing"
                line "a.src" 12
            }
            line "a.src" 2
        }
        "#,
    );

    let traces: Vec<_> = debugger
        .handler()
        .traces
        .lock()
        .iter()
        .map(|(_, line, depth)| (*line, *depth))
        .collect();

    assert_eq!(traces, [(1, 1), (11, 2), (12, 1), (2, 1)]);
}

#[test]
fn frame_binding_synthesized_from_locals() {
    let recorder = Recorder::new().probe(|host, context| {
        let x = context
            .frame_binding(host, 1)
            .expect("frame binding")
            .and_then(|binding| binding.get("x"))
            .map(|x| x.to_string())
            .unwrap_or_default();

        let method = context
            .frame_method(0)
            .expect("frame method")
            .map(|method| method.to_string())
            .unwrap_or_default();

        format!("x={x} method={method}")
    });

    let debugger = debugger(recorder);
    debugger.start();

    debugger
        .add_breakpoint("b.src", BreakpointPos::Line(21), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            set "x" "4"
            call "foo" file="b.src" line=20 {
                set "y" "1"
                line "b.src" 21
            }
        }
        "#,
    );

    let halts = debugger.handler().halts();
    assert_eq!(halts.len(), 1);
    assert_eq!(halts[0].locals, [("y".to_owned(), "1".to_owned())]);
    assert_eq!(halts[0].probe.as_deref(), Some("x=4 method=foo"));
}

#[test]
fn catchpoint_matches_ancestors() {
    const PROGRAM: &str = r#"
        exception "ParseError"

        thread "main" {
            line "a.src" 1
            rescue {
                raise "ParseError"
            }
            line "a.src" 2
        }
    "#;

    let debugger = debugger(Recorder::new());
    debugger.start();
    debugger
        .set_catchpoint(Some("StandardError"))
        .expect("set catchpoint");

    replay(&debugger, PROGRAM);

    let recorder = debugger.handler();
    assert_eq!(recorder.positions(), [position("a.src", 1)]);
    assert_eq!(recorder.halts()[0].reason, StopReason::Catchpoint);
    assert_eq!(*recorder.catches.lock(), ["ParseError"]);

    let debugger = self::common::debugger(Recorder::new());
    debugger.start();
    debugger
        .set_catchpoint(Some("ArgumentError"))
        .expect("set catchpoint");

    replay(&debugger, PROGRAM);

    assert!(debugger.handler().halts().is_empty());
    assert!(debugger.handler().catches.lock().is_empty());
}

#[test]
fn catchpoint_cleared() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    debugger
        .set_catchpoint(Some("RuntimeError"))
        .expect("set catchpoint");
    assert_eq!(
        debugger.catchpoint().expect("catchpoint").as_deref(),
        Some("RuntimeError")
    );

    debugger.set_catchpoint(None).expect("clear catchpoint");
    assert_eq!(debugger.catchpoint().expect("catchpoint"), None);

    replay(
        &debugger,
        r#"thread "main" { line "a.src" 1; rescue { raise "RuntimeError"; }; }"#,
    );

    assert!(debugger.handler().halts().is_empty());
}

#[test]
fn system_exit_stops_debugger() {
    let debugger = debugger(Recorder::new());
    debugger.start();
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(2), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "main" {
            line "a.src" 1
            raise "SystemExit"
            line "a.src" 2
        }
        "#,
    );

    assert!(!debugger.is_started());
    assert!(debugger.handler().halts().is_empty());
    assert!(debugger.stop().is_err());
}

#[test]
fn debugger_threads_are_ignored() {
    let debugger = debugger(Recorder::new());
    debugger.start();

    debugger
        .add_breakpoint("a.src", BreakpointPos::Line(1), None)
        .expect("add breakpoint");

    replay(
        &debugger,
        r#"
        thread "ui" role="debugger" {
            line "a.src" 1
        }
        thread "main" {
            line "a.src" 1
        }
        "#,
    );

    assert_eq!(debugger.handler().halts().len(), 1);
}
