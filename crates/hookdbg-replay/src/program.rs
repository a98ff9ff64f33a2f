use std::path::Path;

use miette::IntoDiagnostic;

/// Scripted multi-threaded program, described in KDL.
///
/// ```kdl
/// type "Helpers" kind="module"
/// exception "ParseError" parent="StandardError"
///
/// thread "main" {
///     line "app.src" 1
///     set "x" "1"
///     call "run" type="App" file="app.src" line=10 {
///         line "app.src" 11
///     }
/// }
/// ```
#[derive(Debug, PartialEq, knus::Decode)]
pub struct Program {
    /// Declared types.
    #[knus(children(name = "type"))]
    pub types: Vec<TypeDecl>,

    /// Declared exception classes.
    #[knus(children(name = "exception"))]
    pub exceptions: Vec<ExceptionDecl>,

    /// Threads of the program, all started at once.
    #[knus(children(name = "thread"))]
    pub threads: Vec<ThreadDecl>,
}

impl Program {
    /// Parses a program from its KDL description.
    pub fn parse(name: &str, text: &str) -> miette::Result<Self> {
        Ok(knus::parse(name, text)?)
    }

    /// Parses a program from a KDL file.
    pub fn from_file(path: &Path) -> miette::Result<Self> {
        let text = std::fs::read_to_string(path).into_diagnostic()?;
        let name = path.to_string_lossy();

        Self::parse(&name, &text)
    }
}

/// Declaration of a type.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct TypeDecl {
    /// Name of the type.
    #[knus(argument)]
    pub name: String,

    /// Either `class` (the default) or `module`.
    #[knus(property)]
    pub kind: Option<String>,
}

/// Declaration of an exception class.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ExceptionDecl {
    /// Name of the exception class.
    #[knus(argument)]
    pub name: String,

    /// Parent class, `StandardError` by default.
    #[knus(property)]
    pub parent: Option<String>,
}

/// Thread of a program.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ThreadDecl {
    /// Name of the thread.
    #[knus(argument)]
    pub name: String,

    /// Set to `debugger` for threads belonging to the debugger front-end.
    #[knus(property)]
    pub role: Option<String>,

    /// Steps executed by the thread.
    #[knus(children)]
    pub steps: Vec<Step>,
}

impl ThreadDecl {
    /// Returns whether the thread belongs to the debugger front-end.
    pub fn is_debugger(&self) -> bool {
        self.role.as_deref() == Some("debugger")
    }
}

/// Step executed by a replayed thread.
#[derive(Debug, PartialEq, knus::Decode)]
pub enum Step {
    /// Executes a source line.
    Line(LineStep),

    /// Evaluates the condition of a control structure.
    Branch(LineStep),

    /// Calls a method, executing its body.
    Call(CallStep),

    /// Calls a native method, running its body as a block.
    NativeCall(NativeCallStep),

    /// Executes a class body.
    Class(ClassStep),

    /// Notifies a bare return, without leaving the current method.
    Return(ReturnStep),

    /// Assigns a local variable.
    Set(SetStep),

    /// Blocks the thread.
    Sleep(WaitStep),

    /// Keeps the thread busy.
    Pause(WaitStep),

    /// Raises an exception.
    Raise(RaiseStep),

    /// Rescues the exceptions raised by its body.
    Rescue(BlockStep),

    /// Repeats its body.
    Repeat(RepeatStep),
}

/// Source position of a step.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct LineStep {
    /// Source file.
    #[knus(argument)]
    pub file: String,

    /// Line in the source file.
    #[knus(argument)]
    pub line: u32,
}

/// Call of a method.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct CallStep {
    /// Name of the method.
    #[knus(argument)]
    pub method: String,

    /// Type defining the method, the caller's type by default.
    #[knus(property(name = "type"))]
    pub ty: Option<String>,

    /// Source file of the method, the caller's file by default.
    #[knus(property)]
    pub file: Option<String>,

    /// Source line of the method, the caller's line by default.
    #[knus(property)]
    pub line: Option<u32>,

    /// Body of the method.
    #[knus(children)]
    pub body: Vec<Step>,
}

/// Call of a native method.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct NativeCallStep {
    /// Name of the method.
    #[knus(argument)]
    pub method: String,

    /// Type defining the method.
    #[knus(property(name = "type"))]
    pub ty: Option<String>,

    /// Block passed to the method, if not empty.
    #[knus(children)]
    pub body: Vec<Step>,
}

/// Execution of a class body.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ClassStep {
    /// Name of the class.
    #[knus(argument)]
    pub name: String,

    /// Source line of the class, the current line by default.
    #[knus(property)]
    pub line: Option<u32>,

    /// Class body.
    #[knus(children)]
    pub body: Vec<Step>,
}

/// Bare return.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ReturnStep {
    /// Method returning.
    #[knus(argument)]
    pub method: String,
}

/// Assignment of a local variable.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct SetStep {
    /// Name of the variable.
    #[knus(argument)]
    pub name: String,

    /// Assigned value, parsed as integer or `nil` when possible.
    #[knus(argument)]
    pub value: String,
}

/// Waiting step.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct WaitStep {
    /// Duration in milliseconds.
    #[knus(argument)]
    pub millis: u64,
}

/// Exception raise.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct RaiseStep {
    /// Exception class.
    #[knus(argument)]
    pub class: String,
}

/// Group of steps.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct BlockStep {
    /// Steps of the group.
    #[knus(children)]
    pub body: Vec<Step>,
}

/// Repetition of steps.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct RepeatStep {
    /// Number of repetitions.
    #[knus(argument)]
    pub count: u32,

    /// Repeated steps.
    #[knus(children)]
    pub body: Vec<Step>,
}

#[cfg(test)]
mod tests {
    use super::{CallStep, LineStep, NativeCallStep, Program, SetStep, Step};

    #[test]
    fn parse_threads() {
        let program = Program::parse(
            "<content>",
            indoc::indoc! {r#"
                thread "main" {
                    line "a.src" 1
                    set "x" "5"
                    call "foo" type="Worker" line=10 {
                        line "a.src" 11
                    }
                    native-call "each" type="Array" {
                        line "a.src" 2
                    }
                }
                thread "ui" role="debugger"
            "#},
        )
        .expect("parse kdl");

        assert_eq!(program.threads.len(), 2);
        assert!(!program.threads[0].is_debugger());
        assert!(program.threads[1].is_debugger());
        assert!(program.threads[1].steps.is_empty());

        assert_eq!(
            program.threads[0].steps,
            vec![
                Step::Line(LineStep {
                    file: "a.src".to_owned(),
                    line: 1
                }),
                Step::Set(SetStep {
                    name: "x".to_owned(),
                    value: "5".to_owned()
                }),
                Step::Call(CallStep {
                    method: "foo".to_owned(),
                    ty: Some("Worker".to_owned()),
                    file: None,
                    line: Some(10),
                    body: vec![Step::Line(LineStep {
                        file: "a.src".to_owned(),
                        line: 11
                    })],
                }),
                Step::NativeCall(NativeCallStep {
                    method: "each".to_owned(),
                    ty: Some("Array".to_owned()),
                    body: vec![Step::Line(LineStep {
                        file: "a.src".to_owned(),
                        line: 2
                    })],
                }),
            ]
        );
    }

    #[test]
    fn parse_declarations() {
        let program = Program::parse(
            "<content>",
            indoc::indoc! {r#"
                type "Helpers" kind="module"
                exception "ParseError"
            "#},
        )
        .expect("parse kdl");

        assert!(program.threads.is_empty());
        assert_eq!(program.types[0].kind.as_deref(), Some("module"));
        assert_eq!(program.exceptions[0].name, "ParseError");
        assert_eq!(program.exceptions[0].parent, None);
    }

    #[test]
    fn reject_unknown_step() {
        assert!(Program::parse("<content>", r#"thread "main" { jump "a.src" 1; }"#).is_err());
    }
}
