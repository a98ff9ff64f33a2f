/// Configuration of a debugging session.
#[derive(Debug, Default, PartialEq, knus::Decode)]
pub struct DebugConfig {
    /// Whether every frame captures a binding when it is created.
    #[knus(child)]
    pub keep_frame_binding: bool,

    /// Whether uncaught exceptions halt on the context they unwound.
    #[knus(child)]
    pub post_mortem: bool,

    /// Whether every line event is reported.
    #[knus(child)]
    pub tracing: bool,

    /// Whether every dispatched event is logged.
    #[knus(child)]
    pub debug: bool,

    /// Number of dispatched events between two prunings of dead contexts.
    #[knus(child, unwrap(argument))]
    pub prune_interval: Option<u64>,

    /// Exception type halting the program when raised.
    #[knus(child, unwrap(argument))]
    pub catchpoint: Option<String>,

    /// Breakpoints set before the program starts.
    #[knus(children(name = "break"))]
    pub breakpoints: Vec<BreakConfig>,

    /// Number of lines after which the first thread halts.
    #[knus(child, unwrap(argument))]
    pub step: Option<u32>,

    /// What to do once a halt was recorded.
    #[knus(child, default, unwrap(argument))]
    pub continue_with: ResumeMode,
}

/// Configuration of a breakpoint.
///
/// Exactly one of `line` (source file breakpoint) or `method` (type method
/// breakpoint) must be given.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct BreakConfig {
    /// Source file or type name.
    #[knus(argument)]
    pub source: String,

    /// Line number within the source file.
    #[knus(property)]
    pub line: Option<u32>,

    /// Method name of the type.
    #[knus(property)]
    pub method: Option<String>,

    /// Guard expression.
    #[knus(property)]
    pub cond: Option<String>,
}

/// Stepping command issued after every halt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, knus::DecodeScalar)]
pub enum ResumeMode {
    /// Resume until the next breakpoint or catch-point.
    #[default]
    Continue,

    /// Halt on the next line.
    Step,

    /// Halt on the next line of the same frame (or of a caller).
    Next,

    /// Halt once the current frame returned.
    Finish,
}
