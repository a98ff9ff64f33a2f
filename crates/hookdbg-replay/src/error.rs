use hookdbg_core::HookError;

/// Error type of a program replay.
#[derive(thiserror::Error, Debug)]
pub enum Error<E> {
    /// The debugger hook failed.
    #[error(transparent)]
    Hook(#[from] HookError<E>),

    /// A replayed thread panicked.
    #[error("replayed thread {0} panicked")]
    ThreadPanicked(String),
}

/// Error type of a breakpoint condition evaluation.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// The condition is not a supported expression.
    #[error("unsupported expression `{0}`")]
    Syntax(String),

    /// The condition references an unknown variable.
    #[error("undefined local variable `{0}`")]
    UnknownVariable(String),

    /// The operands of an ordering comparison are not integers.
    #[error("comparison of {lhs} with {rhs} failed")]
    NotComparable {
        /// Left operand.
        lhs: String,
        /// Right operand.
        rhs: String,
    },
}
