/// Event handler error.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct HandlerError<E>(pub E);

/// Error type of the debugger commands.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The debugger is not started.
    #[error("Debugger.start is not called yet")]
    NotStarted,

    /// A frame index was negative.
    #[error("Invalid frame number {0}")]
    InvalidFrame(i64),

    /// A frame index was past the end of the call stack.
    #[error("Frame {index} is out of range (stack has {size} frames)")]
    FrameOutOfRange {
        /// Requested frame.
        index: i64,
        /// Size of the call stack.
        size: usize,
    },

    /// A step count was negative.
    #[error("Steps argument can't be negative")]
    NegativeSteps,

    /// The context has no recorded frame.
    #[error("No frames collected")]
    NoFrames,

    /// The context is already suspended.
    #[error("Already suspended")]
    AlreadySuspended,

    /// The context is not suspended.
    #[error("Thread is not suspended")]
    NotSuspended,

    /// Post-mortem mode is already activated.
    #[error("Post-mortem mode is already activated")]
    PostMortemActive,

    /// The thread is not alive, or is not known to the host.
    #[error("Thread {0} is not tracked")]
    UntrackedThread(String),
}

/// Error type of the VM event hook.
#[derive(thiserror::Error, Debug)]
pub enum HookError<E> {
    /// An event handler error occurred.
    #[error(transparent)]
    Handler(#[from] HandlerError<E>),

    /// A debugger command failed.
    #[error(transparent)]
    Debugger(#[from] Error),
}

/// Result type of the debugger commands.
pub type Result<T> = core::result::Result<T, Error>;
