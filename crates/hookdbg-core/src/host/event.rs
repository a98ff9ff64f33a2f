use std::fmt;
use std::sync::Arc;

use super::Host;

/// Identifier of a host method.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodId(Arc<str>);

impl MethodId {
    /// Creates a new method identifier.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the name of the method.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MethodId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Source position of an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Position {
    /// Source file.
    pub file: Arc<str>,

    /// Line number in the source file.
    pub line: u32,
}

impl Position {
    /// Creates a new source position.
    pub fn new(file: impl Into<Arc<str>>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

/// Kind of a VM event.
#[derive(Clone, Debug)]
pub enum EventKind<H: Host> {
    /// A new source line is about to execute.
    Line {
        /// Whether the line is the condition of a control structure, where
        /// the debugger never halts.
        conditional: bool,
    },

    /// A method implemented in the host language was entered.
    Call,

    /// A method implemented in the host language returned.
    Return,

    /// A class or module body was entered.
    ClassOpen,

    /// A class or module body was exited.
    ClassClose,

    /// A native method was entered.
    NativeCall {
        /// Whether the call received a block.
        block_given: bool,
    },

    /// A native method returned.
    NativeReturn {
        /// Whether the call received a block.
        block_given: bool,
    },

    /// An exception was raised.
    Raise {
        /// The raised exception.
        exception: H::Value,
    },
}

impl<H: Host> EventKind<H> {
    /// Returns the name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Line { .. } => "line",
            Self::Call => "call",
            Self::Return => "return",
            Self::ClassOpen => "class",
            Self::ClassClose => "end",
            Self::NativeCall { .. } => "c-call",
            Self::NativeReturn { .. } => "c-return",
            Self::Raise { .. } => "raise",
        }
    }
}

/// Event notified by the host VM.
#[derive(Clone, Debug)]
pub struct Event<H: Host> {
    /// Kind of the event.
    pub kind: EventKind<H>,

    /// Source position of the event, if any.
    pub position: Option<Position>,

    /// Receiver of the current method.
    pub receiver: Option<H::Value>,

    /// Identifier of the current method.
    pub method: Option<MethodId>,

    /// Type enclosing the current method.
    pub enclosing_type: Option<H::Type>,

    /// Live scope of the current activation.
    pub scope: Option<H::Scope>,
}

impl<H: Host> Event<H> {
    /// Creates a new event of the given kind, with no associated data.
    pub fn new(kind: EventKind<H>) -> Self {
        Self {
            kind,
            position: None,
            receiver: None,
            method: None,
            enclosing_type: None,
            scope: None,
        }
    }

    /// Sets the source position of the event.
    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    /// Sets the receiver of the event.
    pub fn with_receiver(mut self, receiver: H::Value) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// Sets the method of the event.
    pub fn with_method(mut self, method: impl Into<MethodId>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the enclosing type of the event.
    pub fn with_type(mut self, ty: H::Type) -> Self {
        self.enclosing_type = Some(ty);
        self
    }

    /// Sets the live scope of the event.
    pub fn with_scope(mut self, scope: H::Scope) -> Self {
        self.scope = Some(scope);
        self
    }
}
