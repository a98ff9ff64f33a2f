use std::fmt;
use std::sync::Arc;

use crate::host::MethodId;

/// Identifier of temporary breakpoints.
pub const TEMPORARY_BREAKPOINT_ID: u32 = 0;

/// Breakpoint set by the front-end.
#[derive(Debug)]
pub struct Breakpoint {
    id: u32,
    source: String,
    kind: BreakpointKind,
    condition: Option<String>,
}

/// Where a breakpoint halts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Halts on a source line.
    Position {
        /// Line number within the breakpoint source.
        line: u32,
    },

    /// Halts when a method is entered.
    Method {
        /// Method identifier.
        method: MethodId,
    },
}

/// Position part of a breakpoint, used when adding one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BreakpointPos {
    /// A line number, for a breakpoint on a source file.
    Line(u32),

    /// A method name, for a breakpoint on a type.
    Method(String),
}

impl From<u32> for BreakpointPos {
    fn from(line: u32) -> Self {
        Self::Line(line)
    }
}

impl From<&str> for BreakpointPos {
    fn from(method: &str) -> Self {
        Self::Method(method.to_owned())
    }
}

impl Breakpoint {
    pub(crate) fn new(id: u32, source: &str, pos: BreakpointPos, condition: Option<&str>) -> Self {
        let kind = match pos {
            BreakpointPos::Line(line) => BreakpointKind::Position { line },
            BreakpointPos::Method(method) => BreakpointKind::Method {
                method: MethodId::new(method),
            },
        };

        Self {
            id,
            source: source.to_owned(),
            kind,
            condition: condition.map(str::to_owned),
        }
    }

    /// Returns the identifier of the breakpoint.
    ///
    /// Temporary breakpoints always have the identifier
    /// [TEMPORARY_BREAKPOINT_ID].
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the source of the breakpoint.
    ///
    /// This is a file name for position breakpoints, and a type name for
    /// method breakpoints.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the kind of the breakpoint.
    pub fn kind(&self) -> &BreakpointKind {
        &self.kind
    }

    /// Returns the guard expression of the breakpoint.
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Returns whether this breakpoint is a temporary one.
    pub fn is_temporary(&self) -> bool {
        self.id == TEMPORARY_BREAKPOINT_ID
    }

    pub(crate) fn matches_position(&self, file: &str, line: u32) -> bool {
        match self.kind {
            BreakpointKind::Position { line: bp_line } => {
                bp_line == line && filename_matches(&self.source, file)
            }
            BreakpointKind::Method { .. } => false,
        }
    }

    pub(crate) fn matches_method(
        &self,
        type_name: Option<&str>,
        method: Option<&MethodId>,
    ) -> bool {
        match &self.kind {
            BreakpointKind::Method { method: bp_method } => {
                method == Some(bp_method) && type_name == Some(self.source.as_str())
            }
            BreakpointKind::Position { .. } => false,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            BreakpointKind::Position { line } => write!(f, "{}:{line}", self.source)?,
            BreakpointKind::Method { method } => write!(f, "{}#{method}", self.source)?,
        }

        if let Some(cond) = &self.condition {
            write!(f, " if {cond}")?;
        }

        Ok(())
    }
}

/// Ordered collection of the persistent breakpoints.
#[derive(Default)]
pub(crate) struct BreakpointManager {
    breakpoints: Vec<Arc<Breakpoint>>,
}

impl BreakpointManager {
    pub fn add(&mut self, breakpoint: Breakpoint) -> Arc<Breakpoint> {
        let bp = Arc::new(breakpoint);
        self.breakpoints.push(bp.clone());
        bp
    }

    pub fn remove(&mut self, id: u32) -> Option<Arc<Breakpoint>> {
        let pos = self.breakpoints.iter().position(|bp| bp.id == id)?;
        Some(self.breakpoints.remove(pos))
    }

    pub fn list(&self) -> Vec<Arc<Breakpoint>> {
        self.breakpoints.clone()
    }

    pub fn find(&self, pred: impl Fn(&Breakpoint) -> bool) -> Option<Arc<Breakpoint>> {
        self.breakpoints.iter().find(|bp| pred(&***bp)).cloned()
    }
}

fn is_dir_separator(c: u8) -> bool {
    c == b'/' || (cfg!(windows) && c == b'\\')
}

/// Compares a breakpoint source with the file of an event.
///
/// Both names are compared backwards, up to the length of the shorter one.
/// Once a directory separator was crossed, reaching a `.` in any of the names
/// is a match (relative components like `../` are not resolved).
pub(crate) fn filename_matches(source: &str, file: &str) -> bool {
    let mut crossed_separator = false;

    for (s, f) in source.bytes().rev().zip(file.bytes().rev()) {
        if crossed_separator && (s == b'.' || f == b'.') {
            return true;
        }

        if s != f {
            return false;
        }

        if is_dir_separator(s) {
            crossed_separator = true;
        }
    }

    true
}
