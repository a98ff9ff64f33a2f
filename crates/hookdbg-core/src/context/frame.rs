use std::sync::Arc;

use crate::host::{self, Host, Locals, MethodId};

/// Number of frames the call stack grows by when full.
const STACK_SIZE_INCREMENT: usize = 128;

/// Storage of the local variables of a frame.
pub(crate) enum FrameLocals<H: Host> {
    /// Locals are read on demand from the activation's live scope.
    Live { scope: Option<H::Scope> },

    /// Locals were copied when the frame was frozen.
    Frozen { locals: Locals<H::Value> },
}

/// Call or block activation recorded on the call stack.
pub(crate) struct Frame<H: Host> {
    /// Current method of the frame.
    pub method: Option<MethodId>,

    /// Method the frame was opened for, matched on return.
    pub orig_method: Option<MethodId>,

    pub file: Arc<str>,
    pub line: u32,

    pub binding: Option<H::Binding>,
    pub receiver: Option<H::Value>,
    pub enclosing_type: Option<H::Type>,

    pub locals: FrameLocals<H>,
}

impl<H: Host> Frame<H> {
    pub fn new(
        file: Arc<str>,
        line: u32,
        method: Option<MethodId>,
        receiver: Option<H::Value>,
        binding: Option<H::Binding>,
    ) -> Self {
        Self {
            orig_method: method.clone(),
            method,
            file,
            line,
            binding,
            receiver,
            enclosing_type: None,
            locals: FrameLocals::Live { scope: None },
        }
    }

    pub fn with_type(mut self, ty: Option<H::Type>) -> Self {
        self.enclosing_type = ty;
        self
    }

    pub fn with_scope(mut self, scope: Option<H::Scope>) -> Self {
        self.set_scope(scope);
        self
    }

    pub fn set_scope(&mut self, scope: Option<H::Scope>) {
        self.locals = FrameLocals::Live { scope };
    }

    /// Returns the locals of the frame.
    pub fn locals(&self, host: &H) -> Locals<H::Value> {
        match &self.locals {
            FrameLocals::Live { scope } => host::copy_locals(host, scope.as_ref()),
            FrameLocals::Frozen { locals } => locals.clone(),
        }
    }

    /// Returns a copy of this frame that no longer references the live
    /// scope of the activation.
    pub fn freeze(&self, host: &H) -> Self {
        Self {
            method: self.method.clone(),
            orig_method: self.orig_method.clone(),
            file: self.file.clone(),
            line: self.line,
            binding: self.binding.clone(),
            receiver: self.receiver.clone(),
            enclosing_type: self.enclosing_type.clone(),
            locals: FrameLocals::Frozen {
                locals: self.locals(host),
            },
        }
    }
}

/// Shadow of the host's call stack of a thread.
///
/// Frames are stored outermost first, while they are indexed innermost first
/// by the public accessors.
pub(crate) struct CallStack<H: Host> {
    frames: Vec<Frame<H>>,
}

impl<H: Host> Default for CallStack<H> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<H: Host> CallStack<H> {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn push(&mut self, frame: Frame<H>) {
        if self.frames.len() == self.frames.capacity() {
            self.frames.reserve_exact(STACK_SIZE_INCREMENT);
        }

        self.frames.push(frame);
    }

    /// Pops frames until the one opened for the given method was popped.
    ///
    /// Returns the number of popped frames. When no frame matches, the whole
    /// call stack is popped.
    pub fn pop_matching(&mut self, method: Option<&MethodId>) -> usize {
        let index = self
            .frames
            .iter()
            .rposition(|frame| frame.orig_method.as_ref() == method)
            .unwrap_or(0);

        let popped = self.frames.len() - index;
        self.frames.truncate(index);

        popped
    }

    /// Returns the innermost frame.
    pub fn top(&self) -> Option<&Frame<H>> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame<H>> {
        self.frames.last_mut()
    }

    /// Returns the frame at the given depth, `0` being the innermost frame.
    pub fn get(&self, index: usize) -> Option<&Frame<H>> {
        let pos = self.frames.len().checked_sub(index + 1)?;
        self.frames.get(pos)
    }

    /// Returns a frozen copy of every frame.
    pub fn snapshot_all(&self, host: &H) -> Self {
        let mut frames = Vec::with_capacity(self.frames.capacity());
        frames.extend(self.frames.iter().map(|frame| frame.freeze(host)));

        Self { frames }
    }
}

#[cfg(test)]
mod tests {
    use super::{CallStack, Frame};
    use crate::host::MethodId;
    use crate::host::mock::MockHost;

    fn frame(method: &str, line: u32) -> Frame<MockHost> {
        Frame::new("a.src".into(), line, Some(MethodId::new(method)), None, None)
    }

    #[test]
    fn balanced_calls_restore_depth() {
        let mut stack = CallStack::default();
        stack.push(frame("main", 1));

        for (depth, method) in ["a", "b", "c"].into_iter().enumerate() {
            stack.push(frame(method, depth as u32 + 2));
        }

        for method in ["c", "b", "a"] {
            assert_eq!(stack.pop_matching(Some(&MethodId::new(method))), 1);
        }

        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top().map(|f| f.line), Some(1));
    }

    #[test]
    fn unmatched_return_discards_frames() {
        let mut stack = CallStack::default();
        stack.push(frame("main", 1));
        stack.push(frame("outer", 2));
        stack.push(frame("inner", 3));

        assert_eq!(stack.pop_matching(Some(&MethodId::new("outer"))), 2);
        assert_eq!(stack.len(), 1);

        assert_eq!(stack.pop_matching(Some(&MethodId::new("missing"))), 1);
        assert!(stack.is_empty());
    }

    #[test]
    fn index_zero_is_innermost() {
        let mut stack = CallStack::default();
        stack.push(frame("main", 1));
        stack.push(frame("inner", 7));

        assert_eq!(stack.get(0).map(|f| f.line), Some(7));
        assert_eq!(stack.get(1).map(|f| f.line), Some(1));
        assert!(stack.get(2).is_none());
    }

    #[test]
    fn frozen_frames_keep_locals() {
        let host = MockHost::default();
        let scope = vec![
            ("x".to_owned(), "1".to_owned()),
            ("$_".to_owned(), "internal".to_owned()),
        ];

        let mut stack = CallStack::default();
        stack.push(frame("main", 1).with_scope(Some(scope)));

        let frozen = stack.snapshot_all(&host);
        stack.clear();

        let locals = frozen.top().map(|f| f.locals(&host)).unwrap_or_default();
        assert_eq!(locals.len(), 1);
        assert_eq!(locals.get("x").map(String::as_str), Some("1"));
    }
}
