use std::sync::atomic::{AtomicBool, Ordering};

/// Default number of dispatched events between two prunings of the contexts
/// of exited threads.
pub const DEFAULT_PRUNE_INTERVAL: u64 = 3000;

/// Native types whose methods run user-level blocks.
const DEFAULT_BLOCK_HOST_TYPES: [&str; 3] = ["Proc", "Kernel", "Module"];

/// Settings of a [Debugger](super::Debugger).
///
/// Flags can be changed while the debugger runs.
#[derive(Debug)]
pub struct Settings {
    tracing: AtomicBool,
    post_mortem: AtomicBool,
    keep_frame_binding: AtomicBool,
    debug: AtomicBool,
    prune_interval: u64,
    block_host_types: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracing: AtomicBool::new(false),
            post_mortem: AtomicBool::new(false),
            keep_frame_binding: AtomicBool::new(false),
            debug: AtomicBool::new(false),
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            block_host_types: DEFAULT_BLOCK_HOST_TYPES.map(String::from).to_vec(),
        }
    }
}

impl Settings {
    /// Returns whether trace notifications are enabled for all contexts.
    pub fn tracing(&self) -> bool {
        self.tracing.load(Ordering::Relaxed)
    }

    /// Enables or disables trace notifications for all contexts.
    pub fn set_tracing(&self, enabled: bool) {
        self.tracing.store(enabled, Ordering::Relaxed);
    }

    /// Returns whether raised exceptions are tagged with post-mortem
    /// information.
    pub fn post_mortem(&self) -> bool {
        self.post_mortem.load(Ordering::Relaxed)
    }

    pub(crate) fn set_post_mortem(&self, enabled: bool) {
        self.post_mortem.store(enabled, Ordering::Relaxed);
    }

    /// Returns whether a binding is captured for every new frame.
    pub fn keep_frame_binding(&self) -> bool {
        self.keep_frame_binding.load(Ordering::Relaxed)
    }

    /// Sets whether a binding is captured for every new frame.
    ///
    /// Capturing bindings is expensive. Without them, frame bindings are
    /// synthesized from the frame locals on demand.
    pub fn set_keep_frame_binding(&self, enabled: bool) {
        self.keep_frame_binding.store(enabled, Ordering::Relaxed);
    }

    /// Returns whether every dispatched event is logged.
    pub fn debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Sets whether every dispatched event is logged, at the `TRACE` level.
    pub fn set_debug(&self, enabled: bool) {
        self.debug.store(enabled, Ordering::Relaxed);
    }

    /// Returns the number of dispatched events between two prunings.
    pub fn prune_interval(&self) -> u64 {
        self.prune_interval
    }

    /// Returns the names of the native types running user-level blocks.
    pub fn block_host_types(&self) -> &[String] {
        &self.block_host_types
    }

    pub(crate) fn with_prune_interval(mut self, interval: u64) -> Self {
        self.prune_interval = interval;
        self
    }

    pub(crate) fn with_block_host_type(mut self, name: String) -> Self {
        if !self.block_host_types.contains(&name) {
            self.block_host_types.push(name);
        }
        self
    }
}
