use super::{Debugger, Settings};
use crate::handler::EventHandler;
use crate::host::Host;

/// Builder for [Debugger].
///
/// It allows to specify the host runtime the debugger is embedded in, the
/// front-end handling the halts, and the initial settings.
pub struct Builder<S> {
    state: S,
}

impl Default for Builder<NeedsHost> {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder<NeedsHost> {
    /// Creates a debugger builder.
    pub const fn new() -> Self {
        Self { state: NeedsHost }
    }

    /// Specifies the host runtime feeding events to the debugger.
    pub fn with_host<H: Host>(self, host: H) -> Builder<NeedsHandler<H>> {
        Builder {
            state: NeedsHandler { host },
        }
    }
}

impl<H: Host> Builder<NeedsHandler<H>> {
    /// Specifies the front-end handling the halts.
    pub fn with_handler<F: EventHandler<H>>(self, handler: F) -> Builder<Ready<H, F>> {
        Builder {
            state: Ready {
                host: self.state.host,
                handler,
                settings: Settings::default(),
            },
        }
    }
}

impl<H: Host, F: EventHandler<H>> Builder<Ready<H, F>> {
    /// Enables or disables trace notifications for all contexts.
    pub fn tracing(self, enabled: bool) -> Self {
        self.state.settings.set_tracing(enabled);
        self
    }

    /// Enables or disables post-mortem tagging of raised exceptions.
    pub fn post_mortem(self, enabled: bool) -> Self {
        self.state.settings.set_post_mortem(enabled);
        self
    }

    /// Specifies whether a binding is captured for every new frame.
    pub fn keep_frame_binding(self, enabled: bool) -> Self {
        self.state.settings.set_keep_frame_binding(enabled);
        self
    }

    /// Specifies whether every dispatched event is logged.
    pub fn debug(self, enabled: bool) -> Self {
        self.state.settings.set_debug(enabled);
        self
    }

    /// Specifies the number of dispatched events between two prunings of the
    /// contexts of exited threads.
    pub fn prune_interval(mut self, interval: u64) -> Self {
        self.state.settings = self.state.settings.with_prune_interval(interval);
        self
    }

    /// Adds a native type whose methods run user-level blocks.
    ///
    /// Native calls into such types get their own frame.
    pub fn block_host_type(mut self, name: impl Into<String>) -> Self {
        self.state.settings = self.state.settings.with_block_host_type(name.into());
        self
    }

    /// Builds the debugger.
    ///
    /// The debugger is not started.
    pub fn build(self) -> Debugger<H, F> {
        let Ready {
            host,
            handler,
            settings,
        } = self.state;

        Debugger::new(host, handler, settings)
    }
}

/// Builder state waiting for the host runtime.
pub struct NeedsHost;

/// Builder state waiting for the front-end.
pub struct NeedsHandler<H> {
    host: H,
}

/// Builder state ready to build the debugger.
pub struct Ready<H, F> {
    host: H,
    handler: F,
    settings: Settings,
}
