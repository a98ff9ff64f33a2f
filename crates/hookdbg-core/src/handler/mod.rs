use crate::breakpoint::Breakpoint;
use crate::context::Context;
use crate::host::Host;

/// Trait for implementing a debugger front-end.
///
/// Every function is called synchronously on the halting thread, while the
/// debugger lets no other thread process events. The front-end typically
/// blocks in there until the user decides how to continue, then issues
/// stepping commands on the context.
///
/// An error returned by any of these functions is propagated to the caller of
/// [Debugger::handle_event](crate::Debugger::handle_event).
pub trait EventHandler<H: Host>: Send + Sync {
    /// Error returned by this event handler.
    type Error: std::error::Error;

    /// Function called when a context halts on a source line.
    ///
    /// This is the last callback of every halt, including breakpoint and
    /// catch-point halts.
    fn at_line(
        &self,
        host: &H,
        context: &Context<H>,
        file: &str,
        line: u32,
    ) -> Result<(), Self::Error>;

    /// Function called when a context halts on a persistent breakpoint,
    /// before [at_line](Self::at_line).
    fn at_breakpoint(
        &self,
        _host: &H,
        _context: &Context<H>,
        _breakpoint: &Breakpoint,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called when a raised exception matches the catch-point,
    /// before [at_line](Self::at_line).
    fn at_catchpoint(
        &self,
        _host: &H,
        _context: &Context<H>,
        _exception: &H::Value,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Function called on every line event while tracing is enabled.
    ///
    /// The context does not halt.
    fn at_tracing(
        &self,
        _host: &H,
        _context: &Context<H>,
        _file: &str,
        _line: u32,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}
