//! Diagnostics sink injected into an assembly run.
//!
//! The assembler reports skipped settings through a `Logger` rather than failing.
//! Nothing it does depends on what the logger does with the messages.

use tracing::{error, info, warn};

/// Target of the events emitted by [`TracingLogger`].
pub const LOG_TARGET: &str = "qcmd::assemble";

/// Receiver of assembly diagnostics.
pub trait Logger {
    /// Progress information.
    fn info(&self, message: &str);

    /// A setting was ignored but the run continues.
    fn warn(&self, message: &str);

    /// A setting was invalid and skipped.
    fn error(&self, message: &str);
}

/// Forwards diagnostics to `tracing` under [`LOG_TARGET`].
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        info!(target: LOG_TARGET, "{message}");
    }

    fn warn(&self, message: &str) {
        warn!(target: LOG_TARGET, "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: LOG_TARGET, "{message}");
    }
}

/// Discards every diagnostic.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _message: &str) {}

    fn warn(&self, _message: &str) {}

    fn error(&self, _message: &str) {}
}
