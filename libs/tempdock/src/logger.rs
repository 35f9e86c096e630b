// Progress logging collaborator
//
// Every provisioning stage reports a human-readable line through the
// Logger injected into the Provisioner. There is no process-wide default:
// each Provisioner starts with its own NoopLogger.

use std::fmt;

pub trait Logger: Send + Sync {
    fn log(&self, args: fmt::Arguments<'_>);
}

/// Discards every line
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _args: fmt::Arguments<'_>) {}
}

/// Forwards every line to `tracing` at INFO level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, args: fmt::Arguments<'_>) {
        tracing::info!(target: "tempdock", "{}", args);
    }
}
