//! Diagnostics sink injected into the pipeline.
//!
//! Passes report what they changed through a sink instead of a
//! process-wide logger, so library callers can run silently and the CLI
//! can forward everything to `log`.

/// Receiver for informational and debug messages emitted while processing
pub trait DiagnosticsSink {
    /// Noteworthy event (file opened, line patched, pass skipped)
    fn info(&self, message: &str);

    /// Per-line detail, only interesting when debugging a dialect
    fn debug(&self, message: &str);

    /// Recoverable oddity in the input (skipped or ambiguous lines)
    fn warn(&self, message: &str);
}

/// Sink that forwards to the `log` crate
#[derive(Debug, Default)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn info(&self, message: &str) {
        log::info!("{message}");
    }

    fn debug(&self, message: &str) {
        log::debug!("{message}");
    }

    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }
}

/// Silent sink, the default for library use
#[derive(Debug, Default)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn info(&self, _message: &str) {}
    fn debug(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
}
