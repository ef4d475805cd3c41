//! Operator-facing progress and warning output.
//!
//! Lifecycle components report through this seam instead of writing to the
//! process streams directly, so tests can capture what the operator would
//! see. Teardown warnings in particular are observability-only and must not
//! influence the session's result.

use std::io::{self, Write};

/// Sink for operator-facing messages.
pub trait SessionReporter {
    /// Reports normal progress, for example "waiting for machine to start".
    fn progress(&self, message: &str);

    /// Reports a non-fatal warning.
    fn warn(&self, message: &str);
}

/// Reporter that writes progress to stdout and warnings to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleReporter;

impl SessionReporter for ConsoleReporter {
    fn progress(&self, message: &str) {
        writeln!(io::stdout(), "{message}").ok();
    }

    fn warn(&self, message: &str) {
        writeln!(io::stderr(), "WARN {message}").ok();
    }
}
