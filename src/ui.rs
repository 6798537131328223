//! User-facing output sink used by steps and the artifact.

use std::io::{self, Write};

/// Write-only progress sink.
///
/// Nothing the core does depends on what an implementation does with the
/// messages; write failures are swallowed by implementations.
pub trait Ui: Send + Sync {
    /// Reports a progress line.
    fn say(&self, message: &str);
    /// Reports a failure.
    fn error(&self, message: &str);
    /// Reports an informational detail.
    fn message(&self, message: &str);
}

/// [`Ui`] writing progress to stdout and failures to stderr.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleUi;

impl Ui for ConsoleUi {
    fn say(&self, message: &str) {
        writeln!(io::stdout(), "==> {message}").ok();
    }

    fn error(&self, message: &str) {
        writeln!(io::stderr(), "==> {message}").ok();
    }

    fn message(&self, message: &str) {
        writeln!(io::stdout(), "    {message}").ok();
    }
}
