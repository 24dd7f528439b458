//! Logging interface consumed by the engine and by change units

use crate::change::Change;

/// Log target used by [`LogFacade`]
pub const LOG_TARGET: &str = "devbox";

/// Sink for plain and source-qualified log lines
///
/// Source-qualified calls prefix the message with the path of the change
/// that produced it, e.g. `[claude_code.home_brew] Running: brew install`.
pub trait ChangeLog: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    fn error(&self, message: &str);

    fn info_from(&self, source: &dyn Change, message: &str) {
        self.info(&qualify(source, message));
    }

    fn warn_from(&self, source: &dyn Change, message: &str) {
        self.warn(&qualify(source, message));
    }

    fn error_from(&self, source: &dyn Change, message: &str) {
        self.error(&qualify(source, message));
    }
}

/// Prefix a message with the source's path
///
/// Falls back to the bare name when the parent chain cannot be resolved.
pub fn qualify(source: &dyn Change, message: &str) -> String {
    let path = source
        .path()
        .unwrap_or_else(|_| source.name().to_string());
    format!("[{path}] {message}")
}

/// [`ChangeLog`] backed by the `log` crate
///
/// Formatting, colors and level filtering are left to whichever logger the
/// binary installs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl ChangeLog for LogFacade {
    fn info(&self, message: &str) {
        log::info!(target: LOG_TARGET, "{message}");
    }

    fn warn(&self, message: &str) {
        log::warn!(target: LOG_TARGET, "{message}");
    }

    fn error(&self, message: &str) {
        log::error!(target: LOG_TARGET, "{message}");
    }
}
