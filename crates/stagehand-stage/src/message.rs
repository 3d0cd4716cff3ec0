//! Message sinks
//!
//! Units report diagnostics as messages; the stage forwards them, with the
//! reporting computation as location, to a [`MessageSink`] supplied by the
//! build.

use stagehand_action::MessageLevel;

/// Receiver of unit messages and build progress
pub trait MessageSink: Send + Sync {
    /// Report a message
    fn message(&self, level: MessageLevel, message: &str, location: Option<&str>);

    /// Report progress as a fraction in `[0, 1]`
    fn progress(&self, fraction: f64, description: &str) {
        let _ = (fraction, description);
    }
}

/// Sink that forwards messages to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MessageSink for TracingSink {
    fn message(&self, level: MessageLevel, message: &str, location: Option<&str>) {
        let location = location.unwrap_or("-");
        match level {
            MessageLevel::Fatal => tracing::error!(location, fatal = true, "{message}"),
            MessageLevel::Error => tracing::error!(location, "{message}"),
            MessageLevel::Warn => tracing::warn!(location, "{message}"),
            MessageLevel::Info => tracing::info!(location, "{message}"),
            MessageLevel::Debug => tracing::debug!(location, "{message}"),
        }
    }

    fn progress(&self, fraction: f64, description: &str) {
        tracing::trace!(fraction, "{description}");
    }
}
