//! Message severity levels

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Severity of a message emitted by a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageLevel {
    /// The computation failed
    Fatal,
    /// Something went wrong but the computation completed
    Error,
    /// Suspicious condition
    Warn,
    /// Informational output
    Info,
    /// Verbose diagnostics
    Debug,
}

impl MessageLevel {
    /// Whether messages at this level count as build errors
    #[inline]
    #[must_use]
    pub fn is_error(self) -> bool {
        matches!(self, Self::Fatal | Self::Error)
    }
}

impl Display for MessageLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}
