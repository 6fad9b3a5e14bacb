//! Disruption interval types.

use crate::locator::Locator;
use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// How the prober treats TCP connections between checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Force a fresh TCP (and TLS) handshake for every check
    New,
    /// Allow the HTTP client to pool and reuse connections
    Reused,
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionType::New => write!(f, "new"),
            ConnectionType::Reused => write!(f, "reused"),
        }
    }
}

/// Severity of a recorded interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IntervalLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for IntervalLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalLevel::Info => write!(f, "Info"),
            IntervalLevel::Warning => write!(f, "Warning"),
            IntervalLevel::Error => write!(f, "Error"),
        }
    }
}

/// Opaque handle returned by a recorder so an interval can be closed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalHandle(pub usize);

/// A half-open span of time `[from, to)` describing backend availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// What was probed
    pub locator: Locator,

    /// Severity
    pub level: IntervalLevel,

    /// Reason, human message and annotations
    pub message: Message,

    /// Whether downstream reporting should chart this interval
    pub display: bool,

    /// Start of the interval
    #[serde(with = "humantime_serde")]
    pub from: SystemTime,

    /// End of the interval, `None` while still open
    #[serde(with = "humantime_serde")]
    pub to: Option<SystemTime>,
}

impl Interval {
    /// Create an open interval starting at `from`.
    pub fn open(locator: Locator, level: IntervalLevel, message: Message, from: SystemTime) -> Self {
        Self {
            locator,
            level,
            message,
            display: false,
            from,
            to: None,
        }
    }

    /// Mark the interval for display.
    pub fn displayed(mut self) -> Self {
        self.display = true;
        self
    }

    /// Whether the interval has been closed.
    pub fn is_closed(&self) -> bool {
        self.to.is_some()
    }

    /// Length of a closed interval. Open or inverted intervals have none.
    pub fn duration(&self) -> Option<std::time::Duration> {
        self.to.and_then(|to| to.duration_since(self.from).ok())
    }
}
