//! Interval messages for disruption transitions.

use crate::types::{ConnectionType, IntervalLevel};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Annotation carrying the correlation id of the request that failed
pub const REQUEST_AUDIT_ID_ANNOTATION: &str = "request-audit-id";

/// Matches `lookup <host>: ... i/o timeout`, the text of a timed out
/// resolver lookup, wherever it appears in an error chain.
static DNS_LOOKUP_TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\blookup \S+(?: on \S+)?: (?:.*: )?i/o timeout").expect("DNS timeout pattern is valid")
});

/// Why an interval was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalReason {
    DisruptionBegan,
    DisruptionEnded,
}

impl fmt::Display for IntervalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalReason::DisruptionBegan => write!(f, "DisruptionBegan"),
            IntervalReason::DisruptionEnded => write!(f, "DisruptionEnded"),
        }
    }
}

/// Human readable message plus machine readable reason and annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub reason: IntervalReason,
    pub human_message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Message {
    pub fn new(reason: IntervalReason, human_message: impl Into<String>) -> Self {
        Self {
            reason,
            human_message: human_message.into(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reason/{}", self.reason)?;
        for (key, value) in &self.annotations {
            write!(f, " {}/{}", key, value)?;
        }
        write!(f, " {}", self.human_message)
    }
}

/// Whether an error looks like a DNS lookup timing out rather than the backend failing.
pub fn is_dns_lookup_timeout(error: &str) -> bool {
    DNS_LOOKUP_TIMEOUT.is_match(error)
}

/// Message and level for the start of a disruption.
///
/// DNS lookup timeouts are recorded at warning level: they point at resolver
/// flakiness rather than at the backend itself.
pub fn disruption_began(
    locator: &str,
    connection_type: ConnectionType,
    error: &str,
    audit_id: &str,
) -> (Message, IntervalLevel) {
    if is_dns_lookup_timeout(error) {
        let message = Message::new(
            IntervalReason::DisruptionBegan,
            format!(
                "DNS lookup timeouts began for {} GET requests over {} connections: {} \
                 (likely a problem with cluster DNS, not the backend)",
                locator, connection_type, error
            ),
        )
        .with_annotation(REQUEST_AUDIT_ID_ANNOTATION, audit_id);
        return (message, IntervalLevel::Warning);
    }

    let message = Message::new(
        IntervalReason::DisruptionBegan,
        format!(
            "{} stopped responding to GET requests over {} connections: {}",
            locator, connection_type, error
        ),
    )
    .with_annotation(REQUEST_AUDIT_ID_ANNOTATION, audit_id);
    (message, IntervalLevel::Error)
}

/// Message for the recovery of a backend.
pub fn disruption_ended(locator: &str, connection_type: ConnectionType) -> Message {
    Message::new(
        IntervalReason::DisruptionEnded,
        format!(
            "{} started responding to GET requests over {} connections",
            locator, connection_type
        ),
    )
}
