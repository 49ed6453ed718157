//! Notification collaborator
//!
//! Receives rotation, exhaustion, all-exhausted and invalidation events. The
//! call is synchronous and must not block: it runs while the coordinator
//! holds the pool lock.

use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, severity: Severity, message: &str);
}

/// Emits notifications as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Success => info!(notification = message, "pool notification"),
            Severity::Error => error!(notification = message, "pool notification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_notifier_accepts_both_severities() {
        let notifier = TracingNotifier;
        notifier.notify(Severity::Success, "switched to backup");
        notifier.notify(Severity::Error, "all credentials exhausted");
    }

    #[test]
    fn severity_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Severity::Error).unwrap(), "error");
    }
}
