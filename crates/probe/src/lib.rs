//! Probe transports for credential quota and endpoint reachability
//!
//! Defines the two measurement seams the pool manager depends on:
//! - `QuotaProbe` reads allowance/used counts for one credential secret
//! - `LatencyProbe` measures round-trip time to one endpoint URL
//!
//! Both traits return boxed futures so the coordinator can hold them as
//! `Arc<dyn QuotaProbe>` / `Arc<dyn LatencyProbe>` and swap in test doubles.
//! HTTP implementations live in [`http`].

pub mod classify;
pub mod http;

pub use classify::classify_status;
pub use http::{HttpLatencyProbe, HttpQuotaProbe};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Failure of a single probe.
///
/// `Auth` is kept apart from the transient kinds: it means the upstream
/// rejected the credential itself, which the pool treats as invalidity rather
/// than exhaustion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("credential rejected: {0}")]
    Auth(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("probe timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl ProbeError {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Auth(_) => "auth",
            ProbeError::Network(_) => "network",
            ProbeError::Timeout(_) => "timeout",
        }
    }
}

/// Result alias for probe operations.
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Boxed future returned by probe trait methods.
pub type ProbeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Raw usage counts reported by the usage-query transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaReading {
    pub total_allowance: u64,
    pub total_used: u64,
}

/// Usage-query transport: given a credential secret, report its usage counts.
pub trait QuotaProbe: Send + Sync {
    fn check<'a>(&'a self, secret: &'a str) -> ProbeFuture<'a, QuotaReading>;
}

/// Reachability transport: given a URL and deadline, report elapsed time to
/// the first response.
pub trait LatencyProbe: Send + Sync {
    fn check<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a, Duration>;
}
