//! Test doubles for the probe, store and notifier seams

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use probe::{LatencyProbe, ProbeError, ProbeFuture, QuotaProbe, QuotaReading};

use crate::error::Error;
use crate::notify::{Notifier, Severity};
use crate::store::{PoolSnapshot, PoolStore, StoreFuture};

pub(crate) fn reading(total_allowance: u64, total_used: u64) -> QuotaReading {
    QuotaReading {
        total_allowance,
        total_used,
    }
}

/// Scripted quota probe keyed by secret. Unscripted secrets fail with a
/// network error.
#[derive(Default)]
pub(crate) struct MockQuotaProbe {
    responses: Mutex<HashMap<String, probe::Result<QuotaReading>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<String>>,
    completed: Mutex<usize>,
}

impl MockQuotaProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, secret: &str, result: probe::Result<QuotaReading>) {
        self.responses
            .lock()
            .unwrap()
            .insert(secret.to_string(), result);
    }

    pub(crate) fn delay(&self, secret: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(secret.to_string(), delay);
    }

    /// Secrets probed, in dispatch order.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Probes that ran to completion.
    pub(crate) fn completed(&self) -> usize {
        *self.completed.lock().unwrap()
    }
}

impl QuotaProbe for MockQuotaProbe {
    fn check<'a>(&'a self, secret: &'a str) -> ProbeFuture<'a, QuotaReading> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(secret.to_string());
            let delay = self.delays.lock().unwrap().get(secret).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = self
                .responses
                .lock()
                .unwrap()
                .get(secret)
                .cloned()
                .unwrap_or_else(|| Err(ProbeError::Network(format!("no response scripted for {secret}"))));
            *self.completed.lock().unwrap() += 1;
            result
        })
    }
}

/// Scripted latency probe keyed by URL. A scripted `Ok(d)` sleeps for `d`
/// before answering; a hung URL never answers.
#[derive(Default)]
pub(crate) struct MockLatencyProbe {
    responses: Mutex<HashMap<String, probe::Result<Duration>>>,
    hung: Mutex<Vec<String>>,
}

impl MockLatencyProbe {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, result: probe::Result<Duration>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), result);
    }

    pub(crate) fn hang(&self, url: &str) {
        self.hung.lock().unwrap().push(url.to_string());
    }
}

impl LatencyProbe for MockLatencyProbe {
    fn check<'a>(&'a self, url: &'a str, _timeout: Duration) -> ProbeFuture<'a, Duration> {
        Box::pin(async move {
            let hung = self.hung.lock().unwrap().iter().any(|u| u == url);
            if hung {
                std::future::pending::<()>().await;
            }
            let result = self
                .responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(ProbeError::Network(format!("no response scripted for {url}"))));
            if let Ok(latency) = &result {
                tokio::time::sleep(*latency).await;
            }
            result
        })
    }
}

/// Records every notification.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    events: Mutex<Vec<(Severity, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<(Severity, String)> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, severity: Severity, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

/// Store whose writes always fail.
pub(crate) struct FailingStore;

impl PoolStore for FailingStore {
    fn load(&self) -> StoreFuture<'_, PoolSnapshot> {
        Box::pin(async { Ok(PoolSnapshot::default()) })
    }

    fn save<'a>(&'a self, _snapshot: &'a PoolSnapshot) -> StoreFuture<'a, ()> {
        Box::pin(async { Err(Error::Store("disk full".into())) })
    }
}
