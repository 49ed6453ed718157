//! Pool coordinator: the public API around one pool
//!
//! Owns the `KeyPool`, `EndpointSet` and `FailoverEngine` behind a single
//! `tokio::sync::Mutex`, so every mutation and every probe-result application
//! is serialized. The lock is never held across a network await: probes run
//! on cloned secrets and URLs, and their results are applied afterwards keyed
//! by credential id or URL. Results for entries removed while the probe was in
//! flight are discarded.
//!
//! Persistence runs after the lock is released. Snapshots carry a revision and
//! a separate persist lock skips any snapshot older than the last one written.

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::Secret;
use futures_util::future::join_all;
use probe::{LatencyProbe, ProbeError, QuotaProbe, QuotaReading};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credential::{Credential, CredentialView, Quota, now_millis};
use crate::endpoint::{Endpoint, EndpointSet, EndpointStatus, EndpointStrategy};
use crate::error::{Error, Result};
use crate::failover::{FailoverAction, FailoverEngine, HealthState, Observation, RecheckTicket};
use crate::metrics;
use crate::notify::{Notifier, Severity};
use crate::pool::{KeyPool, SwitchStrategy};
use crate::store::{PoolSnapshot, PoolStore};

/// Per-probe deadline used when none is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on chained rechecks after one rotation. A chain only continues
/// when a concurrent rotation made the ticket stale.
const MAX_RECHECKS: usize = 8;

/// External collaborators of a coordinator.
#[derive(Clone)]
pub struct Collaborators {
    pub quota_probe: Arc<dyn QuotaProbe>,
    pub latency_probe: Arc<dyn LatencyProbe>,
    pub store: Arc<dyn PoolStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// The active credential handed to a caller, with the pool state it was
/// selected under. Under `AllExhausted` the caller still gets the active
/// credential and decides whether to use it.
#[derive(Debug, Clone)]
pub struct SelectedCredential {
    pub id: String,
    pub secret: Secret<String>,
    pub state: HealthState,
}

/// Result of one quota probe as applied to the pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Ok {
        total_allowance: u64,
        total_used: u64,
        remaining: u64,
    },
    Failed {
        kind: &'static str,
        error: String,
    },
    /// The credential was removed while its probe was in flight.
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialReport {
    pub credential_id: String,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl CredentialReport {
    fn new(credential_id: &str, result: &probe::Result<QuotaReading>, applied: bool) -> Self {
        let outcome = match (applied, result) {
            (false, _) => ProbeOutcome::Discarded,
            (true, Ok(reading)) => ProbeOutcome::Ok {
                total_allowance: reading.total_allowance,
                total_used: reading.total_used,
                remaining: reading.total_allowance.saturating_sub(reading.total_used),
            },
            (true, Err(e)) => ProbeOutcome::Failed {
                kind: e.kind(),
                error: e.to_string(),
            },
        };
        Self {
            credential_id: credential_id.to_string(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointReport {
    pub url: String,
    pub status: EndpointStatus,
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub discarded: bool,
}

/// Aggregated result of `refresh_all`. Individual probe failures live here;
/// the batch itself never fails.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub credentials: Vec<CredentialReport>,
    pub endpoints: Vec<EndpointReport>,
    pub state: HealthState,
    pub active_index: Option<usize>,
    pub selected_endpoint: Option<String>,
}

/// Endpoint listing for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointListing {
    pub strategy: EndpointStrategy,
    pub selected: Option<String>,
    pub endpoints: Vec<Endpoint>,
}

struct Inner {
    pool: KeyPool,
    endpoints: EndpointSet,
    engine: FailoverEngine,
    revision: u64,
}

impl Inner {
    /// Bump the revision and capture the state to persist.
    fn commit(&mut self) -> PoolSnapshot {
        self.revision += 1;
        PoolSnapshot::capture(&self.pool, &self.endpoints, self.revision)
    }
}

/// Clears the probing flags of a `refresh_all` batch that is dropped before
/// its results are applied.
struct ProbingReset<'a> {
    inner: &'a Mutex<Inner>,
    endpoints: &'a [(String, EndpointStatus)],
    armed: bool,
}

impl Drop for ProbingReset<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.inner.try_lock() {
            Ok(mut inner) => {
                for (url, previous) in self.endpoints {
                    inner.endpoints.clear_probing(url, *previous);
                }
                debug!(endpoints = self.endpoints.len(), "refresh batch dropped, probing flags cleared");
            }
            Err(_) => debug!("refresh batch dropped while pool busy, probing flags kept"),
        }
    }
}

pub struct PoolCoordinator {
    inner: Mutex<Inner>,
    quota_probe: Arc<dyn QuotaProbe>,
    latency_probe: Arc<dyn LatencyProbe>,
    store: Arc<dyn PoolStore>,
    notifier: Arc<dyn Notifier>,
    probe_timeout: Duration,
    /// Revision of the last snapshot written.
    persisted: Mutex<u64>,
}

impl PoolCoordinator {
    pub fn new(
        pool: KeyPool,
        endpoints: EndpointSet,
        collaborators: Collaborators,
        probe_timeout: Duration,
    ) -> Self {
        Self::with_revision(pool, endpoints, collaborators, probe_timeout, 0)
    }

    /// Build a coordinator from the store's snapshot.
    pub async fn load(collaborators: Collaborators, probe_timeout: Duration) -> Result<Self> {
        let snapshot = collaborators.store.load().await?;
        let revision = snapshot.revision;
        let (pool, endpoints) = snapshot.restore();
        Ok(Self::with_revision(
            pool,
            endpoints,
            collaborators,
            probe_timeout,
            revision,
        ))
    }

    fn with_revision(
        pool: KeyPool,
        endpoints: EndpointSet,
        collaborators: Collaborators,
        probe_timeout: Duration,
        revision: u64,
    ) -> Self {
        let engine = FailoverEngine::new(&pool);
        info!(
            credentials = pool.len(),
            endpoints = endpoints.len(),
            strategy = pool.strategy().label(),
            state = engine.state().label(),
            "pool coordinator initialized"
        );
        Self {
            inner: Mutex::new(Inner {
                pool,
                endpoints,
                engine,
                revision,
            }),
            quota_probe: collaborators.quota_probe,
            latency_probe: collaborators.latency_probe,
            store: collaborators.store,
            notifier: collaborators.notifier,
            probe_timeout,
            persisted: Mutex::new(revision),
        }
    }

    // --- Probing ---

    /// Probe the active credential and feed the result to the failover
    /// engine. A rotation is followed by a guarded recheck of the new
    /// credential before this returns.
    pub async fn refresh_active(&self) -> Result<CredentialReport> {
        let (id, secret) = {
            let inner = self.inner.lock().await;
            let active = inner.pool.active().ok_or(Error::PoolEmpty)?;
            (active.id().to_string(), active.secret().clone())
        };

        let result = self.probe_quota(&id, secret.expose()).await;
        let (report, recheck) = self.apply_quota(&id, result, None).await;
        if let Some(ticket) = recheck {
            self.recheck(ticket).await;
        }
        Ok(report)
    }

    /// Probe every credential and endpoint concurrently and apply all results.
    ///
    /// Each probe has its own timeout; a slow or failing probe never cancels
    /// the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        let (credentials, endpoints) = {
            let mut inner = self.inner.lock().await;
            let credentials: Vec<(String, Secret<String>)> = inner
                .pool
                .iter()
                .map(|c| (c.id().to_string(), c.secret().clone()))
                .collect();
            let endpoints: Vec<(String, EndpointStatus)> = inner
                .endpoints
                .iter()
                .map(|e| (e.url.clone(), e.status))
                .collect();
            for (url, _) in &endpoints {
                inner.endpoints.mark_probing(url);
            }
            (credentials, endpoints)
        };
        debug!(
            credentials = credentials.len(),
            endpoints = endpoints.len(),
            "refreshing all"
        );
        let mut probing = ProbingReset {
            inner: &self.inner,
            endpoints: &endpoints,
            armed: true,
        };

        let quota_probes = credentials.iter().map(|(id, secret)| async move {
            (id.as_str(), self.probe_quota(id, secret.expose()).await)
        });
        let latency_probes = endpoints.iter().map(|(url, previous)| async move {
            (url.as_str(), *previous, self.probe_latency(url).await)
        });
        let (quota_results, latency_results) =
            tokio::join!(join_all(quota_probes), join_all(latency_probes));

        let mut guard = self.inner.lock().await;
        probing.armed = false;
        let inner = &mut *guard;

        let active_id = inner.pool.active().map(|c| c.id().to_string());
        let mut active_observation = None;
        let mut credential_reports = Vec::with_capacity(quota_results.len());
        for (id, result) in quota_results {
            let observation = record_result(&mut inner.pool, id, &result);
            if active_id.as_deref() == Some(id) {
                active_observation = observation;
            }
            credential_reports.push(CredentialReport::new(id, &result, observation.is_some()));
        }

        let mut recheck = None;
        if let Some(observation) = active_observation {
            let outcome = inner.engine.observe(&mut inner.pool, observation, None);
            self.notify_action(&inner.pool, outcome.action);
            recheck = outcome.recheck;
        }
        if recheck.is_none() {
            // Fresh quotas on other credentials may offer a way out
            let outcome = inner.engine.reevaluate(&mut inner.pool);
            self.notify_action(&inner.pool, outcome.action);
            recheck = outcome.recheck;
        }

        let mut endpoint_reports = Vec::with_capacity(latency_results.len());
        for (url, previous, result) in latency_results {
            let latency_ms = result.as_ref().ok().map(|d| d.as_millis() as u64);
            let status = if latency_ms.is_some() {
                EndpointStatus::Online
            } else {
                EndpointStatus::Offline
            };
            let applied = inner.endpoints.record_latency(url, latency_ms);
            if applied
                && status == EndpointStatus::Offline
                && previous != EndpointStatus::Offline
                && inner.endpoints.strategy() == EndpointStrategy::Manual
                && inner.endpoints.selected() == Some(url)
            {
                self.notifier
                    .notify(Severity::Error, &format!("selected endpoint {url} is offline"));
            }
            endpoint_reports.push(EndpointReport {
                url: url.to_string(),
                status: if applied { status } else { EndpointStatus::Unknown },
                latency_ms,
                error: result.err().map(|e| e.to_string()),
                discarded: !applied,
            });
        }
        if inner.endpoints.strategy() == EndpointStrategy::UseFastest {
            if let Some(url) = inner.endpoints.select_fastest() {
                info!(url = %url, "switched to fastest endpoint");
            }
        }

        let snapshot = inner.commit();
        drop(guard);
        self.persist(snapshot).await;

        if let Some(ticket) = recheck {
            self.recheck(ticket).await;
        }

        let inner = self.inner.lock().await;
        RefreshReport {
            credentials: credential_reports,
            endpoints: endpoint_reports,
            state: inner.engine.state(),
            active_index: inner.pool.active_index(),
            selected_endpoint: inner.endpoints.selected().map(str::to_string),
        }
    }

    /// Re-probe a freshly rotated-to credential under its ticket.
    async fn recheck(&self, mut ticket: RecheckTicket) {
        for _ in 0..MAX_RECHECKS {
            let secret = {
                let inner = self.inner.lock().await;
                inner
                    .pool
                    .get(&ticket.credential_id)
                    .map(|c| c.secret().clone())
            };
            let Some(secret) = secret else {
                debug!(credential_id = %ticket.credential_id, "recheck target removed");
                return;
            };

            debug!(
                credential_id = %ticket.credential_id,
                generation = ticket.generation,
                "rechecking rotated-to credential"
            );
            let result = self.probe_quota(&ticket.credential_id, secret.expose()).await;
            let (_, next) = self
                .apply_quota(&ticket.credential_id, result, Some(&ticket))
                .await;
            match next {
                Some(next) => ticket = next,
                None => return,
            }
        }
        warn!(credential_id = %ticket.credential_id, "recheck chain cut short");
    }

    /// Apply one quota result. Only a result for the credential that is active
    /// at application time drives the failover engine.
    async fn apply_quota(
        &self,
        id: &str,
        result: probe::Result<QuotaReading>,
        ticket: Option<&RecheckTicket>,
    ) -> (CredentialReport, Option<RecheckTicket>) {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let observation = record_result(&mut inner.pool, id, &result);
        let report = CredentialReport::new(id, &result, observation.is_some());

        let mut recheck = None;
        if let Some(observation) = observation {
            if inner.pool.active().is_some_and(|c| c.id() == id) {
                let outcome = inner.engine.observe(&mut inner.pool, observation, ticket);
                self.notify_action(&inner.pool, outcome.action);
                recheck = outcome.recheck;
            }
        }

        let mutated = matches!(
            observation,
            Some(Observation::Quota(_) | Observation::AuthRejected)
        );
        let snapshot = mutated.then(|| inner.commit());
        drop(guard);
        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
        (report, recheck)
    }

    async fn probe_quota(&self, id: &str, secret: &str) -> probe::Result<QuotaReading> {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.probe_timeout, self.quota_probe.check(secret)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.probe_timeout)),
        };
        let elapsed = start.elapsed();
        metrics::record_probe("quota", outcome_label(&result), elapsed.as_secs_f64());
        match &result {
            Ok(reading) => debug!(
                credential_id = %id,
                total_allowance = reading.total_allowance,
                total_used = reading.total_used,
                elapsed_ms = elapsed.as_millis() as u64,
                "quota probe succeeded"
            ),
            Err(e) => warn!(credential_id = %id, kind = e.kind(), error = %e, "quota probe failed"),
        }
        result
    }

    async fn probe_latency(&self, url: &str) -> probe::Result<Duration> {
        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.probe_timeout,
            self.latency_probe.check(url, self.probe_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.probe_timeout)),
        };
        metrics::record_probe("latency", outcome_label(&result), start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            debug!(url, kind = e.kind(), error = %e, "endpoint probe failed");
        }
        result
    }

    // --- Credentials ---

    /// Add a credential. Leaves `AllExhausted` if the pool was stuck there.
    pub async fn add_credential(&self, secret: String, name: Option<String>) -> Result<CredentialView> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let added = inner.pool.add(secret, name)?;
        let id = added.id().to_string();
        let index = inner.pool.len() - 1;

        let mut recheck = None;
        if index == 0 {
            inner.engine.resync(&inner.pool);
        } else {
            let outcome = inner.engine.observe(
                &mut inner.pool,
                Observation::CredentialAdded { index },
                None,
            );
            self.notify_action(&inner.pool, outcome.action);
            recheck = outcome.recheck;
        }

        let active = inner.pool.active_index();
        let view = inner
            .pool
            .get(&id)
            .map(|c| c.view(active == Some(index)))
            .ok_or_else(|| Error::UnknownCredential(id.clone()))?;
        let snapshot = inner.commit();
        drop(guard);
        self.persist(snapshot).await;

        if let Some(ticket) = recheck {
            self.recheck(ticket).await;
        }
        Ok(view)
    }

    pub async fn remove_credential(&self, id: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        inner.pool.remove(id)?;
        inner.engine.resync(&inner.pool);
        let snapshot = inner.commit();
        drop(guard);
        self.persist(snapshot).await;
        Ok(())
    }

    /// Manual selection. Bypasses the strategy.
    pub async fn set_active(&self, index: usize) -> Result<CredentialView> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        inner.pool.set_active(index)?;
        inner.engine.resync(&inner.pool);
        let view = inner
            .pool
            .credential(index)
            .map(|c| c.view(true))
            .ok_or(Error::IndexOutOfRange {
                index,
                len: inner.pool.len(),
            })?;
        info!(index, credential_id = %view.id, state = inner.engine.state().label(), "active credential set manually");
        let snapshot = inner.commit();
        drop(guard);
        self.persist(snapshot).await;
        Ok(view)
    }

    pub async fn set_strategy(&self, strategy: SwitchStrategy) {
        let mut guard = self.inner.lock().await;
        guard.pool.set_strategy(strategy);
        info!(strategy = strategy.label(), "switch strategy set");
        let snapshot = guard.commit();
        drop(guard);
        self.persist(snapshot).await;
    }

    /// The active credential for the caller's next request. Stamps
    /// `last_used`; the stamp is persisted with the next mutation.
    pub async fn select(&self) -> Result<SelectedCredential> {
        let mut inner = self.inner.lock().await;
        let state = inner.engine.state();
        let active = inner.pool.active().ok_or(Error::PoolEmpty)?;
        let selected = SelectedCredential {
            id: active.id().to_string(),
            secret: active.secret().clone(),
            state,
        };
        if state == HealthState::AllExhausted {
            debug!(id = %selected.id, "selected active credential while all exhausted");
        }
        inner.pool.touch(&selected.id);
        Ok(selected)
    }

    pub async fn credentials(&self) -> Vec<CredentialView> {
        self.inner.lock().await.pool.views()
    }

    pub async fn strategy(&self) -> SwitchStrategy {
        self.inner.lock().await.pool.strategy()
    }

    pub async fn state(&self) -> HealthState {
        self.inner.lock().await.engine.state()
    }

    // --- Endpoints ---

    pub async fn add_endpoint(&self, url: &str) -> Result<Endpoint> {
        let mut guard = self.inner.lock().await;
        let endpoint = guard.endpoints.add(url)?.clone();
        let snapshot = guard.commit();
        drop(guard);
        self.persist(snapshot).await;
        Ok(endpoint)
    }

    pub async fn remove_endpoint(&self, url: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.endpoints.remove(url)?;
        let snapshot = guard.commit();
        drop(guard);
        self.persist(snapshot).await;
        Ok(())
    }

    /// Manual endpoint switch.
    pub async fn select_endpoint(&self, url: &str) -> Result<()> {
        let mut guard = self.inner.lock().await;
        guard.endpoints.set_selected(url)?;
        info!(url, "endpoint selected manually");
        let snapshot = guard.commit();
        drop(guard);
        self.persist(snapshot).await;
        Ok(())
    }

    /// Switching to `use_fastest` re-selects from cached latencies at once.
    pub async fn set_endpoint_strategy(&self, strategy: EndpointStrategy) {
        let mut guard = self.inner.lock().await;
        guard.endpoints.set_strategy(strategy);
        if strategy == EndpointStrategy::UseFastest {
            if let Some(url) = guard.endpoints.select_fastest() {
                info!(url = %url, "switched to fastest endpoint");
            }
        }
        info!(strategy = strategy.label(), "endpoint strategy set");
        let snapshot = guard.commit();
        drop(guard);
        self.persist(snapshot).await;
    }

    /// The selected endpoint URL, or `default` when the set is empty.
    pub async fn current_endpoint(&self, default: &str) -> String {
        self.inner
            .lock()
            .await
            .endpoints
            .effective_url(default)
            .to_string()
    }

    pub async fn endpoints(&self) -> EndpointListing {
        let inner = self.inner.lock().await;
        EndpointListing {
            strategy: inner.endpoints.strategy(),
            selected: inner.endpoints.selected().map(str::to_string),
            endpoints: inner.endpoints.iter().cloned().collect(),
        }
    }

    // --- Status ---

    /// Pool summary for the health and admin endpoints. Never contains
    /// secrets.
    ///
    /// Status mapping: active credential usable and nothing exhausted or
    /// invalid → healthy; active usable but some credentials are not →
    /// degraded; empty pool or active unusable → unhealthy.
    pub async fn status(&self) -> serde_json::Value {
        let inner = self.inner.lock().await;
        let state = inner.engine.state();

        let mut available = 0usize;
        let mut unknown = 0usize;
        let mut exhausted = 0usize;
        let mut invalid = 0usize;
        for credential in inner.pool.iter() {
            match credential.status_label() {
                "available" => available += 1,
                "unknown" => unknown += 1,
                "exhausted" => exhausted += 1,
                _ => invalid += 1,
            }
        }

        let status = match state {
            _ if inner.pool.is_empty() => "unhealthy",
            HealthState::Healthy(_) if exhausted + invalid == 0 => "healthy",
            HealthState::Healthy(_) => "degraded",
            _ => "unhealthy",
        };

        serde_json::json!({
            "status": status,
            "state": state,
            "strategy": inner.pool.strategy(),
            "active_index": inner.pool.active_index(),
            "active_credential": inner.pool.active().map(|c| c.id()),
            "credentials_total": inner.pool.len(),
            "credentials_available": available,
            "credentials_unknown": unknown,
            "credentials_exhausted": exhausted,
            "credentials_invalid": invalid,
            "credentials": inner.pool.views(),
            "endpoint_strategy": inner.endpoints.strategy(),
            "selected_endpoint": inner.endpoints.selected(),
            "endpoints": inner.endpoints.iter().collect::<Vec<_>>(),
            "revision": inner.revision,
        })
    }

    // --- Collaborators ---

    /// Hand a snapshot to the store unless a newer one was already written.
    /// Failures are logged; the in-memory state stays as it is.
    async fn persist(&self, snapshot: PoolSnapshot) {
        let mut last = self.persisted.lock().await;
        if snapshot.revision <= *last {
            debug!(
                revision = snapshot.revision,
                persisted = *last,
                "skipping stale snapshot"
            );
            return;
        }
        match self.store.save(&snapshot).await {
            Ok(()) => *last = snapshot.revision,
            Err(e) => warn!(revision = snapshot.revision, error = %e, "failed to persist pool"),
        }
    }

    fn notify_action(&self, pool: &KeyPool, action: FailoverAction) {
        let name = |index: usize| {
            pool.credential(index)
                .map(display_label)
                .unwrap_or_else(|| format!("#{index}"))
        };
        match action {
            FailoverAction::None => {}
            FailoverAction::Rotate { from, to } => self.notifier.notify(
                Severity::Success,
                &format!(
                    "switched active credential from {} to {} ({})",
                    name(from),
                    name(to),
                    pool.strategy().label()
                ),
            ),
            FailoverAction::NotifyExhausted { index } => self.notifier.notify(
                Severity::Error,
                &format!("active credential {} is exhausted", name(index)),
            ),
            FailoverAction::NotifyInvalid { index } => self.notifier.notify(
                Severity::Error,
                &format!("credential {} was rejected by the provider", name(index)),
            ),
            FailoverAction::NotifyAllExhausted => self
                .notifier
                .notify(Severity::Error, "all credentials are exhausted"),
        }
    }
}

/// Store one quota result on the credential it was taken for. Returns the
/// observation it amounts to, or `None` if the credential is gone.
fn record_result(
    pool: &mut KeyPool,
    id: &str,
    result: &probe::Result<QuotaReading>,
) -> Option<Observation> {
    match result {
        Ok(reading) => {
            let quota = Quota::from_reading(*reading, now_millis());
            pool.record_quota(id, quota)
                .then_some(Observation::Quota(quota))
        }
        Err(ProbeError::Auth(msg)) => {
            let found = pool.mark_invalid(id);
            if found {
                warn!(credential_id = %id, error = %msg, "credential rejected, marked invalid");
            }
            found.then_some(Observation::AuthRejected)
        }
        Err(_) => pool.get(id).map(|_| Observation::Unreachable),
    }
}

fn outcome_label<T>(result: &probe::Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

fn display_label(credential: &Credential) -> String {
    credential
        .display_name()
        .map(str::to_string)
        .unwrap_or_else(|| credential.secret().masked())
}
