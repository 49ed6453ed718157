//! Credential and endpoint pool manager
//!
//! Keeps a pool of interchangeable API credentials and candidate endpoints
//! for one upstream provider, tracks each credential's quota and each
//! endpoint's latency, and substitutes a healthy credential or endpoint when
//! the active one is exhausted, rejected, or offline.
//!
//! Credential lifecycle:
//! 1. Operator adds a secret → credential with unknown quota; the first one is active
//! 2. Refresh probes the active credential → quota recorded
//! 3. Active credential exhausted → strategy picks a replacement, or notifies
//! 4. Rotation → the new credential is rechecked once without further failover
//! 5. Upstream rejects a credential → marked invalid, excluded from rotation
//!    until a later probe succeeds
//! 6. No candidate left → `AllExhausted`; `select()` still hands out the
//!    active credential, tagged with that state, until one recovers
//!
//! `PoolCoordinator` is the entry point; `KeyPool`, `EndpointSet` and the
//! failover functions are plain synchronous state usable on their own.

pub mod coordinator;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod failover;
pub mod metrics;
pub mod notify;
pub mod pool;
pub mod refresh;
pub mod store;

#[cfg(test)]
mod testing;

pub use coordinator::{
    Collaborators, CredentialReport, DEFAULT_PROBE_TIMEOUT, EndpointListing, EndpointReport,
    PoolCoordinator, ProbeOutcome, RefreshReport, SelectedCredential,
};
pub use credential::{Credential, CredentialView, EXHAUSTION_RATIO, Quota, QuotaView};
pub use endpoint::{Endpoint, EndpointSet, EndpointStatus, EndpointStrategy};
pub use error::{Error, Result};
pub use failover::{FailoverAction, FailoverEngine, HealthState, Observation, RecheckTicket};
pub use notify::{Notifier, Severity, TracingNotifier};
pub use pool::{KeyPool, SwitchStrategy};
pub use refresh::{DEFAULT_REFRESH_INTERVAL, RefreshHandle, spawn_refresh_task};
pub use store::{CredentialRecord, JsonFileStore, MemoryStore, PoolSnapshot, PoolStore};
