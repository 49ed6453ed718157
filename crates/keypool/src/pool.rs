//! Ordered credential pool with an active selection
//!
//! `KeyPool` is plain in-memory state with synchronous operations. It does no
//! locking of its own: `PoolCoordinator` owns it behind a mutex so every
//! mutation (add, remove, manual selection, rotation) is serialized.
//!
//! Invariant: whenever the pool is non-empty, `active_index < len`. Once a
//! credential has been added the pool never drops back to empty.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::credential::{Credential, CredentialView, Quota, now_millis};
use crate::error::{Error, Result};

/// How a replacement is chosen when the active credential is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchStrategy {
    /// Never rotate automatically; only notify.
    #[default]
    Manual,
    /// Next usable credential after the active one, cyclically.
    RoundRobin,
    /// Usable credential with the least remaining quota.
    UseLowest,
    /// Usable credential with the most remaining quota.
    UseHighest,
}

impl SwitchStrategy {
    pub const ALL: [SwitchStrategy; 4] = [
        SwitchStrategy::Manual,
        SwitchStrategy::RoundRobin,
        SwitchStrategy::UseLowest,
        SwitchStrategy::UseHighest,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SwitchStrategy::Manual => "manual",
            SwitchStrategy::RoundRobin => "round_robin",
            SwitchStrategy::UseLowest => "use_lowest",
            SwitchStrategy::UseHighest => "use_highest",
        }
    }
}

/// Credentials for one provider, the active index, and the switch strategy.
#[derive(Debug, Clone, Default)]
pub struct KeyPool {
    credentials: Vec<Credential>,
    active_index: usize,
    strategy: SwitchStrategy,
}

impl KeyPool {
    pub fn new(strategy: SwitchStrategy) -> Self {
        Self {
            credentials: Vec::new(),
            active_index: 0,
            strategy,
        }
    }

    /// Rebuild a pool from persisted parts.
    ///
    /// Later duplicates of an already-seen secret are dropped and an out of
    /// range active index is clamped, so a hand-edited store cannot break the
    /// pool invariants.
    pub(crate) fn from_parts(
        credentials: Vec<Credential>,
        active_index: usize,
        strategy: SwitchStrategy,
    ) -> Self {
        let mut pool = Self::new(strategy);
        for credential in credentials {
            let duplicate = pool
                .credentials
                .iter()
                .any(|c| c.id == credential.id || c.secret.matches(credential.secret.expose()));
            if duplicate {
                tracing::warn!(credential_id = %credential.id, "dropping duplicate credential from store");
                continue;
            }
            pool.credentials.push(credential);
        }
        pool.active_index = active_index.min(pool.credentials.len().saturating_sub(1));
        pool
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    pub fn credential(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    pub fn get(&self, id: &str) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.credentials.iter().position(|c| c.id == id)
    }

    /// Index of the active credential, `None` for an empty pool.
    pub fn active_index(&self) -> Option<usize> {
        if self.credentials.is_empty() {
            None
        } else {
            Some(self.active_index)
        }
    }

    pub fn active(&self) -> Option<&Credential> {
        self.credentials.get(self.active_index)
    }

    pub fn strategy(&self) -> SwitchStrategy {
        self.strategy
    }

    /// Takes effect on the next failover evaluation.
    pub fn set_strategy(&mut self, strategy: SwitchStrategy) {
        self.strategy = strategy;
    }

    /// Add a credential. The first credential of an empty pool becomes active.
    ///
    /// Secrets are compared exactly (case-sensitive); a secret already in the
    /// pool is rejected whatever name it is added under.
    pub fn add(&mut self, secret: String, name: Option<String>) -> Result<&Credential> {
        if secret.trim().is_empty() {
            return Err(Error::InvalidCredential("secret is empty".into()));
        }
        if self.credentials.iter().any(|c| c.secret.matches(&secret)) {
            return Err(Error::DuplicateCredential);
        }
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let credential = Credential::new(secret, name);
        info!(credential_id = %credential.id, pool_size = self.credentials.len() + 1, "credential added");
        self.credentials.push(credential);
        if self.credentials.len() == 1 {
            self.active_index = 0;
        }
        let last = self.credentials.len() - 1;
        Ok(&self.credentials[last])
    }

    /// Remove a credential by id.
    ///
    /// Removing the active credential auto-selects a successor: the next
    /// credential (cyclically) that is not marked invalid. With no such
    /// successor the removal is refused and the caller must select another
    /// credential explicitly first.
    pub fn remove(&mut self, id: &str) -> Result<Credential> {
        let index = self
            .position(id)
            .ok_or_else(|| Error::UnknownCredential(id.to_string()))?;
        if self.credentials.len() == 1 {
            return Err(Error::PoolWouldBeEmpty);
        }

        if index == self.active_index {
            let successor = self
                .next_valid_after(index)
                .ok_or_else(|| Error::CannotRemoveActive(id.to_string()))?;
            let removed = self.credentials.remove(index);
            self.active_index = if successor > index {
                successor - 1
            } else {
                successor
            };
            self.credentials[self.active_index].last_used = Some(now_millis());
            info!(
                credential_id = %removed.id,
                successor_id = %self.credentials[self.active_index].id,
                "active credential removed, successor selected"
            );
            return Ok(removed);
        }

        let removed = self.credentials.remove(index);
        if index < self.active_index {
            self.active_index -= 1;
        }
        info!(credential_id = %removed.id, "credential removed");
        Ok(removed)
    }

    /// Manual override of the active credential, bypassing the strategy.
    pub fn set_active(&mut self, index: usize) -> Result<()> {
        let len = self.credentials.len();
        let credential = self
            .credentials
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange { index, len })?;
        credential.last_used = Some(now_millis());
        self.active_index = index;
        Ok(())
    }

    /// Store a fresh quota reading. A successful read also clears `invalid`.
    ///
    /// Returns false if the credential is no longer in the pool.
    pub fn record_quota(&mut self, id: &str, quota: Quota) -> bool {
        match self.credentials.iter_mut().find(|c| c.id == id) {
            Some(credential) => {
                if credential.invalid {
                    info!(credential_id = %id, "credential accepted again, clearing invalid flag");
                }
                credential.quota = Some(quota);
                credential.invalid = false;
                true
            }
            None => false,
        }
    }

    /// Flag a credential as rejected by upstream authentication.
    ///
    /// Returns false if the credential is no longer in the pool.
    pub fn mark_invalid(&mut self, id: &str) -> bool {
        match self.credentials.iter_mut().find(|c| c.id == id) {
            Some(credential) => {
                credential.invalid = true;
                true
            }
            None => false,
        }
    }

    /// Stamp `last_used` on a credential.
    pub fn touch(&mut self, id: &str) -> bool {
        match self.credentials.iter_mut().find(|c| c.id == id) {
            Some(credential) => {
                credential.last_used = Some(now_millis());
                true
            }
            None => false,
        }
    }

    /// Listing views in pool order.
    pub fn views(&self) -> Vec<CredentialView> {
        self.credentials
            .iter()
            .enumerate()
            .map(|(i, c)| c.view(i == self.active_index))
            .collect()
    }

    /// First credential after `index` (wrapping, excluding `index`) that is
    /// not marked invalid.
    fn next_valid_after(&self, index: usize) -> Option<usize> {
        let n = self.credentials.len();
        (1..n)
            .map(|offset| (index + offset) % n)
            .find(|&i| !self.credentials[i].invalid)
    }
}
