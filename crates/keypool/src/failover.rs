//! Failover state machine
//!
//! `transition` is a pure function: it reads the pool and an observation about
//! the active credential and returns `(new_state, action)`. `FailoverEngine`
//! owns the current state, applies rotations to the pool, and issues the
//! one-shot recheck ticket for the probe that follows a rotation.
//!
//! ```text
//!   Healthy(i) ──exhausted, manual──────────▶ Exhausted(i)      notify
//!   Healthy(i) ──exhausted, candidate j─────▶ Healthy(j)        rotate, recheck j
//!   Healthy(i) ──exhausted, no candidate────▶ AllExhausted      notify
//!   any        ──auth rejected──────────────▶ Invalid(i)        notify
//!   any        ──positive remaining─────────▶ Healthy(i)
//!   any        ──network / timeout──────────▶ (unchanged)
//! ```

use std::cmp::Reverse;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::credential::Quota;
use crate::metrics;
use crate::pool::{KeyPool, SwitchStrategy};

/// Health of the pool as seen through its active credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "active_index", rename_all = "snake_case")]
pub enum HealthState {
    Healthy(usize),
    Exhausted(usize),
    Invalid(usize),
    /// No rotation candidate remains. The active index is left untouched.
    AllExhausted,
}

impl HealthState {
    pub fn label(&self) -> &'static str {
        match self {
            HealthState::Healthy(_) => "healthy",
            HealthState::Exhausted(_) => "exhausted",
            HealthState::Invalid(_) => "invalid",
            HealthState::AllExhausted => "all_exhausted",
        }
    }
}

/// A fact about the active credential, derived from a quota probe or a pool
/// change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Quota(Quota),
    AuthRejected,
    /// Network failure or timeout. Never changes state.
    Unreachable,
    /// A credential was appended at `index`.
    CredentialAdded { index: usize },
}

/// What the caller must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverAction {
    None,
    Rotate { from: usize, to: usize },
    NotifyExhausted { index: usize },
    NotifyInvalid { index: usize },
    NotifyAllExhausted,
}

/// Marker attached to the probe of a freshly rotated-to credential.
///
/// Only the result carrying the ticket of the latest rotation is evaluated
/// without failover, and only once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecheckTicket {
    pub generation: u64,
    pub credential_id: String,
}

/// Rotation candidate for an exhausted active credential, or `None`.
///
/// Candidates are every credential except the active one that is not marked
/// invalid. A known quota qualifies when anything remains; an unknown quota
/// qualifies for round-robin only. A candidate near its ratio threshold is
/// still taken; the guarded recheck then classifies it.
pub fn select_candidate(pool: &KeyPool) -> Option<usize> {
    let active = pool.active_index()?;
    let n = pool.len();
    let candidates = (1..n)
        .map(|offset| (active + offset) % n)
        .filter_map(|i| pool.credential(i).map(|c| (i, c)))
        .filter(|(_, c)| !c.is_invalid());

    match pool.strategy() {
        SwitchStrategy::Manual => None,
        SwitchStrategy::RoundRobin => candidates
            .filter(|(_, c)| c.quota().is_none_or(|q| q.remaining() > 0))
            .map(|(i, _)| i)
            .next(),
        SwitchStrategy::UseLowest => candidates
            .filter_map(|(i, c)| known_remaining(c.quota()).map(|r| (i, r)))
            .min_by_key(|&(i, remaining)| (remaining, i))
            .map(|(i, _)| i),
        SwitchStrategy::UseHighest => candidates
            .filter_map(|(i, c)| known_remaining(c.quota()).map(|r| (i, r)))
            .min_by_key(|&(i, remaining)| (Reverse(remaining), i))
            .map(|(i, _)| i),
    }
}

fn known_remaining(quota: Option<&Quota>) -> Option<u64> {
    quota.map(|q| q.remaining()).filter(|&remaining| remaining > 0)
}

/// State classified from cached pool data alone.
fn classify_cached(pool: &KeyPool) -> HealthState {
    match (pool.active_index(), pool.active()) {
        (Some(i), Some(active)) if active.is_invalid() => HealthState::Invalid(i),
        (Some(i), Some(active)) if active.is_exhausted() => HealthState::Exhausted(i),
        (Some(i), _) => HealthState::Healthy(i),
        _ => HealthState::Healthy(0),
    }
}

/// Pure transition. `guarded` marks the recheck of a just-rotated-to
/// credential, which is classified but never triggers another rotation.
pub fn transition(
    state: HealthState,
    observation: Observation,
    pool: &KeyPool,
    guarded: bool,
) -> (HealthState, FailoverAction) {
    let Some(active) = pool.active_index() else {
        return (state, FailoverAction::None);
    };

    match observation {
        Observation::Unreachable => (state, FailoverAction::None),

        Observation::AuthRejected => {
            if state == HealthState::Invalid(active) {
                (state, FailoverAction::None)
            } else {
                (
                    HealthState::Invalid(active),
                    FailoverAction::NotifyInvalid { index: active },
                )
            }
        }

        Observation::Quota(quota) if !quota.is_exhausted() => {
            (HealthState::Healthy(active), FailoverAction::None)
        }

        Observation::Quota(_) => {
            if guarded || pool.strategy() == SwitchStrategy::Manual {
                return enter_exhausted(state, active);
            }
            match select_candidate(pool) {
                Some(to) => (
                    HealthState::Healthy(to),
                    FailoverAction::Rotate { from: active, to },
                ),
                None if state == HealthState::AllExhausted => (state, FailoverAction::None),
                None => (HealthState::AllExhausted, FailoverAction::NotifyAllExhausted),
            }
        }

        Observation::CredentialAdded { index } => {
            if state != HealthState::AllExhausted {
                return (state, FailoverAction::None);
            }
            if pool.strategy() == SwitchStrategy::Manual {
                return (HealthState::Exhausted(active), FailoverAction::None);
            }
            // The new credential is unprobed, so it is the fallback even for
            // strategies that only rank known quotas.
            let to = select_candidate(pool).unwrap_or(index);
            if to == active {
                return (HealthState::Exhausted(active), FailoverAction::None);
            }
            (
                HealthState::Healthy(to),
                FailoverAction::Rotate { from: active, to },
            )
        }
    }
}

fn enter_exhausted(state: HealthState, active: usize) -> (HealthState, FailoverAction) {
    if state == HealthState::Exhausted(active) {
        (state, FailoverAction::None)
    } else {
        (
            HealthState::Exhausted(active),
            FailoverAction::NotifyExhausted { index: active },
        )
    }
}

/// Result of feeding one observation to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub action: FailoverAction,
    /// Present after a rotation: the caller must probe this credential
    /// immediately and hand the ticket back with the result.
    pub recheck: Option<RecheckTicket>,
}

#[derive(Debug)]
pub struct FailoverEngine {
    state: HealthState,
    generation: u64,
    recheck: Option<RecheckTicket>,
}

impl FailoverEngine {
    /// Start from the state implied by the pool's cached data.
    pub fn new(pool: &KeyPool) -> Self {
        Self {
            state: classify_cached(pool),
            generation: 0,
            recheck: None,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    /// Feed an observation about the active credential and apply any rotation
    /// to `pool`.
    ///
    /// `ticket` is the marker returned with a previous rotation, if this
    /// observation is the result of that recheck probe.
    pub fn observe(
        &mut self,
        pool: &mut KeyPool,
        observation: Observation,
        ticket: Option<&RecheckTicket>,
    ) -> Outcome {
        let guarded = match (ticket, &self.recheck) {
            (Some(t), Some(pending)) if t == pending => {
                self.recheck = None;
                true
            }
            (Some(t), _) => {
                debug!(generation = t.generation, "stale recheck ticket ignored");
                false
            }
            (None, _) => false,
        };

        let (next, action) = transition(self.state, observation, pool, guarded);
        self.apply(pool, next, action)
    }

    /// Re-run candidate selection while all credentials are exhausted, for
    /// example after a batch refresh updated cached quotas.
    pub fn reevaluate(&mut self, pool: &mut KeyPool) -> Outcome {
        if self.state != HealthState::AllExhausted {
            return Outcome {
                action: FailoverAction::None,
                recheck: None,
            };
        }
        let (next, action) = match (pool.active_index(), select_candidate(pool)) {
            (Some(from), Some(to)) => (HealthState::Healthy(to), FailoverAction::Rotate { from, to }),
            _ => (self.state, FailoverAction::None),
        };
        self.apply(pool, next, action)
    }

    /// Reclassify from cached data after a manual selection or a structural
    /// change. Any pending recheck is discarded.
    ///
    /// `AllExhausted` survives as long as the active credential is still
    /// exhausted and the strategy still finds no candidate.
    pub fn resync(&mut self, pool: &KeyPool) {
        self.generation += 1;
        self.recheck = None;

        let mut next = classify_cached(pool);
        if self.state == HealthState::AllExhausted
            && matches!(next, HealthState::Exhausted(_))
            && pool.strategy() != SwitchStrategy::Manual
            && select_candidate(pool).is_none()
        {
            next = HealthState::AllExhausted;
        }
        self.set_state(next);
    }

    fn apply(&mut self, pool: &mut KeyPool, next: HealthState, action: FailoverAction) -> Outcome {
        let mut recheck = None;
        match action {
            FailoverAction::Rotate { from, to } => {
                if let Err(e) = pool.set_active(to) {
                    // Unreachable while the pool is locked for the whole call
                    warn!(error = %e, "rotation target vanished");
                    return Outcome {
                        action: FailoverAction::None,
                        recheck: None,
                    };
                }
                self.generation += 1;
                let credential_id = pool.active().map(|c| c.id().to_string()).unwrap_or_default();
                info!(
                    from,
                    to,
                    credential_id = %credential_id,
                    strategy = pool.strategy().label(),
                    generation = self.generation,
                    "rotated active credential"
                );
                metrics::record_rotation(pool.strategy().label());
                let ticket = RecheckTicket {
                    generation: self.generation,
                    credential_id,
                };
                self.recheck = Some(ticket.clone());
                recheck = Some(ticket);
            }
            FailoverAction::NotifyAllExhausted => {
                warn!(strategy = pool.strategy().label(), "all credentials exhausted");
            }
            FailoverAction::NotifyExhausted { index } => {
                warn!(index, "active credential exhausted");
            }
            FailoverAction::NotifyInvalid { index } => {
                warn!(index, "active credential rejected by upstream");
            }
            FailoverAction::None => {}
        }
        self.set_state(next);
        Outcome { action, recheck }
    }

    fn set_state(&mut self, next: HealthState) {
        if next != self.state {
            debug!(from = self.state.label(), to = next.label(), "failover state changed");
            if next.label() != self.state.label() {
                metrics::record_transition(next.label());
            }
            self.state = next;
        }
    }
}
