//! Credential and quota model
//!
//! A credential's quota is `None` until its first successful probe. Unknown
//! quota is not zero: round-robin treats it as available.

use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use probe::QuotaReading;
use serde::{Deserialize, Serialize};

/// Used fraction above which a credential counts as exhausted even though a
/// sliver of allowance remains.
pub const EXHAUSTION_RATIO: f64 = 0.99;

/// Current wall-clock time as unix milliseconds.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Usage counts for one credential as of `last_checked` (unix millis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub total_allowance: u64,
    pub total_used: u64,
    pub last_checked: u64,
}

impl Quota {
    pub fn from_reading(reading: QuotaReading, checked_at: u64) -> Self {
        Self {
            total_allowance: reading.total_allowance,
            total_used: reading.total_used,
            last_checked: checked_at,
        }
    }

    /// `max(0, allowance - used)`.
    pub fn remaining(&self) -> u64 {
        self.total_allowance.saturating_sub(self.total_used)
    }

    /// `used / allowance`, or 0 when there is no allowance.
    pub fn used_ratio(&self) -> f64 {
        if self.total_allowance == 0 {
            0.0
        } else {
            self.total_used as f64 / self.total_allowance as f64
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0 || self.used_ratio() > EXHAUSTION_RATIO
    }
}

/// One API secret plus its tracked quota and validity.
#[derive(Debug, Clone)]
pub struct Credential {
    pub(crate) id: String,
    pub(crate) secret: Secret<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) quota: Option<Quota>,
    pub(crate) invalid: bool,
    pub(crate) last_used: Option<u64>,
}

impl Credential {
    pub(crate) fn new(secret: String, display_name: Option<String>) -> Self {
        Self {
            id: format!("key_{}", uuid::Uuid::new_v4().as_simple()),
            secret: Secret::new(secret),
            display_name,
            quota: None,
            invalid: false,
            last_used: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &Secret<String> {
        &self.secret
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn quota(&self) -> Option<&Quota> {
        self.quota.as_ref()
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn last_used(&self) -> Option<u64> {
        self.last_used
    }

    /// Known-exhausted. Unknown quota is never exhausted.
    pub fn is_exhausted(&self) -> bool {
        self.quota.is_some_and(|q| q.is_exhausted())
    }

    /// Status label for listings and logs.
    pub fn status_label(&self) -> &'static str {
        if self.invalid {
            "invalid"
        } else {
            match &self.quota {
                None => "unknown",
                Some(q) if q.is_exhausted() => "exhausted",
                Some(_) => "available",
            }
        }
    }

    /// Listing view. Never contains the secret, only its masked preview.
    pub fn view(&self, active: bool) -> CredentialView {
        CredentialView {
            id: self.id.clone(),
            name: self.display_name.clone(),
            secret_preview: self.secret.masked(),
            active,
            status: self.status_label(),
            invalid: self.invalid,
            last_used: self.last_used,
            quota: self.quota.map(|q| QuotaView {
                total_allowance: q.total_allowance,
                total_used: q.total_used,
                remaining: q.remaining(),
                used_ratio: q.used_ratio(),
                last_checked: q.last_checked,
            }),
        }
    }
}

/// Serializable credential summary for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct CredentialView {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub secret_preview: String,
    pub active: bool,
    pub status: &'static str,
    pub invalid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaView>,
}

/// Quota with its derived fields spelled out.
#[derive(Debug, Clone, Serialize)]
pub struct QuotaView {
    pub total_allowance: u64,
    pub total_used: u64,
    pub remaining: u64,
    pub used_ratio: f64,
    pub last_checked: u64,
}
