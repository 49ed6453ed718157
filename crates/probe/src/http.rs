//! HTTP probe adapters
//!
//! `HttpQuotaProbe` reads the provider's usage endpoint with the credential as
//! a Bearer token. The expected response shape is:
//!
//! ```json
//! {"usage": {"standard": {"totalAllowance": 20000000, "orgTotalTokensUsed": 1250000}}}
//! ```
//!
//! `HttpLatencyProbe` issues a plain GET and times it until response headers
//! arrive. Any HTTP status counts as reachable; only transport failures and
//! timeouts mark an endpoint offline.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::classify::{classify_status, excerpt};
use crate::{LatencyProbe, ProbeError, ProbeFuture, QuotaProbe, QuotaReading};

/// Default usage endpoint for the upstream provider.
pub const DEFAULT_USAGE_URL: &str = "https://app.factory.ai/api/organization/members/chat-usage";

#[derive(Debug, Deserialize)]
struct UsageResponse {
    usage: UsageBlock,
}

#[derive(Debug, Deserialize)]
struct UsageBlock {
    standard: StandardUsage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StandardUsage {
    #[serde(default)]
    total_allowance: f64,
    #[serde(default)]
    org_total_tokens_used: f64,
}

impl StandardUsage {
    /// Float-to-int casts saturate, so negative or NaN counts become zero.
    fn into_reading(self) -> QuotaReading {
        QuotaReading {
            total_allowance: self.total_allowance as u64,
            total_used: self.org_total_tokens_used as u64,
        }
    }
}

/// Usage-query transport over HTTP.
pub struct HttpQuotaProbe {
    client: reqwest::Client,
    usage_url: String,
    timeout: Duration,
}

impl HttpQuotaProbe {
    pub fn new(client: reqwest::Client, usage_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            usage_url: usage_url.into(),
            timeout,
        }
    }
}

impl QuotaProbe for HttpQuotaProbe {
    fn check<'a>(&'a self, secret: &'a str) -> ProbeFuture<'a, QuotaReading> {
        Box::pin(async move {
            let response = self
                .client
                .get(&self.usage_url)
                .bearer_auth(secret)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| transport_error(e, self.timeout))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| transport_error(e, self.timeout))?;

            if !status.is_success() {
                return Err(classify_status(status.as_u16(), &body));
            }

            let usage: UsageResponse = serde_json::from_str(&body).map_err(|e| {
                ProbeError::Network(format!("invalid usage response: {e}: {}", excerpt(&body)))
            })?;
            let reading = usage.usage.standard.into_reading();
            debug!(
                total_allowance = reading.total_allowance,
                total_used = reading.total_used,
                "usage read"
            );
            Ok(reading)
        })
    }
}

/// Reachability transport over HTTP.
pub struct HttpLatencyProbe {
    client: reqwest::Client,
}

impl HttpLatencyProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl LatencyProbe for HttpLatencyProbe {
    fn check<'a>(&'a self, url: &'a str, timeout: Duration) -> ProbeFuture<'a, Duration> {
        Box::pin(async move {
            let start = Instant::now();
            let response = self
                .client
                .get(url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| transport_error(e, timeout))?;
            let elapsed = start.elapsed();
            debug!(
                url,
                status = response.status().as_u16(),
                elapsed_ms = elapsed.as_millis() as u64,
                "endpoint answered"
            );
            Ok(elapsed)
        })
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(timeout)
    } else {
        ProbeError::Network(e.to_string())
    }
}
