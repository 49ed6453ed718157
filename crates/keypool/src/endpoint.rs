//! Candidate endpoints with cached latency and a selected endpoint
//!
//! Endpoints are kept in insertion order so latency ties resolve to the one
//! added first. Offline endpoints are never removed automatically.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::credential::now_millis;
use crate::error::{Error, Result};

/// Reachability of an endpoint as of its last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Probing,
}

/// How the selected endpoint is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointStrategy {
    #[default]
    Manual,
    /// Re-select the lowest-latency online endpoint after each probe batch.
    UseFastest,
}

impl EndpointStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            EndpointStrategy::Manual => "manual",
            EndpointStrategy::UseFastest => "use_fastest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub added_at: u64,
    #[serde(default)]
    pub last_used: Option<u64>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    #[serde(default)]
    pub status: EndpointStatus,
    #[serde(default)]
    pub last_tested: Option<u64>,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            added_at: now_millis(),
            last_used: None,
            latency_ms: None,
            status: EndpointStatus::Unknown,
            last_tested: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EndpointSet {
    endpoints: Vec<Endpoint>,
    selected: Option<String>,
    strategy: EndpointStrategy,
}

impl EndpointSet {
    pub fn new(strategy: EndpointStrategy) -> Self {
        Self {
            endpoints: Vec::new(),
            selected: None,
            strategy,
        }
    }

    /// Rebuild from persisted parts, dropping duplicate urls and a dangling
    /// selection.
    pub(crate) fn from_parts(
        endpoints: Vec<Endpoint>,
        selected: Option<String>,
        strategy: EndpointStrategy,
    ) -> Self {
        let mut set = Self::new(strategy);
        for mut endpoint in endpoints {
            if set.get(&endpoint.url).is_some() {
                tracing::warn!(url = %endpoint.url, "dropping duplicate endpoint from store");
                continue;
            }
            // A probe interrupted by shutdown leaves nothing meaningful behind
            if endpoint.status == EndpointStatus::Probing {
                endpoint.status = EndpointStatus::Unknown;
            }
            set.endpoints.push(endpoint);
        }
        set.selected = selected
            .filter(|url| set.get(url).is_some())
            .or_else(|| set.endpoints.first().map(|e| e.url.clone()));
        set
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    pub fn get(&self, url: &str) -> Option<&Endpoint> {
        self.position(url).map(|i| &self.endpoints[i])
    }

    fn position(&self, url: &str) -> Option<usize> {
        let url = normalize(url);
        self.endpoints.iter().position(|e| e.url == url)
    }

    fn get_mut(&mut self, url: &str) -> Option<&mut Endpoint> {
        self.position(url).map(|i| &mut self.endpoints[i])
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn strategy(&self) -> EndpointStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: EndpointStrategy) {
        self.strategy = strategy;
    }

    /// Add an endpoint. The first endpoint added becomes selected.
    pub fn add(&mut self, url: &str) -> Result<&Endpoint> {
        let url = normalize(url);
        let valid = ["http://", "https://"]
            .iter()
            .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme));
        if !valid {
            return Err(Error::InvalidEndpoint(url.to_string()));
        }
        if self.get(url).is_some() {
            return Err(Error::DuplicateEndpoint(url.to_string()));
        }

        self.endpoints.push(Endpoint::new(url.to_string()));
        if self.selected.is_none() {
            self.selected = Some(url.to_string());
        }
        info!(url, endpoints = self.endpoints.len(), "endpoint added");
        let last = self.endpoints.len() - 1;
        Ok(&self.endpoints[last])
    }

    /// Remove an endpoint. A removed selection moves to the fastest online
    /// endpoint, or the first remaining one.
    pub fn remove(&mut self, url: &str) -> Result<Endpoint> {
        let url = normalize(url);
        let index = self
            .position(url)
            .ok_or_else(|| Error::UnknownEndpoint(url.to_string()))?;
        if self.endpoints.len() == 1 {
            return Err(Error::EndpointSetWouldBeEmpty(url.to_string()));
        }

        let removed = self.endpoints.remove(index);
        if self.selected.as_deref() == Some(url) {
            self.selected = self
                .fastest()
                .or_else(|| self.endpoints.first())
                .map(|e| e.url.clone());
        }
        info!(url, selected = ?self.selected, "endpoint removed");
        Ok(removed)
    }

    pub fn set_selected(&mut self, url: &str) -> Result<()> {
        let index = self
            .position(url)
            .ok_or_else(|| Error::UnknownEndpoint(normalize(url).to_string()))?;
        let endpoint = &mut self.endpoints[index];
        endpoint.last_used = Some(now_millis());
        self.selected = Some(endpoint.url.clone());
        Ok(())
    }

    /// Flag an endpoint as having a probe in flight.
    pub fn mark_probing(&mut self, url: &str) -> bool {
        match self.get_mut(url) {
            Some(endpoint) => {
                endpoint.status = EndpointStatus::Probing;
                true
            }
            None => false,
        }
    }

    /// Undo `mark_probing` for a probe whose result will never arrive.
    /// Endpoints already holding a fresh result are left alone.
    pub fn clear_probing(&mut self, url: &str, previous: EndpointStatus) -> bool {
        match self.get_mut(url) {
            Some(endpoint) if endpoint.status == EndpointStatus::Probing => {
                endpoint.status = previous;
                true
            }
            _ => false,
        }
    }

    /// Store a probe result: `Some(ms)` is online, `None` is offline with no
    /// latency. Returns false if the endpoint was removed meanwhile.
    pub fn record_latency(&mut self, url: &str, latency_ms: Option<u64>) -> bool {
        match self.get_mut(url) {
            Some(endpoint) => {
                endpoint.latency_ms = latency_ms;
                endpoint.status = if latency_ms.is_some() {
                    EndpointStatus::Online
                } else {
                    EndpointStatus::Offline
                };
                endpoint.last_tested = Some(now_millis());
                true
            }
            None => false,
        }
    }

    /// Online endpoint with the lowest latency; ties go to insertion order.
    /// An endpoint being probed ranks by its last online latency.
    pub fn fastest(&self) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .filter(|e| matches!(e.status, EndpointStatus::Online | EndpointStatus::Probing))
            .filter_map(|e| e.latency_ms.map(|ms| (ms, e)))
            .min_by_key(|(ms, _)| *ms)
            .map(|(_, e)| e)
    }

    /// Select the fastest online endpoint. Returns the new selection when it
    /// changed, `None` when unchanged or nothing is online.
    pub fn select_fastest(&mut self) -> Option<String> {
        let fastest = self.fastest()?.url.clone();
        if self.selected.as_deref() == Some(fastest.as_str()) {
            return None;
        }
        if let Some(endpoint) = self.endpoints.iter_mut().find(|e| e.url == fastest) {
            endpoint.last_used = Some(now_millis());
        }
        self.selected = Some(fastest.clone());
        Some(fastest)
    }

    /// The selected endpoint, or `default` when none has been added.
    pub fn effective_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.selected.as_deref().unwrap_or(default)
    }
}

/// Canonical form stored in the set: surrounding whitespace and trailing
/// slashes removed.
fn normalize(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set_with(urls: &[&str]) -> EndpointSet {
        let mut set = EndpointSet::new(EndpointStrategy::UseFastest);
        for url in urls {
            set.add(url).unwrap();
        }
        set
    }

    #[test]
    fn first_endpoint_becomes_selected() {
        let set = set_with(&["https://x.example", "https://y.example"]);
        assert_eq!(set.selected(), Some("https://x.example"));
        assert_eq!(set.get("https://y.example").unwrap().status, EndpointStatus::Unknown);
    }

    #[test]
    fn rejects_non_http_urls() {
        let mut set = EndpointSet::default();
        for bad in ["ftp://x.example", "x.example", "", "https://"] {
            let err = set.add(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidEndpoint(_)), "{bad}");
        }
    }

    #[test]
    fn trailing_slash_url_can_be_selected_and_removed() {
        let mut set = set_with(&["https://w.example"]);
        set.add("https://x.example/").unwrap();
        assert!(set.get("https://x.example/").is_some());

        set.set_selected("https://x.example/").unwrap();
        assert_eq!(set.selected(), Some("https://x.example"));
        assert!(set.mark_probing("https://x.example/"));
        assert!(set.record_latency("https://x.example/", Some(80)));
        assert_eq!(set.get("https://x.example").unwrap().latency_ms, Some(80));

        let removed = set.remove("https://x.example/").unwrap();
        assert_eq!(removed.url, "https://x.example");
        assert_eq!(set.selected(), Some("https://w.example"));
        assert!(matches!(
            set.remove(" https://x.example// "),
            Err(Error::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn probing_endpoint_keeps_last_latency_for_ranking() {
        let mut set = set_with(&["https://x.example", "https://y.example"]);
        set.record_latency("https://x.example", Some(300));
        set.record_latency("https://y.example", Some(120));
        set.mark_probing("https://y.example");

        assert_eq!(set.fastest().unwrap().url, "https://y.example");
        set.set_selected("https://y.example").unwrap();
        set.remove("https://y.example").unwrap();
        assert_eq!(set.selected(), Some("https://x.example"));
    }

    #[test]
    fn clear_probing_restores_previous_status_only_while_probing() {
        let mut set = set_with(&["https://x.example", "https://y.example"]);
        set.record_latency("https://x.example", Some(50));
        set.mark_probing("https://x.example");
        set.mark_probing("https://y.example");
        set.record_latency("https://y.example", None);

        assert!(set.clear_probing("https://x.example", EndpointStatus::Online));
        assert!(!set.clear_probing("https://y.example", EndpointStatus::Unknown));
        assert_eq!(set.get("https://x.example").unwrap().status, EndpointStatus::Online);
        assert_eq!(set.get("https://y.example").unwrap().status, EndpointStatus::Offline);
    }

    #[test]
    fn rejects_duplicate_url() {
        let mut set = set_with(&["https://x.example"]);
        let err = set.add("https://x.example/").unwrap_err();
        assert!(matches!(err, Error::DuplicateEndpoint(_)));
    }

    #[test]
    fn use_fastest_picks_lowest_latency_online() {
        // X=300ms, Y=120ms, Z timed out
        let mut set = set_with(&["https://x.example", "https://y.example", "https://z.example"]);
        set.record_latency("https://x.example", Some(300));
        set.record_latency("https://y.example", Some(120));
        set.record_latency("https://z.example", None);

        assert_eq!(set.select_fastest().as_deref(), Some("https://y.example"));
        assert_eq!(set.selected(), Some("https://y.example"));
        let z = set.get("https://z.example").unwrap();
        assert_eq!(z.status, EndpointStatus::Offline);
        assert_eq!(z.latency_ms, None);
    }

    #[test]
    fn latency_tie_goes_to_insertion_order() {
        let mut set = set_with(&["https://x.example", "https://y.example", "https://z.example"]);
        set.record_latency("https://x.example", None);
        set.record_latency("https://y.example", Some(80));
        set.record_latency("https://z.example", Some(80));
        assert_eq!(set.fastest().unwrap().url, "https://y.example");
    }

    #[test]
    fn select_fastest_without_online_keeps_selection() {
        let mut set = set_with(&["https://x.example", "https://y.example"]);
        set.record_latency("https://x.example", None);
        set.record_latency("https://y.example", None);
        assert_eq!(set.select_fastest(), None);
        assert_eq!(set.selected(), Some("https://x.example"));
    }

    #[test]
    fn probing_endpoint_is_not_a_candidate() {
        let mut set = set_with(&["https://x.example"]);
        set.record_latency("https://x.example", Some(50));
        set.mark_probing("https://x.example");
        assert!(set.fastest().is_none());
    }

    #[test]
    fn remove_selected_reassigns_to_fastest() {
        let mut set = set_with(&["https://x.example", "https://y.example", "https://z.example"]);
        set.record_latency("https://y.example", Some(200));
        set.record_latency("https://z.example", Some(90));

        set.remove("https://x.example").unwrap();
        assert_eq!(set.selected(), Some("https://z.example"));
    }

    #[test]
    fn remove_selected_without_online_falls_back_to_first() {
        let mut set = set_with(&["https://x.example", "https://y.example", "https://z.example"]);
        set.remove("https://x.example").unwrap();
        assert_eq!(set.selected(), Some("https://y.example"));
    }

    #[test]
    fn remove_only_endpoint_fails() {
        let mut set = set_with(&["https://x.example"]);
        let err = set.remove("https://x.example").unwrap_err();
        assert!(matches!(err, Error::EndpointSetWouldBeEmpty(_)));
    }

    #[test]
    fn unknown_endpoint_errors() {
        let mut set = set_with(&["https://x.example", "https://y.example"]);
        assert!(matches!(
            set.remove("https://nope.example"),
            Err(Error::UnknownEndpoint(_))
        ));
        assert!(matches!(
            set.set_selected("https://nope.example"),
            Err(Error::UnknownEndpoint(_))
        ));
    }

    #[test]
    fn effective_url_falls_back_to_default() {
        let set = EndpointSet::default();
        assert_eq!(set.effective_url("https://default.example"), "https://default.example");
        let set = set_with(&["https://x.example"]);
        assert_eq!(set.effective_url("https://default.example"), "https://x.example");
    }

    #[test]
    fn from_parts_resets_probing_and_dangling_selection() {
        let mut probing = Endpoint::new("https://x.example".into());
        probing.status = EndpointStatus::Probing;
        let set = EndpointSet::from_parts(
            vec![probing.clone(), probing],
            Some("https://gone.example".into()),
            EndpointStrategy::Manual,
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("https://x.example").unwrap().status, EndpointStatus::Unknown);
        assert_eq!(set.selected(), Some("https://x.example"));
    }
}
