//! Upstream request counters.
//!
//! One counter family, labelled per chain and per outcome, recorded after
//! every proposal page fetch:
//!
//!   governance_votes_api_req_status_total{name, network, api_endpoint, status}
//!
//! The counters live in a private registry and are exposed for scraping
//! by [`server`].

pub mod server;

use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// Outcome of one upstream page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Success => write!(f, "success"),
            RequestStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Labels identifying one chain's endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EndpointLabels<'a> {
    pub chain: &'a str,
    pub network: &'a str,
    pub api_endpoint: &'a str,
}

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new(
                "governance_votes_api_req_status_total",
                "Count the number of success or failed api call for a given network",
            ),
            &["name", "network", "api_endpoint", "status"],
        )?;
        registry.register(Box::new(requests.clone()))?;
        Ok(Self { registry, requests })
    }

    pub fn record_request(&self, labels: EndpointLabels<'_>, status: RequestStatus) {
        let status = status.to_string();
        self.requests
            .with_label_values(&[labels.chain, labels.network, labels.api_endpoint, status.as_str()])
            .inc();
    }

    pub fn request_count(&self, labels: EndpointLabels<'_>, status: RequestStatus) -> u64 {
        let status = status.to_string();
        self.requests
            .with_label_values(&[labels.chain, labels.network, labels.api_endpoint, status.as_str()])
            .get()
    }

    /// Render every registered family in Prometheus text format.
    pub fn encode_text(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HUB: EndpointLabels<'static> = EndpointLabels {
        chain: "cosmoshub",
        network: "mainnet",
        api_endpoint: "https://rest.cosmos.example/cosmos/gov/v1/proposals",
    };

    #[test]
    fn test_counts_per_status() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.record_request(HUB, RequestStatus::Success);
        metrics.record_request(HUB, RequestStatus::Success);
        metrics.record_request(HUB, RequestStatus::Failed);

        assert_eq!(metrics.request_count(HUB, RequestStatus::Success), 2);
        assert_eq!(metrics.request_count(HUB, RequestStatus::Failed), 1);
    }

    #[test]
    fn test_encode_text() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.record_request(HUB, RequestStatus::Success);

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("governance_votes_api_req_status_total"));
        assert!(text.contains("name=\"cosmoshub\""));
        assert!(text.contains("status=\"success\""));
    }
}
