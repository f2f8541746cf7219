//! Alert fan-out.
//!
//! Every enabled sink is offered each alert; sinks decide for themselves
//! which actions they handle (Discord only announces new votes, PagerDuty
//! also resolves). Delivery failures are logged and counted, never raised,
//! so one flaky sink cannot hold up the reconciliation cycle.

pub mod discord;
pub mod pagerduty;

use crate::config::AlertsConfig;
use crate::http::{HttpTransport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use discord::DiscordSink;
pub use pagerduty::PagerDutySink;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("{sink} delivery failed: {source}")]
    Transport {
        sink: &'static str,
        #[source]
        source: TransportError,
    },
    #[error("{sink} rejected the alert with HTTP {status}: {body}")]
    Rejected {
        sink: &'static str,
        status: u16,
        body: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    Trigger,
    Resolve,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::Trigger => "trigger",
            AlertAction::Resolve => "resolve",
        }
    }
}

impl std::fmt::Display for AlertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a sink needs to describe one vote.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteAlert {
    pub action: AlertAction,
    pub chain: String,
    pub network: String,
    pub vote_id: String,
    pub title: String,
    pub explorer_link: String,
}

impl VoteAlert {
    /// Stable per-vote key shared by trigger and resolve.
    pub fn dedup_key(&self) -> String {
        format!("{}{}{}", self.network, self.chain, self.vote_id)
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts(&self, _action: AlertAction) -> bool {
        true
    }

    async fn send(&self, alert: &VoteAlert) -> Result<(), AlertError>;
}

/// Result of one fan-out.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: usize,
    pub failed: usize,
}

pub struct AlertDispatcher {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Box<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    /// Build the enabled sinks from config.
    pub fn from_config(
        alerts: &AlertsConfig,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
    ) -> Self {
        let mut sinks: Vec<Box<dyn AlertSink>> = Vec::new();
        if alerts.pagerduty_enabled {
            sinks.push(Box::new(PagerDutySink::new(
                transport.clone(),
                alerts.pagerduty_endpoint.clone(),
                alerts.pagerduty_integration_key.clone(),
                timeout,
            )));
        }
        if alerts.discord_enabled {
            sinks.push(Box::new(DiscordSink::new(
                transport,
                alerts.discord_webhook_url.clone(),
                timeout,
            )));
        }
        if sinks.is_empty() {
            warn!("no alert sinks enabled, new votes will only be logged");
        }
        Self { sinks }
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn dispatch(&self, alert: &VoteAlert) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        // One delivery at a time, in sink order.
        for sink in self.sinks.iter().filter(|s| s.accepts(alert.action)) {
            let name = sink.name();
            match sink.send(alert).await {
                Ok(()) => {
                    info!(
                        sink = name,
                        action = %alert.action,
                        chain = %alert.chain,
                        vote_id = %alert.vote_id,
                        "alert delivered"
                    );
                    outcome.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        sink = name,
                        action = %alert.action,
                        chain = %alert.chain,
                        vote_id = %alert.vote_id,
                        error = %e,
                        "alert delivery failed"
                    );
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
