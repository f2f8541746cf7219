//! PagerDuty Events API v2 sink.

use super::{AlertAction, AlertError, AlertSink, VoteAlert};
use crate::http::HttpTransport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SOURCE: &str = "Governance Vote Alerter";
const ACCEPTED: u16 = 202;

pub struct PagerDutySink {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    integration_key: String,
    timeout: Duration,
}

impl PagerDutySink {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoint: String,
        integration_key: String,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            endpoint,
            integration_key,
            timeout,
        }
    }

    fn event(&self, alert: &VoteAlert) -> Value {
        json!({
            "event_action": alert.action.as_str(),
            "routing_key": self.integration_key,
            "dedup_key": alert.dedup_key(),
            "payload": {
                "summary": format!(
                    "New Governance Vote: {} {} #{}",
                    alert.network, alert.chain, alert.vote_id
                ),
                "custom_details": alert.explorer_link,
                "source": SOURCE,
                "severity": "info",
            }
        })
    }
}

#[async_trait]
impl AlertSink for PagerDutySink {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    fn accepts(&self, action: AlertAction) -> bool {
        matches!(action, AlertAction::Trigger | AlertAction::Resolve)
    }

    async fn send(&self, alert: &VoteAlert) -> Result<(), AlertError> {
        info!(
            action = %alert.action,
            chain = %alert.chain,
            vote_id = %alert.vote_id,
            "sending PagerDuty event"
        );
        let headers = vec![(
            "Authorization".to_string(),
            format!("Token token={}", self.integration_key),
        )];
        let resp = self
            .transport
            .post_json(&self.endpoint, &headers, &self.event(alert), self.timeout)
            .await
            .map_err(|source| AlertError::Transport {
                sink: self.name(),
                source,
            })?;

        if resp.status != ACCEPTED {
            return Err(AlertError::Rejected {
                sink: self.name(),
                status: resp.status,
                body: resp.body,
            });
        }
        Ok(())
    }
}
