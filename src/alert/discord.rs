//! Discord webhook sink. Announces new votes only.

use super::{AlertAction, AlertError, AlertSink, VoteAlert};
use crate::http::HttpTransport;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const NO_CONTENT: u16 = 204;

pub struct DiscordSink {
    transport: Arc<dyn HttpTransport>,
    webhook_url: String,
    timeout: Duration,
}

impl DiscordSink {
    pub fn new(transport: Arc<dyn HttpTransport>, webhook_url: String, timeout: Duration) -> Self {
        Self {
            transport,
            webhook_url,
            timeout,
        }
    }
}

fn message(alert: &VoteAlert) -> String {
    format!(
        "New **{} {}** Governance Vote: **{}**\n{}",
        alert.network, alert.chain, alert.title, alert.explorer_link
    )
}

#[async_trait]
impl AlertSink for DiscordSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn accepts(&self, action: AlertAction) -> bool {
        action == AlertAction::Trigger
    }

    async fn send(&self, alert: &VoteAlert) -> Result<(), AlertError> {
        info!(chain = %alert.chain, vote_id = %alert.vote_id, "sending Discord alert");
        let body = json!({ "content": message(alert) });
        let resp = self
            .transport
            .post_json(&self.webhook_url, &[], &body, self.timeout)
            .await
            .map_err(|source| AlertError::Transport {
                sink: self.name(),
                source,
            })?;

        if resp.status != NO_CONTENT {
            return Err(AlertError::Rejected {
                sink: self.name(),
                status: resp.status,
                body: resp.body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::mock::ScriptedTransport;

    const URL: &str = "https://discord.example/api/webhooks/1/abc";

    fn alert() -> VoteAlert {
        VoteAlert {
            action: AlertAction::Trigger,
            chain: "juno".to_string(),
            network: "testnet".to_string(),
            vote_id: "41".to_string(),
            title: "Community pool spend".to_string(),
            explorer_link: "https://explorer.example/juno/gov/41".to_string(),
        }
    }

    #[tokio::test]
    async fn test_message_format() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_post_status(URL, 204);
        let sink = DiscordSink::new(transport.clone(), URL.to_string(), Duration::from_secs(10));
        sink.send(&alert()).await.unwrap();

        let posts = transport.posts_to(URL);
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].body.as_ref().unwrap()["content"],
            "New **testnet juno** Governance Vote: **Community pool spend**\nhttps://explorer.example/juno/gov/41"
        );
    }

    #[test]
    fn test_resolve_not_accepted() {
        let sink = DiscordSink::new(
            Arc::new(ScriptedTransport::new()),
            URL.to_string(),
            Duration::from_secs(10),
        );
        assert!(sink.accepts(AlertAction::Trigger));
        assert!(!sink.accepts(AlertAction::Resolve));
    }
}
