//! Proposal records from the Cosmos gov REST API, and their conversion
//! into tracked [`Vote`]s.
//!
//! Two upstream schema families exist:
//! - `v1`: `{ id, messages: [...], title?, submit_time, voting_end_time, status }`
//! - `v1beta1`: `{ proposal_id, content: { @type, title }, submit_time, voting_end_time, status }`
//!
//! A record is classified once by shape (a `messages` field means v1) and
//! each variant is then normalized by its own total function.

use crate::store::{parse_timestamp, Vote};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Prepended to the title of a v1 proposal that bundles several messages.
pub const MULTI_PROPOSAL_MARKER: &str = "Careful this has multiple proposal";
pub const NO_TITLE: &str = "No Title";

/// Quicksilver's reopen-channel message carries its title on the message
/// itself rather than in a nested `content`.
const REOPEN_CHANNEL_TYPE: &str = "interchainstaking.v1.MsgGovReopenChannel";

const SOFTWARE_UPGRADE_TYPES: [&str; 2] = [
    "/cosmos.upgrade.v1beta1.SoftwareUpgradeProposal",
    "/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade",
];

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("proposal record is not a JSON object")]
    NotAnObject,
    #[error("malformed {schema} proposal record: {source}")]
    Malformed {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("proposal {vote_id}: voting_end_time {raw:?} is not a timestamp")]
    BadTimestamp { vote_id: String, raw: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProposalContent {
    #[serde(rename = "@type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProposalMessage {
    #[serde(rename = "@type", default)]
    pub type_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<ProposalContent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Proposal {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub messages: Vec<ProposalMessage>,
    #[serde(default)]
    pub title: Option<String>,
    pub submit_time: String,
    #[serde(default)]
    pub voting_end_time: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct V1Beta1Proposal {
    #[serde(deserialize_with = "id_string")]
    pub proposal_id: String,
    #[serde(default)]
    pub content: Option<ProposalContent>,
    pub submit_time: String,
    #[serde(default)]
    pub voting_end_time: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub enum RawProposal {
    V1(V1Proposal),
    V1Beta1(V1Beta1Proposal),
}

/// A normalized proposal plus enrichment that is logged but not stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProposal {
    pub vote: Vote,
    pub software_upgrade: bool,
}

/// Upstream ids show up both as strings and as bare numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

fn non_empty(title: &Option<String>) -> Option<String> {
    title.as_ref().filter(|t| !t.trim().is_empty()).cloned()
}

impl V1Proposal {
    pub fn title(&self) -> String {
        let from_message = self.messages.first().and_then(|msg| {
            if msg.type_url.contains(REOPEN_CHANNEL_TYPE) {
                non_empty(&msg.title)
            } else {
                msg.content.as_ref().and_then(|c| non_empty(&c.title))
            }
        });
        let title = from_message
            .or_else(|| non_empty(&self.title))
            .unwrap_or_else(|| NO_TITLE.to_string());

        if self.messages.len() > 1 {
            format!("{}{}", MULTI_PROPOSAL_MARKER, title)
        } else {
            title
        }
    }

    /// Type URL of the first message, looking through legacy content wrappers.
    pub fn type_url(&self) -> Option<&str> {
        let msg = self.messages.first()?;
        let inner = msg
            .content
            .as_ref()
            .map(|c| c.type_url.as_str())
            .filter(|t| !t.is_empty());
        Some(inner.unwrap_or(msg.type_url.as_str()))
    }
}

impl V1Beta1Proposal {
    pub fn title(&self) -> String {
        self.content
            .as_ref()
            .and_then(|c| non_empty(&c.title))
            .unwrap_or_else(|| NO_TITLE.to_string())
    }

    pub fn type_url(&self) -> Option<&str> {
        self.content
            .as_ref()
            .map(|c| c.type_url.as_str())
            .filter(|t| !t.is_empty())
    }
}

impl RawProposal {
    /// Decode one record from a `proposals` page into its schema variant.
    pub fn classify(record: serde_json::Value) -> Result<Self, RecordError> {
        let is_v1 = record
            .as_object()
            .ok_or(RecordError::NotAnObject)?
            .contains_key("messages");

        if is_v1 {
            serde_json::from_value(record)
                .map(RawProposal::V1)
                .map_err(|source| RecordError::Malformed {
                    schema: "v1",
                    source,
                })
        } else {
            serde_json::from_value(record)
                .map(RawProposal::V1Beta1)
                .map_err(|source| RecordError::Malformed {
                    schema: "v1beta1",
                    source,
                })
        }
    }

    pub fn vote_id(&self) -> &str {
        match self {
            RawProposal::V1(p) => &p.id,
            RawProposal::V1Beta1(p) => &p.proposal_id,
        }
    }

    pub fn title(&self) -> String {
        match self {
            RawProposal::V1(p) => p.title(),
            RawProposal::V1Beta1(p) => p.title(),
        }
    }

    pub fn type_url(&self) -> Option<&str> {
        match self {
            RawProposal::V1(p) => p.type_url(),
            RawProposal::V1Beta1(p) => p.type_url(),
        }
    }

    pub fn is_software_upgrade(&self) -> bool {
        self.type_url()
            .map_or(false, |t| SOFTWARE_UPGRADE_TYPES.contains(&t))
    }

    fn fields(&self) -> (&str, Option<&str>, &str) {
        match self {
            RawProposal::V1(p) => (
                p.submit_time.as_str(),
                p.voting_end_time.as_deref(),
                p.status.as_str(),
            ),
            RawProposal::V1Beta1(p) => (
                p.submit_time.as_str(),
                p.voting_end_time.as_deref(),
                p.status.as_str(),
            ),
        }
    }

    /// Convert to a [`Vote`]. Proposals without a voting window yield
    /// `Ok(None)` and are never tracked.
    pub fn normalize(&self) -> Result<Option<NormalizedProposal>, RecordError> {
        let (submit_time, voting_end_time, status) = self.fields();
        let Some(end_date) = voting_end_time else {
            return Ok(None);
        };
        if parse_timestamp(end_date).is_none() {
            return Err(RecordError::BadTimestamp {
                vote_id: self.vote_id().to_string(),
                raw: end_date.to_string(),
            });
        }

        Ok(Some(NormalizedProposal {
            vote: Vote {
                vote_id: self.vote_id().to_string(),
                title: self.title(),
                start_date: submit_time.to_string(),
                end_date: end_date.to_string(),
                status: status.to_string(),
            },
            software_upgrade: self.is_software_upgrade(),
        }))
    }
}

/// Classify and normalize a raw record in one step.
pub fn normalize(record: serde_json::Value) -> Result<Option<NormalizedProposal>, RecordError> {
    RawProposal::classify(record)?.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v1_record(messages: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "12",
            "messages": messages,
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00.123456Z",
            "voting_end_time": "2024-05-15T10:00:00.123456Z",
        })
    }

    #[test]
    fn test_v1_title_from_message_content() {
        let record = v1_record(json!([{
            "@type": "/cosmos.gov.v1.MsgExecLegacyContent",
            "content": {
                "@type": "/cosmos.params.v1beta1.ParameterChangeProposal",
                "title": "Raise max validators"
            }
        }]));

        let normalized = normalize(record).unwrap().unwrap();
        assert_eq!(normalized.vote.vote_id, "12");
        assert_eq!(normalized.vote.title, "Raise max validators");
        assert_eq!(normalized.vote.start_date, "2024-05-01T10:00:00.123456Z");
        assert_eq!(normalized.vote.end_date, "2024-05-15T10:00:00.123456Z");
        assert_eq!(normalized.vote.status, "PROPOSAL_STATUS_VOTING_PERIOD");
        assert!(!normalized.software_upgrade);
    }

    #[test]
    fn test_v1_reopen_channel_uses_message_title() {
        let record = v1_record(json!([{
            "@type": "/quicksilver.interchainstaking.v1.MsgGovReopenChannel",
            "title": "Reopen ICA channel",
            "content": { "title": "ignored" }
        }]));

        let vote = normalize(record).unwrap().unwrap().vote;
        assert_eq!(vote.title, "Reopen ICA channel");
    }

    #[test]
    fn test_v1_multiple_messages_get_marker() {
        let record = v1_record(json!([
            { "@type": "/cosmos.gov.v1.MsgExecLegacyContent", "content": { "title": "First" } },
            { "@type": "/cosmos.bank.v1beta1.MsgSend" }
        ]));

        let vote = normalize(record).unwrap().unwrap().vote;
        assert!(vote.title.starts_with(MULTI_PROPOSAL_MARKER));
        assert_eq!(vote.title, format!("{}First", MULTI_PROPOSAL_MARKER));
    }

    #[test]
    fn test_v1_falls_back_to_top_level_title() {
        let mut record = v1_record(json!([]));
        record["title"] = json!("Community pool spend");
        let vote = normalize(record).unwrap().unwrap().vote;
        assert_eq!(vote.title, "Community pool spend");

        let record = v1_record(json!([{ "@type": "/cosmos.bank.v1beta1.MsgSend" }]));
        let vote = normalize(record).unwrap().unwrap().vote;
        assert_eq!(vote.title, NO_TITLE);
    }

    #[test]
    fn test_v1beta1_record() {
        let record = json!({
            "proposal_id": "401",
            "content": {
                "@type": "/cosmos.gov.v1beta1.TextProposal",
                "title": "Signal proposal",
                "description": "..."
            },
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });

        let vote = normalize(record).unwrap().unwrap().vote;
        assert_eq!(vote.vote_id, "401");
        assert_eq!(vote.title, "Signal proposal");
    }

    #[test]
    fn test_v1beta1_without_title() {
        let record = json!({
            "proposal_id": 77,
            "content": { "@type": "/cosmos.gov.v1beta1.TextProposal" },
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });

        let vote = normalize(record).unwrap().unwrap().vote;
        assert_eq!(vote.vote_id, "77");
        assert_eq!(vote.title, NO_TITLE);
    }

    #[test]
    fn test_schemas_normalize_equivalently() {
        let v1 = json!({
            "id": "5",
            "messages": [{
                "@type": "/cosmos.gov.v1.MsgExecLegacyContent",
                "content": { "@type": "/cosmos.gov.v1beta1.TextProposal", "title": "Same" }
            }],
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });
        let v1beta1 = json!({
            "proposal_id": "5",
            "content": { "@type": "/cosmos.gov.v1beta1.TextProposal", "title": "Same" },
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });

        let a = normalize(v1).unwrap().unwrap();
        let b = normalize(v1beta1).unwrap().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_null_voting_end_time_is_skipped() {
        let mut record = v1_record(json!([]));
        record["voting_end_time"] = serde_json::Value::Null;
        assert!(normalize(record).unwrap().is_none());

        let record = json!({
            "proposal_id": "3",
            "content": { "title": "Deposit period" },
            "status": "PROPOSAL_STATUS_DEPOSIT_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z"
        });
        assert!(normalize(record).unwrap().is_none());
    }

    #[test]
    fn test_malformed_records() {
        let missing_status = json!({
            "id": "1",
            "messages": [],
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });
        assert!(matches!(
            normalize(missing_status),
            Err(RecordError::Malformed { schema: "v1", .. })
        ));

        assert!(matches!(
            normalize(json!(["not", "an", "object"])),
            Err(RecordError::NotAnObject)
        ));

        let bad_end = json!({
            "proposal_id": "9",
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "next tuesday"
        });
        assert!(matches!(
            normalize(bad_end),
            Err(RecordError::BadTimestamp { .. })
        ));
    }

    #[test]
    fn test_software_upgrade_detection() {
        let v1 = v1_record(json!([{
            "@type": "/cosmos.upgrade.v1beta1.MsgSoftwareUpgrade",
            "authority": "cosmos10d07y265gmmuvt4z0w9aw880jnsr700j6zn9kn",
            "plan": { "name": "v15", "height": "1000" }
        }]));
        assert!(normalize(v1).unwrap().unwrap().software_upgrade);

        let v1beta1 = json!({
            "proposal_id": "10",
            "content": {
                "@type": "/cosmos.upgrade.v1beta1.SoftwareUpgradeProposal",
                "title": "v15 upgrade"
            },
            "status": "PROPOSAL_STATUS_VOTING_PERIOD",
            "submit_time": "2024-05-01T10:00:00Z",
            "voting_end_time": "2024-05-15T10:00:00Z"
        });
        assert!(normalize(v1beta1).unwrap().unwrap().software_upgrade);
    }
}
