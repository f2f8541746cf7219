//! File-backed vote store.
//!
//! Data model (pretty-printed JSON, one document):
//!   { "<chain name>": [ Vote, Vote, ... ], ... }
//!
//! The whole document is loaded at the start of every cycle and rewritten
//! at each checkpoint. Writes go to a sibling `.tmp` file which is then
//! renamed over the real one, so a crash mid-write never truncates it.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vote store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vote store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize votes: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A tracked governance proposal. Fields are fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub vote_id: String,
    pub title: String,
    /// Upstream timestamps, stored verbatim.
    pub start_date: String,
    pub end_date: String,
    pub status: String,
}

impl Vote {
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.end_date)
    }

    /// `None` when `end_date` is not a timestamp we understand.
    pub fn is_expired(&self, now: DateTime<Utc>) -> Option<bool> {
        self.end_time().map(|end| now >= end)
    }
}

/// Parse an upstream ISO-8601 timestamp. Cosmos APIs emit RFC 3339 with
/// up to nanosecond precision; a zone-less form is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// In-memory view of the store: chain name → ordered votes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteSnapshot {
    chains: BTreeMap<String, Vec<Vote>>,
}

impl VoteSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain_names(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn votes(&self, chain: &str) -> &[Vote] {
        self.chains.get(chain).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, chain: &str, vote_id: &str) -> bool {
        self.votes(chain).iter().any(|v| v.vote_id == vote_id)
    }

    /// Append a vote to a chain's list. The caller is responsible for
    /// de-duplicating by `vote_id` first.
    pub fn push(&mut self, chain: &str, vote: Vote) {
        self.chains.entry(chain.to_string()).or_default().push(vote);
    }

    /// Remove and return every vote of `chain` matching `pred`, keeping
    /// the order of the rest.
    pub fn take_where<F>(&mut self, chain: &str, mut pred: F) -> Vec<Vote>
    where
        F: FnMut(&Vote) -> bool,
    {
        let Some(votes) = self.chains.get_mut(chain) else {
            return Vec::new();
        };
        let (taken, kept): (Vec<Vote>, Vec<Vote>) =
            std::mem::take(votes).into_iter().partition(|v| pred(v));
        *votes = kept;
        taken
    }

    pub fn total(&self) -> usize {
        self.chains.values().map(Vec::len).sum()
    }
}

/// Durable home of the vote snapshot.
#[derive(Debug, Clone)]
pub struct VoteStore {
    path: PathBuf,
}

impl VoteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot. A missing file is an empty store; anything else
    /// that goes wrong is returned to the caller.
    pub fn load(&self) -> Result<VoteSnapshot, StoreError> {
        info!(path = %self.path.display(), "loading votes");
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "vote store not found, starting empty");
                return Ok(VoteSnapshot::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let snapshot: VoteSnapshot =
            serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        debug!(votes = snapshot.total(), "votes loaded");
        Ok(snapshot)
    }

    /// Atomically replace the store with `snapshot`.
    pub fn save(&self, snapshot: &VoteSnapshot) -> Result<(), StoreError> {
        info!(path = %self.path.display(), votes = snapshot.total(), "saving votes");
        let json = serde_json::to_string_pretty(snapshot)?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
            file.write_all(json.as_bytes()).map_err(io_err)?;
            file.write_all(b"\n").map_err(io_err)?;
            file.sync_all().map_err(io_err)?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "votes.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn vote(id: &str, end: &str) -> Vote {
        Vote {
            vote_id: id.to_string(),
            title: format!("Proposal {}", id),
            start_date: "2024-01-01T00:00:00Z".to_string(),
            end_date: end.to_string(),
            status: "PROPOSAL_STATUS_VOTING_PERIOD".to_string(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = VoteStore::new(dir.path().join("votes.json"));
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.total(), 0);
    }

    #[test]
    fn test_save_and_load_preserves_order() {
        let dir = tempdir().unwrap();
        let store = VoteStore::new(dir.path().join("nested").join("votes.json"));

        let mut snapshot = VoteSnapshot::new();
        snapshot.push("osmosis", vote("9", "2024-02-01T00:00:00Z"));
        snapshot.push("osmosis", vote("3", "2024-02-02T00:00:00Z"));
        snapshot.push("cosmoshub", vote("880", "2024-02-03T00:00:00.123456789Z"));

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, snapshot);
        let ids: Vec<&str> = loaded
            .votes("osmosis")
            .iter()
            .map(|v| v.vote_id.as_str())
            .collect();
        assert_eq!(ids, vec!["9", "3"]);
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn test_file_layout_is_chain_map() {
        let dir = tempdir().unwrap();
        let store = VoteStore::new(dir.path().join("votes.json"));
        let mut snapshot = VoteSnapshot::new();
        snapshot.push("juno", vote("1", "2024-02-01T00:00:00Z"));
        store.save(&snapshot).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["juno"][0]["vote_id"], "1");
        assert_eq!(raw["juno"][0]["end_date"], "2024-02-01T00:00:00Z");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("votes.json");
        fs::write(&path, "{ not json").unwrap();
        let store = VoteStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_take_where() {
        let mut snapshot = VoteSnapshot::new();
        snapshot.push("juno", vote("1", "a"));
        snapshot.push("juno", vote("2", "b"));
        snapshot.push("juno", vote("3", "c"));

        let taken = snapshot.take_where("juno", |v| v.vote_id == "2");
        assert_eq!(taken.len(), 1);
        assert_eq!(snapshot.votes("juno").len(), 2);
        assert!(snapshot.contains("juno", "3"));
        assert!(!snapshot.contains("juno", "2"));
        assert!(snapshot.take_where("missing", |_| true).is_empty());
    }

    #[test]
    fn test_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(vote("1", "2024-03-01T12:00:00Z").is_expired(now), Some(true));
        assert_eq!(
            vote("2", "2024-03-01T12:00:00.000000001Z").is_expired(now),
            Some(false)
        );
        assert_eq!(vote("3", "2024-02-29T00:00:00").is_expired(now), Some(true));
        assert_eq!(vote("4", "soon").is_expired(now), None);
    }
}
