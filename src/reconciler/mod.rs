//! Merges upstream proposals into the vote store and decides which alerts
//! to send.
//!
//! One cycle:
//!   1. load the store
//!   2. expiry pass over every stored chain: resolve and drop ended votes
//!   3. checkpoint save
//!   4. fetch pass per configured chain: track and announce new votes
//!   5. final save
//!
//! Everything below the store is best effort. A failing chain, a bad
//! record or an unreachable sink is logged and the cycle moves on; only
//! store I/O aborts a cycle.

use crate::alert::{AlertAction, AlertDispatcher, VoteAlert};
use crate::config::{ChainConfig, Config};
use crate::http::HttpTransport;
use crate::metrics::ApiMetrics;
use crate::pagination::{PagerSettings, ProposalPager};
use crate::proposal::{self, NormalizedProposal};
use crate::scheduler::Clock;
use crate::store::{StoreError, Vote, VoteSnapshot, VoteStore};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Counts for one cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Votes removed because their voting period ended.
    pub expired: usize,
    /// Expired votes for which a resolve alert was dispatched.
    pub resolved: usize,
    /// Newly tracked votes (each announced once).
    pub opened: usize,
    /// Proposal records that could not be normalized.
    pub record_errors: usize,
    /// Chains whose listing could not be fully fetched.
    pub failed_chains: Vec<String>,
    /// Stored chains that are no longer configured.
    pub unconfigured_chains: Vec<String>,
}

pub struct Reconciler {
    config: Config,
    store: VoteStore,
    transport: Arc<dyn HttpTransport>,
    dispatcher: AlertDispatcher,
    metrics: ApiMetrics,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(
        config: Config,
        store: VoteStore,
        transport: Arc<dyn HttpTransport>,
        dispatcher: AlertDispatcher,
        metrics: ApiMetrics,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            dispatcher,
            metrics,
            clock,
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let mut snapshot = self.store.load()?;
        let mut report = CycleReport::default();

        self.expire(&mut snapshot, &mut report).await;
        self.store.save(&snapshot)?;

        for (name, chain) in &self.config.chains {
            let span = info_span!("chain", chain = %name, network = %chain.network);
            self.fetch_chain(name, chain, &mut snapshot, &mut report)
                .instrument(span)
                .await;
        }
        self.store.save(&snapshot)?;

        info!(
            expired = report.expired,
            resolved = report.resolved,
            opened = report.opened,
            record_errors = report.record_errors,
            failed_chains = ?report.failed_chains,
            unconfigured_chains = ?report.unconfigured_chains,
            tracked = snapshot.total(),
            "cycle complete"
        );
        Ok(report)
    }

    async fn expire(&self, snapshot: &mut VoteSnapshot, report: &mut CycleReport) {
        let now = self.clock.now();

        for chain_name in snapshot.chain_names() {
            for vote in snapshot.votes(&chain_name) {
                if vote.end_time().is_none() {
                    warn!(
                        chain = %chain_name,
                        vote_id = %vote.vote_id,
                        end_date = %vote.end_date,
                        "stored vote has an unreadable end date, keeping it"
                    );
                }
            }

            let chain = self.config.chains.get(&chain_name);
            let expired = snapshot.take_where(&chain_name, |v| v.is_expired(now) == Some(true));
            report.expired += expired.len();

            let Some(chain) = chain else {
                warn!(
                    chain = %chain_name,
                    pruned = expired.len(),
                    "chain is no longer configured, skipping alerts for its stored votes"
                );
                report.unconfigured_chains.push(chain_name.clone());
                continue;
            };

            for vote in &expired {
                info!(
                    chain = %chain_name,
                    vote_id = %vote.vote_id,
                    end_date = %vote.end_date,
                    "vote ended"
                );
                let alert = vote_alert(AlertAction::Resolve, &chain_name, chain, vote);
                self.dispatcher.dispatch(&alert).await;
                report.resolved += 1;
            }
        }
    }

    async fn fetch_chain(
        &self,
        name: &str,
        chain: &ChainConfig,
        snapshot: &mut VoteSnapshot,
        report: &mut CycleReport,
    ) {
        let app = &self.config.app;
        let settings = PagerSettings {
            limit: chain.page_limit(app.default_pagination_limit),
            max_pages: app.max_pages,
            timeout: Duration::from_secs(app.request_timeout_secs),
        };
        debug!(endpoint = %chain.api_endpoint, limit = settings.limit, "fetching proposals");

        let pager = ProposalPager::new(
            self.transport.as_ref(),
            &self.metrics,
            name,
            chain,
            settings,
        );
        let pages = pager.into_stream();
        futures::pin_mut!(pages);

        while let Some(page) = pages.next().await {
            let records = match page {
                Ok(records) => records,
                Err(_) => {
                    // Already logged by the pager.
                    report.failed_chains.push(name.to_string());
                    break;
                }
            };

            for record in records {
                match proposal::normalize(record) {
                    Ok(Some(candidate)) => {
                        self.track(name, chain, candidate, snapshot, report).await
                    }
                    Ok(None) => debug!("proposal has no voting end time, skipping"),
                    Err(e) => {
                        report.record_errors += 1;
                        error!(error = %e, "failed to process proposal record");
                    }
                }
            }
        }
    }

    async fn track(
        &self,
        name: &str,
        chain: &ChainConfig,
        candidate: NormalizedProposal,
        snapshot: &mut VoteSnapshot,
        report: &mut CycleReport,
    ) {
        let vote = candidate.vote;
        if has_ended(&vote, self.clock.now()) {
            debug!(vote_id = %vote.vote_id, "vote already ended, skipping");
            return;
        }
        if snapshot.contains(name, &vote.vote_id) {
            debug!(vote_id = %vote.vote_id, "vote already tracked");
            return;
        }

        info!(
            vote_id = %vote.vote_id,
            title = %vote.title,
            end_date = %vote.end_date,
            "new vote"
        );
        if candidate.software_upgrade {
            info!(vote_id = %vote.vote_id, "upgrade vote detected");
        }

        let alert = vote_alert(AlertAction::Trigger, name, chain, &vote);
        snapshot.push(name, vote);
        report.opened += 1;
        self.dispatcher.dispatch(&alert).await;
    }
}

fn has_ended(vote: &Vote, now: DateTime<Utc>) -> bool {
    vote.is_expired(now).unwrap_or(false)
}

fn vote_alert(action: AlertAction, name: &str, chain: &ChainConfig, vote: &Vote) -> VoteAlert {
    VoteAlert {
        action,
        chain: name.to_string(),
        network: chain.network.clone(),
        vote_id: vote.vote_id.clone(),
        title: vote.title.clone(),
        explorer_link: chain.explorer_link(&vote.vote_id),
    }
}
