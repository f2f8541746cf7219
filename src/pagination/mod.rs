//! Walks a chain's paginated proposal listing.
//!
//! Cosmos gov endpoints page with `pagination.limit` / `pagination.key`
//! query parameters and answer with:
//!
//!   { "proposals": [...], "pagination": { "next_key": "<b64>" | null, ... } }
//!
//! The pager issues one request at a time, starting without a key, and
//! follows `next_key` until it is null. Any failure ends the walk for this
//! cycle; the next cycle starts again from the first page.

use crate::config::ChainConfig;
use crate::http::{HttpTransport, TransportError};
use crate::metrics::{ApiMetrics, EndpointLabels, RequestStatus};
use futures::stream::{self, Stream};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a walk ended early.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("upstream returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("upstream reported an error: {body}")]
    Upstream { body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct PagerSettings {
    pub limit: u32,
    pub max_pages: u32,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
enum Cursor {
    Start,
    Key(String),
    Done,
}

/// One decoded page.
#[derive(Debug)]
struct Page {
    proposals: Vec<Value>,
    next_key: Option<String>,
}

pub struct ProposalPager<'a> {
    transport: &'a dyn HttpTransport,
    metrics: &'a ApiMetrics,
    chain_name: &'a str,
    chain: &'a ChainConfig,
    settings: PagerSettings,
    cursor: Cursor,
    pages_fetched: u32,
}

impl<'a> ProposalPager<'a> {
    pub fn new(
        transport: &'a dyn HttpTransport,
        metrics: &'a ApiMetrics,
        chain_name: &'a str,
        chain: &'a ChainConfig,
        settings: PagerSettings,
    ) -> Self {
        Self {
            transport,
            metrics,
            chain_name,
            chain,
            settings,
            cursor: Cursor::Start,
            pages_fetched: 0,
        }
    }

    fn labels(&self) -> EndpointLabels<'a> {
        EndpointLabels {
            chain: self.chain_name,
            network: &self.chain.network,
            api_endpoint: &self.chain.api_endpoint,
        }
    }

    /// Fetch the next page.
    ///
    /// `Some(Ok(records))` for each page, a single `Some(Err(_))` when the
    /// walk is cut short, and `None` once it is over.
    pub async fn next_page(&mut self) -> Option<Result<Vec<Value>, FetchError>> {
        let key = match &self.cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Key(k) => Some(k.clone()),
        };

        if self.pages_fetched >= self.settings.max_pages {
            warn!(
                chain = self.chain_name,
                pages = self.pages_fetched,
                "hit safety limit on proposal pagination"
            );
            self.cursor = Cursor::Done;
            return None;
        }

        let mut query = Vec::with_capacity(2);
        if let Some(ref k) = key {
            query.push(("pagination.key".to_string(), k.clone()));
        }
        query.push((
            "pagination.limit".to_string(),
            self.settings.limit.to_string(),
        ));

        self.pages_fetched += 1;
        match self.fetch(&query).await {
            Ok(page) => {
                self.metrics
                    .record_request(self.labels(), RequestStatus::Success);
                debug!(
                    chain = self.chain_name,
                    page = self.pages_fetched,
                    proposals = page.proposals.len(),
                    next_key = ?page.next_key,
                    "fetched proposals page"
                );

                self.cursor = match page.next_key {
                    Some(next) if Some(&next) == key.as_ref() => {
                        warn!(
                            chain = self.chain_name,
                            next_key = %next,
                            "upstream repeated the same pagination key, stopping"
                        );
                        Cursor::Done
                    }
                    Some(next) => Cursor::Key(next),
                    None => Cursor::Done,
                };
                Some(Ok(page.proposals))
            }
            Err(e) => {
                self.metrics
                    .record_request(self.labels(), RequestStatus::Failed);
                match &e {
                    FetchError::Transport(_) => error!(
                        chain = self.chain_name,
                        endpoint = %self.chain.api_endpoint,
                        error = %e,
                        details = ?e,
                        "failed to fetch vote proposals"
                    ),
                    _ => error!(
                        chain = self.chain_name,
                        endpoint = %self.chain.api_endpoint,
                        error = %e,
                        "proposal listing returned an error"
                    ),
                }
                self.cursor = Cursor::Done;
                Some(Err(e))
            }
        }
    }

    async fn fetch(&self, query: &[(String, String)]) -> Result<Page, FetchError> {
        let resp = self
            .transport
            .get(&self.chain.api_endpoint, query, self.settings.timeout)
            .await?;

        if resp.status != 200 {
            return Err(FetchError::HttpStatus {
                status: resp.status,
                body: resp.body,
            });
        }

        parse_page(&resp.body)
    }

    /// Consume the pager as a stream of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<Value>, FetchError>> + 'a {
        stream::unfold(self, |mut pager| async move {
            pager.next_page().await.map(|item| (item, pager))
        })
    }
}

fn parse_page(body: &str) -> Result<Page, FetchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Malformed(format!("invalid JSON body: {}", e)))?;
    let obj = json
        .as_object()
        .ok_or_else(|| FetchError::Malformed("response body is not an object".to_string()))?;

    if obj.is_empty() || obj.contains_key("code") {
        return Err(FetchError::Upstream {
            body: body.to_string(),
        });
    }

    let proposals = match obj.get("proposals") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(FetchError::Malformed(
                "`proposals` is not an array".to_string(),
            ))
        }
    };

    let next_key = json
        .pointer("/pagination/next_key")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    Ok(Page {
        proposals,
        next_key,
    })
}
