//! Cycle driver: run one reconciliation pass, wait an interval, repeat.
//!
//! Wall-clock time and the inter-cycle wait are both behind traits so the
//! loop can be driven in tests without real sleeps.

use crate::reconciler::{CycleReport, Reconciler};
use crate::store::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Waits between cycles.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self);
}

pub struct IntervalTicker {
    period: Duration,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn from_minutes(minutes: u64) -> Self {
        Self::new(Duration::from_secs(minutes.saturating_mul(60)))
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        tokio::time::sleep(self.period).await;
    }
}

pub struct CycleScheduler<T: Ticker> {
    reconciler: Reconciler,
    ticker: T,
}

impl<T: Ticker> CycleScheduler<T> {
    pub fn new(reconciler: Reconciler, ticker: T) -> Self {
        Self { reconciler, ticker }
    }

    pub async fn run_once(&self) -> Result<CycleReport, StoreError> {
        self.reconciler.run_cycle().await
    }

    /// Loop until `shutdown` flips to true. A running cycle is always
    /// finished; only the wait between cycles is cut short.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<u64, StoreError> {
        let mut cycles = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.reconciler.run_cycle().await?;
            cycles += 1;

            debug!(cycle = cycles, "waiting for next cycle");
            tokio::select! {
                _ = self.ticker.tick() => {}
                changed = shutdown.changed() => {
                    // A dropped sender also means stop.
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(cycles = cycles, "scheduler stopped");
        Ok(cycles)
    }
}
