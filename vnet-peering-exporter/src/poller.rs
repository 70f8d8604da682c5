//! Poll loop
//!
//! One cycle = list every page for the target, classify each record, publish it.
//! Cycles repeat with a fixed sleep between the end of one cycle and the start
//! of the next. A page error ends the cycle early and is only logged; the next
//! tick is the retry.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::classifier::classify;
use crate::error::CycleError;
use crate::lister::PeeringLister;
use crate::metrics::{CycleOutcome, PeeringMetrics};
use crate::models::PeeringTarget;

/// Progress of one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: usize,
    pub peerings: usize,
}

pub struct Poller {
    lister: Arc<dyn PeeringLister>,
    metrics: Arc<PeeringMetrics>,
    target: PeeringTarget,
    interval: Duration,
}

impl Poller {
    pub fn new(
        lister: Arc<dyn PeeringLister>,
        metrics: Arc<PeeringMetrics>,
        target: PeeringTarget,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            metrics,
            target,
            interval,
        }
    }

    pub fn target(&self) -> &PeeringTarget {
        &self.target
    }

    /// Fetch, classify and publish once. Records of pages before a failing
    /// page stay published.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();
        let mut pages = self.lister.list_peerings(&self.target);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CycleError::Cancelled(report)),
                next = pages.next() => next,
            };

            let Some(page) = next else { break };
            let page = page.map_err(|source| CycleError::Page {
                completed: report,
                source,
            })?;

            report.pages += 1;
            for record in &page {
                let observation = classify(record);
                self.metrics.publish(record, &observation);
                report.peerings += 1;
            }
        }

        Ok(report)
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            vnet = %self.target,
            interval_secs = self.interval.as_secs(),
            "starting peering poll loop"
        );

        loop {
            match self.run_cycle(&cancel).await {
                Ok(report) => {
                    self.metrics.record_cycle(CycleOutcome::Success);
                    info!(
                        pages = report.pages,
                        peerings = report.peerings,
                        "poll cycle complete"
                    );
                }
                Err(CycleError::Cancelled(_)) => break,
                Err(e) => {
                    self.metrics.record_cycle(CycleOutcome::Error);
                    error!(vnet = %self.target, "Error listing peerings: {e}");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("peering poll loop stopped");
    }
}
