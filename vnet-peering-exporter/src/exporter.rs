//! Exporter assembly
//!
//! Validates the configuration and wires lister, metrics, poller and HTTP
//! surface together. Every check happens at construction, so a bad setting
//! fails before anything is bound or fetched.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::http::{self, AppState};
use crate::lister::PeeringLister;
use crate::metrics::PeeringMetrics;
use crate::models::PeeringTarget;
use crate::poller::Poller;

pub struct Exporter {
    poller: Poller,
    metrics: Arc<PeeringMetrics>,
}

impl Exporter {
    /// Validate `config` and build the ARM lister it describes
    pub fn from_config(config: &ExporterConfig) -> Result<Self, ExporterError> {
        let target = config.target()?;
        let interval = config.interval()?;
        let lister = config.build_lister()?;
        Self::assemble(config, Arc::new(lister), target, interval)
    }

    /// Validate `config` but list peerings through `lister`
    pub fn with_lister(
        config: &ExporterConfig,
        lister: Arc<dyn PeeringLister>,
    ) -> Result<Self, ExporterError> {
        let target = config.target()?;
        let interval = config.interval()?;
        Self::assemble(config, lister, target, interval)
    }

    fn assemble(
        config: &ExporterConfig,
        lister: Arc<dyn PeeringLister>,
        target: PeeringTarget,
        interval: Duration,
    ) -> Result<Self, ExporterError> {
        let metrics = Arc::new(PeeringMetrics::new(config.sync_policy())?);

        info!(
            vnet = %target,
            interval_secs = interval.as_secs(),
            sync_policy = ?config.sync_policy(),
            arm_endpoint = %config.arm_endpoint,
            "exporter configured"
        );

        Ok(Self {
            poller: Poller::new(lister, Arc::clone(&metrics), target, interval),
            metrics,
        })
    }

    pub fn metrics(&self) -> Arc<PeeringMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn target(&self) -> &PeeringTarget {
        self.poller.target()
    }

    /// Serve `listener` and poll until `shutdown` fires or the server stops.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), ExporterError> {
        let Exporter { poller, metrics } = self;
        let app_state = AppState { metrics };
        let mut server = tokio::spawn(http::serve(listener, app_state, shutdown.clone()));

        let served = tokio::select! {
            _ = poller.run(shutdown.clone()) => {
                shutdown.cancel();
                server.await
            }
            served = &mut server => {
                shutdown.cancel();
                served
            }
        };

        served?
    }
}
