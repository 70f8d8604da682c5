//! VNet peering exporter
//!
//! Polls Azure Resource Manager for the peerings of one virtual network and
//! publishes their state as Prometheus gauges:
//! - Poll loop: fetch every page, classify each peering, publish
//! - Metrics surface: injectable registry read concurrently by scrapes
//! - HTTP surface: `/metrics` and an unconditional `/health`

pub mod classifier;
pub mod config;
pub mod error;
pub mod exporter;
pub mod http;
pub mod lister;
pub mod metrics;
pub mod models;
pub mod poller;

pub use classifier::classify;
pub use config::ExporterConfig;
pub use error::{ConfigError, CycleError, ExporterError, ListError};
pub use exporter::Exporter;
pub use lister::{ArmPeeringLister, ClientSecretCredential, PageStream, PeeringLister, PeeringPage};
pub use metrics::{CycleOutcome, PeeringMetrics, SyncSeriesPolicy};
pub use models::{PeeringObservation, PeeringRecord, PeeringTarget};
pub use poller::{CycleReport, Poller};
