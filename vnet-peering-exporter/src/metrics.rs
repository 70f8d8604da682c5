//! Peering metrics surface
//!
//! Owns a private Prometheus registry with two labelled gauge families:
//! - `azure_vnet_peering_state` (connection flag)
//! - `azure_vnet_peering_sync_level` (sync score, labelled by sync status)
//!
//! plus a couple of exporter self-metrics. Gauges are updated by the poll loop
//! and gathered by scrapes concurrently; each sample is an atomic f64 so a
//! reader sees either the old or the new value of a series.

use std::collections::HashMap;

use parking_lot::Mutex;
use prometheus::proto::MetricType;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::ExporterError;
use crate::models::{PeeringObservation, PeeringRecord};

pub const PEERING_STATE: &str = "azure_vnet_peering_state";
pub const PEERING_SYNC_LEVEL: &str = "azure_vnet_peering_sync_level";
pub const CYCLES_TOTAL: &str = "azure_vnet_peering_exporter_cycles_total";
pub const LAST_SUCCESS: &str = "azure_vnet_peering_exporter_last_success_timestamp_seconds";

const PEERING_LABELS: [&str; 3] = ["resource_group", "vnet_name", "peering_name"];
const SYNC_LABELS: [&str; 4] = ["resource_group", "vnet_name", "peering_name", "sync_status"];

/// What to do with the previous sync-level series when a peering's sync status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncSeriesPolicy {
    /// Leave the previous label combination frozen at its last value.
    #[default]
    Retain,
    /// Remove the previous label combination once the new one is set.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Error,
}

impl CycleOutcome {
    pub fn as_label(self) -> &'static str {
        match self {
            CycleOutcome::Success => "success",
            CycleOutcome::Error => "error",
        }
    }
}

type PeeringKey = (String, String, String);

pub struct PeeringMetrics {
    registry: Registry,
    peering_state: GaugeVec,
    peering_sync_level: GaugeVec,
    cycles_total: IntCounterVec,
    last_success: Gauge,
    sync_policy: SyncSeriesPolicy,
    /// Current sync status per peering, only tracked under [`SyncSeriesPolicy::Replace`]
    sync_status: Mutex<HashMap<PeeringKey, String>>,
}

impl PeeringMetrics {
    /// Create the gauges and register them in a fresh registry
    pub fn new(sync_policy: SyncSeriesPolicy) -> Result<Self, ExporterError> {
        let registry = Registry::new();

        let peering_state = GaugeVec::new(
            Opts::new(PEERING_STATE, "State of Azure VNet peering."),
            &PEERING_LABELS,
        )?;
        registry.register(Box::new(peering_state.clone()))?;

        let peering_sync_level = GaugeVec::new(
            Opts::new(
                PEERING_SYNC_LEVEL,
                "Sync level of Azure VNet peering, indicating synchronization status.",
            ),
            &SYNC_LABELS,
        )?;
        registry.register(Box::new(peering_sync_level.clone()))?;

        let cycles_total = IntCounterVec::new(
            Opts::new(CYCLES_TOTAL, "Poll cycles run by the exporter, by result."),
            &["result"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let last_success = Gauge::new(
            LAST_SUCCESS,
            "Unix time of the last poll cycle that listed every page.",
        )?;
        registry.register(Box::new(last_success.clone()))?;

        Ok(Self {
            registry,
            peering_state,
            peering_sync_level,
            cycles_total,
            last_success,
            sync_policy,
            sync_status: Mutex::new(HashMap::new()),
        })
    }

    pub fn sync_policy(&self) -> SyncSeriesPolicy {
        self.sync_policy
    }

    /// Publish one classified peering. Last write wins per label tuple.
    pub fn publish(&self, record: &PeeringRecord, observation: &PeeringObservation) {
        let rg = record.resource_group.as_str();
        let vnet = record.vnet_name.as_str();
        let name = record.name.as_str();

        self.peering_state
            .with_label_values(&[rg, vnet, name])
            .set(observation.connection_flag);

        match self.sync_policy {
            SyncSeriesPolicy::Retain => {
                self.peering_sync_level
                    .with_label_values(&[rg, vnet, name, observation.sync_status.as_str()])
                    .set(observation.sync_score);
            }
            SyncSeriesPolicy::Replace => {
                let mut current = self.sync_status.lock();
                self.peering_sync_level
                    .with_label_values(&[rg, vnet, name, observation.sync_status.as_str()])
                    .set(observation.sync_score);

                let key = (rg.to_string(), vnet.to_string(), name.to_string());
                let previous = current.insert(key, observation.sync_status.clone());
                if let Some(previous) = previous.filter(|p| *p != observation.sync_status) {
                    debug!(
                        peering = name,
                        from = %previous,
                        to = %observation.sync_status,
                        "replacing sync level series"
                    );
                    // already gone is fine
                    let _ = self
                        .peering_sync_level
                        .remove_label_values(&[rg, vnet, name, previous.as_str()]);
                }
            }
        }
    }

    pub fn record_cycle(&self, outcome: CycleOutcome) {
        self.cycles_total.with_label_values(&[outcome.as_label()]).inc();
        if outcome == CycleOutcome::Success {
            self.last_success
                .set(OffsetDateTime::now_utc().unix_timestamp() as f64);
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every family in the Prometheus text exposition format
    pub fn export(&self) -> Result<String, ExporterError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Current value of the series of `family` whose labels are exactly `labels`.
    pub fn sample(&self, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.series(family)
            .into_iter()
            .find(|(series_labels, _)| {
                series_labels.len() == labels.len()
                    && labels
                        .iter()
                        .all(|(k, v)| series_labels.iter().any(|(sk, sv)| sk == k && sv == v))
            })
            .map(|(_, value)| value)
    }

    /// All series of one family as (labels, value)
    pub fn series(&self, family: &str) -> Vec<(Vec<(String, String)>, f64)> {
        self.registry
            .gather()
            .iter()
            .filter(|mf| mf.get_name() == family)
            .flat_map(|mf| {
                let kind = mf.get_field_type();
                mf.get_metric().iter().map(move |m| {
                    let labels = m
                        .get_label()
                        .iter()
                        .map(|l| (l.get_name().to_string(), l.get_value().to_string()))
                        .collect();
                    let value = match kind {
                        MetricType::COUNTER => m.get_counter().get_value(),
                        _ => m.get_gauge().get_value(),
                    };
                    (labels, value)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(name: &str) -> PeeringRecord {
        PeeringRecord {
            name: name.to_string(),
            resource_group: "rg".to_string(),
            vnet_name: "vnet".to_string(),
            peering_state: "Connected".to_string(),
            sync_level: None,
        }
    }

    fn observation(flag: f64, score: f64, status: &str) -> PeeringObservation {
        PeeringObservation {
            connection_flag: flag,
            sync_score: score,
            sync_status: status.to_string(),
        }
    }

    fn state(metrics: &PeeringMetrics, name: &str) -> Option<f64> {
        metrics.sample(
            PEERING_STATE,
            &[("resource_group", "rg"), ("vnet_name", "vnet"), ("peering_name", name)],
        )
    }

    fn sync(metrics: &PeeringMetrics, name: &str, status: &str) -> Option<f64> {
        metrics.sample(
            PEERING_SYNC_LEVEL,
            &[
                ("resource_group", "rg"),
                ("vnet_name", "vnet"),
                ("peering_name", name),
                ("sync_status", status),
            ],
        )
    }

    #[test]
    fn test_publish_sets_both_families() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap();
        metrics.publish(&record("peerA"), &observation(1.0, 1.0, "FullyInSync"));

        assert_eq!(state(&metrics, "peerA"), Some(1.0));
        assert_eq!(sync(&metrics, "peerA", "FullyInSync"), Some(1.0));
        assert_eq!(state(&metrics, "peerB"), None);
    }

    #[test]
    fn test_publish_is_idempotent() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap();
        let obs = observation(0.0, -1.0, "Unknown");

        metrics.publish(&record("peerB"), &obs);
        let first = metrics.export().unwrap();
        metrics.publish(&record("peerB"), &obs);
        let second = metrics.export().unwrap();

        assert_eq!(first, second);
        assert_eq!(metrics.series(PEERING_SYNC_LEVEL).len(), 1);
    }

    #[test]
    fn test_retain_keeps_previous_sync_series() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap();
        metrics.publish(&record("peerA"), &observation(1.0, 1.0, "FullyInSync"));
        metrics.publish(&record("peerA"), &observation(1.0, 0.0, "LocalNotInSync"));

        assert_eq!(sync(&metrics, "peerA", "FullyInSync"), Some(1.0));
        assert_eq!(sync(&metrics, "peerA", "LocalNotInSync"), Some(0.0));
    }

    #[test]
    fn test_replace_drops_previous_sync_series() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Replace).unwrap();
        metrics.publish(&record("peerA"), &observation(1.0, 1.0, "FullyInSync"));
        metrics.publish(&record("peerB"), &observation(1.0, 1.0, "FullyInSync"));
        metrics.publish(&record("peerA"), &observation(1.0, 0.0, "LocalNotInSync"));

        assert_eq!(sync(&metrics, "peerA", "FullyInSync"), None);
        assert_eq!(sync(&metrics, "peerA", "LocalNotInSync"), Some(0.0));
        assert_eq!(sync(&metrics, "peerB", "FullyInSync"), Some(1.0));
    }

    #[test]
    fn test_record_cycle() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap();
        metrics.record_cycle(CycleOutcome::Error);
        metrics.record_cycle(CycleOutcome::Success);
        metrics.record_cycle(CycleOutcome::Success);

        assert_eq!(metrics.sample(CYCLES_TOTAL, &[("result", "success")]), Some(2.0));
        assert_eq!(metrics.sample(CYCLES_TOTAL, &[("result", "error")]), Some(1.0));
        assert!(metrics.sample(LAST_SUCCESS, &[]).unwrap() > 0.0);
    }

    #[test]
    fn test_export_text_format() {
        let metrics = PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap();
        metrics.publish(&record("peerA"), &observation(1.0, 1.0, "FullyInSync"));

        let output = metrics.export().unwrap();
        assert!(output.contains("# TYPE azure_vnet_peering_state gauge"));
        let line = output
            .lines()
            .find(|l| l.starts_with("azure_vnet_peering_state{"))
            .unwrap();
        assert!(line.contains(r#"peering_name="peerA""#));
        assert!(line.ends_with(" 1"));
        assert!(output.contains(r#"sync_status="FullyInSync""#));
    }

    #[test]
    fn test_concurrent_reads_never_see_torn_values() {
        let metrics = Arc::new(PeeringMetrics::new(SyncSeriesPolicy::Retain).unwrap());
        metrics.publish(&record("peerA"), &observation(0.0, -1.0, "Unknown"));

        let writer = {
            let metrics = Arc::clone(&metrics);
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let flag = (i % 2) as f64;
                    metrics.publish(&record("peerA"), &observation(flag, -1.0, "Unknown"));
                }
            })
        };

        for _ in 0..200 {
            let value = state(&metrics, "peerA").unwrap();
            assert!(value == 0.0 || value == 1.0, "torn value {value}");
        }
        writer.join().unwrap();
    }
}
