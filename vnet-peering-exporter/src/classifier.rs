//! Peering classifier
//!
//! Turns a raw [`PeeringRecord`] into the numbers published as gauges.
//! Total over its input: unexpected values fall back to documented defaults.

use crate::models::{PeeringObservation, PeeringRecord};

pub const CONNECTED: &str = "Connected";
pub const FULLY_IN_SYNC: &str = "FullyInSync";
pub const LOCAL_NOT_IN_SYNC: &str = "LocalNotInSync";
pub const UNKNOWN_SYNC_STATUS: &str = "Unknown";

pub fn classify(record: &PeeringRecord) -> PeeringObservation {
    let (sync_score, sync_status) = sync_level(record.sync_level.as_deref());
    PeeringObservation {
        connection_flag: connection_flag(&record.peering_state),
        sync_score,
        sync_status,
    }
}

/// Exact, case-sensitive match on "Connected".
pub fn connection_flag(peering_state: &str) -> f64 {
    if peering_state == CONNECTED {
        1.0
    } else {
        0.0
    }
}

/// Maps the provider sync level to (score, label).
pub fn sync_level(sync_level: Option<&str>) -> (f64, String) {
    match sync_level {
        Some(FULLY_IN_SYNC) => (1.0, FULLY_IN_SYNC.to_string()),
        Some(LOCAL_NOT_IN_SYNC) => (0.0, LOCAL_NOT_IN_SYNC.to_string()),
        // blank counts as absent
        Some(other) if !other.is_empty() => (-1.0, other.to_string()),
        _ => (-1.0, UNKNOWN_SYNC_STATUS.to_string()),
    }
}
