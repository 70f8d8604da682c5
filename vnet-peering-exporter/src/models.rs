use crate::error::ConfigError;

/// One peering as returned by the provider, stamped with the target it was listed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringRecord {
    pub name: String,
    pub resource_group: String,
    pub vnet_name: String,
    pub peering_state: String,
    pub sync_level: Option<String>,
}

/// Numeric signals derived from a [`PeeringRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct PeeringObservation {
    /// 1 when connected, 0 otherwise
    pub connection_flag: f64,
    /// 1 fully in sync, 0 local not in sync, -1 anything else
    pub sync_score: f64,
    /// Never empty, "Unknown" when the provider omits the sync level
    pub sync_status: String,
}

/// The (resource group, virtual network) pair the exporter watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeeringTarget {
    resource_group: String,
    vnet_name: String,
}

impl PeeringTarget {
    pub fn new(
        resource_group: impl Into<String>,
        vnet_name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let resource_group = resource_group.into();
        let vnet_name = vnet_name.into();
        if resource_group.trim().is_empty() || vnet_name.trim().is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        Ok(Self { resource_group, vnet_name })
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn vnet_name(&self) -> &str {
        &self.vnet_name
    }
}

impl std::fmt::Display for PeeringTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.vnet_name)
    }
}
