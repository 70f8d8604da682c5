//! Exporter configuration
//!
//! Every setting is a command-line flag with an environment fallback (the binary
//! loads a `.env` file before parsing). Missing values parse as empty strings so
//! that validation, not the parser, decides what is fatal.

use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::lister::azure::{DEFAULT_ARM_ENDPOINT, DEFAULT_LOGIN_ENDPOINT};
use crate::lister::{ArmPeeringLister, ClientSecretCredential};
use crate::metrics::SyncSeriesPolicy;
use crate::models::PeeringTarget;

pub const DEFAULT_INTERVAL_SECS: u64 = 300;

#[derive(Clone, Parser)]
#[command(
    name = "vnet-peering-exporter",
    version,
    about = "Exports Azure VNet peering state as Prometheus metrics"
)]
pub struct ExporterConfig {
    /// Azure Resource Group name
    #[arg(long, env = "AZURE_RESOURCE_GROUP", default_value = "")]
    pub resource_group: String,

    /// Azure Virtual Network name
    #[arg(long, env = "AZURE_VNET_NAME", default_value = "")]
    pub vnet_name: String,

    /// Interval in seconds between checks
    #[arg(
        long = "interval",
        env = "PEERING_POLL_INTERVAL_SECS",
        default_value_t = DEFAULT_INTERVAL_SECS
    )]
    pub interval_secs: u64,

    /// Azure Tenant ID
    #[arg(long, env = "AZURE_TENANT_ID", default_value = "")]
    pub tenant_id: String,

    /// Azure Client ID
    #[arg(long, env = "AZURE_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// Azure Client Secret
    #[arg(long, env = "AZURE_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Azure Subscription ID
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID", default_value = "")]
    pub subscription_id: String,

    /// Azure Resource Manager endpoint (sovereign clouds); tokens are requested for its audience
    #[arg(long, env = "AZURE_ARM_ENDPOINT", default_value = DEFAULT_ARM_ENDPOINT)]
    pub arm_endpoint: String,

    /// Entra ID login endpoint (sovereign clouds)
    #[arg(long, env = "AZURE_LOGIN_ENDPOINT", default_value = DEFAULT_LOGIN_ENDPOINT)]
    pub login_endpoint: String,

    /// Drop the previous sync level series when a peering's sync status changes
    #[arg(long, env = "PEERING_REPLACE_STALE_SYNC_SERIES")]
    pub replace_stale_sync_series: bool,
}

impl std::fmt::Debug for ExporterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterConfig")
            .field("resource_group", &self.resource_group)
            .field("vnet_name", &self.vnet_name)
            .field("interval_secs", &self.interval_secs)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("arm_endpoint", &self.arm_endpoint)
            .field("login_endpoint", &self.login_endpoint)
            .field("replace_stale_sync_series", &self.replace_stale_sync_series)
            .finish()
    }
}

impl ExporterConfig {
    pub fn target(&self) -> Result<PeeringTarget, ConfigError> {
        PeeringTarget::new(&self.resource_group, &self.vnet_name)
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_secs));
        }
        Ok(Duration::from_secs(self.interval_secs))
    }

    pub fn sync_policy(&self) -> SyncSeriesPolicy {
        if self.replace_stale_sync_series {
            SyncSeriesPolicy::Replace
        } else {
            SyncSeriesPolicy::Retain
        }
    }

    pub fn build_lister(&self) -> Result<ArmPeeringLister, ConfigError> {
        let credential =
            ClientSecretCredential::new(&self.tenant_id, &self.client_id, &self.client_secret)?
                .with_login_endpoint(&self.login_endpoint)?;
        ArmPeeringLister::new(&self.subscription_id, credential)?
            .with_arm_endpoint(&self.arm_endpoint)
    }
}
