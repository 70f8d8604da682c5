//! Azure Resource Manager peering lister
//!
//! Authenticates with a client secret (OAuth2 client-credentials grant) and walks
//! `virtualNetworkPeerings` pages by following `nextLink`.

use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::{PageStream, PeeringLister, PeeringPage};
use crate::error::{ConfigError, ListError};
use crate::models::{PeeringRecord, PeeringTarget};

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";
pub const API_VERSION: &str = "2023-09-01";
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Clone)]
struct CachedToken {
    scope: String,
    value: String,
    expires_at: Instant,
}

/// Client-secret credential for an Entra ID application.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    login_endpoint: Url,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("login_endpoint", &self.login_endpoint.as_str())
            .finish()
    }
}

impl ClientSecretCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let tenant_id = tenant_id.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if !valid_tenant_id(&tenant_id) {
            return Err(ConfigError::InvalidCredential(format!(
                "tenant id {tenant_id:?} must be non-empty and contain only alphanumerics, '-' and '.'"
            )));
        }
        if client_id.trim().is_empty() {
            return Err(ConfigError::InvalidCredential("client id is empty".into()));
        }
        if client_secret.is_empty() {
            return Err(ConfigError::InvalidCredential("client secret is empty".into()));
        }

        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
            login_endpoint: parse_endpoint(DEFAULT_LOGIN_ENDPOINT)?,
            cached: Mutex::new(None),
        })
    }

    pub fn with_login_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.login_endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    fn token_url(&self) -> Result<Url, ListError> {
        let mut url = self.login_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ListError::InvalidLink(self.login_endpoint.to_string()))?
            .pop_if_empty()
            .extend([self.tenant_id.as_str(), "oauth2", "v2.0", "token"]);
        Ok(url)
    }

    /// Bearer token for `scope`, cached until shortly before it expires
    pub async fn token(&self, http: &reqwest::Client, scope: &str) -> Result<String, ListError> {
        let cached = self
            .cached
            .lock()
            .clone()
            .filter(|token| token.scope == scope && token.expires_at > Instant::now());
        if let Some(token) = cached {
            return Ok(token.value);
        }

        debug!(tenant = %self.tenant_id, scope, "requesting ARM access token");
        let response = http
            .post(self.token_url()?)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(ListError::Token(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        let token: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| ListError::Token(format!("invalid token response: {e}")))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SKEW);
        *self.cached.lock() = Some(CachedToken {
            scope: scope.to_string(),
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

/// Lists peerings through the ARM REST API.
#[derive(Debug)]
pub struct ArmPeeringLister {
    http: reqwest::Client,
    credential: ClientSecretCredential,
    subscription_id: String,
    arm_endpoint: Url,
    token_scope: String,
}

impl ArmPeeringLister {
    pub fn new(
        subscription_id: impl Into<String>,
        credential: ClientSecretCredential,
    ) -> Result<Self, ConfigError> {
        let subscription_id = subscription_id.into();
        if subscription_id.trim().is_empty() {
            return Err(ConfigError::InvalidCredential("subscription id is empty".into()));
        }

        let http = reqwest::Client::builder()
            .user_agent(concat!("vnet-peering-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let arm_endpoint = parse_endpoint(DEFAULT_ARM_ENDPOINT)?;
        Ok(Self {
            http,
            credential,
            subscription_id,
            token_scope: default_scope(&arm_endpoint),
            arm_endpoint,
        })
    }

    /// Point management calls at another cloud; tokens are requested for its audience
    pub fn with_arm_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.arm_endpoint = parse_endpoint(endpoint)?;
        self.token_scope = default_scope(&self.arm_endpoint);
        Ok(self)
    }

    pub fn with_login_endpoint(mut self, endpoint: &str) -> Result<Self, ConfigError> {
        self.credential = self.credential.with_login_endpoint(endpoint)?;
        Ok(self)
    }

    /// OAuth2 scope requested for management calls (`{arm endpoint}/.default`)
    pub fn token_scope(&self) -> &str {
        &self.token_scope
    }

    /// Bearer token for the configured ARM endpoint
    pub async fn authorize(&self) -> Result<String, ListError> {
        self.credential.token(&self.http, &self.token_scope).await
    }

    /// URL of the first page of peerings for `target`
    pub fn peerings_url(&self, target: &PeeringTarget) -> Result<Url, ListError> {
        let mut url = self.arm_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ListError::InvalidLink(self.arm_endpoint.to_string()))?
            .pop_if_empty()
            .extend([
                "subscriptions",
                self.subscription_id.as_str(),
                "resourceGroups",
                target.resource_group(),
                "providers",
                "Microsoft.Network",
                "virtualNetworks",
                target.vnet_name(),
                "virtualNetworkPeerings",
            ]);
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<ArmPeeringPage, ListError> {
        let token = self.authorize().await?;
        debug!(%url, "fetching peering page");

        let response = self.http.get(url.clone()).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ListError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn next_page(
        &self,
        target: &PeeringTarget,
        next: Option<Url>,
    ) -> Result<Option<(PeeringPage, Option<Url>)>, ListError> {
        let Some(url) = next else {
            return Ok(None);
        };

        let page = self.fetch_page(url).await?;
        let next = match page.next_link.as_deref().filter(|link| !link.is_empty()) {
            Some(link) => {
                Some(Url::parse(link).map_err(|_| ListError::InvalidLink(link.to_string()))?)
            }
            None => None,
        };
        let records = page
            .value
            .into_iter()
            .map(|peering| peering.into_record(target))
            .collect();
        Ok(Some((records, next)))
    }
}

impl PeeringLister for ArmPeeringLister {
    fn list_peerings<'a>(&'a self, target: &'a PeeringTarget) -> PageStream<'a> {
        match self.peerings_url(target) {
            Ok(first) => {
                stream::try_unfold(Some(first), move |next| self.next_page(target, next)).boxed()
            }
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArmPeeringPage {
    #[serde(default)]
    value: Vec<ArmPeering>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArmPeering {
    #[serde(default)]
    name: String,
    #[serde(default)]
    properties: ArmPeeringProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmPeeringProperties {
    #[serde(default)]
    peering_state: Option<String>,
    #[serde(default)]
    peering_sync_level: Option<String>,
}

impl ArmPeering {
    fn into_record(self, target: &PeeringTarget) -> PeeringRecord {
        PeeringRecord {
            name: self.name,
            resource_group: target.resource_group().to_string(),
            vnet_name: target.vnet_name().to_string(),
            peering_state: self.properties.peering_state.unwrap_or_default(),
            sync_level: self.properties.peering_sync_level,
        }
    }
}

fn valid_tenant_id(tenant_id: &str) -> bool {
    !tenant_id.is_empty()
        && tenant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn default_scope(arm_endpoint: &Url) -> String {
    format!("{}/.default", arm_endpoint.as_str().trim_end_matches('/'))
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "not a base URL".into(),
        });
    }
    Ok(url)
}
