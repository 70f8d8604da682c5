/*!
Mock Azure Resource Manager

A local axum server answering the two calls the ARM lister makes:
- `POST /{tenant}/oauth2/v2.0/token` returns a fixed bearer token
- `GET .../virtualNetworks/{vnet}/virtualNetworkPeerings` returns the first
  scripted page, later pages are served from `/pages/{n}` through `nextLink`

Requests without the bearer token get 401.
*/

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use vnet_peering_exporter::{ArmPeeringLister, ClientSecretCredential};

pub const MOCK_TOKEN: &str = "mock-arm-token";
pub const MOCK_TENANT: &str = "00000000-0000-0000-0000-000000000000";
pub const MOCK_SUBSCRIPTION: &str = "11111111-1111-1111-1111-111111111111";

/// One scripted ARM response.
#[derive(Debug, Clone)]
pub enum MockPage {
    /// A page holding these peering payloads (see [`ArmPayloadBuilder::peering`])
    Peerings(Vec<Value>),
    /// A bare HTTP status with an ARM error body
    Status(u16),
}

#[derive(Clone)]
struct MockArmState {
    base_url: String,
    pages: Arc<Vec<MockPage>>,
    token_scopes: Arc<Mutex<Vec<String>>>,
    page_requests: Arc<Mutex<Vec<String>>>,
    token_status: Arc<Mutex<StatusCode>>,
}

pub struct MockArmServer {
    addr: SocketAddr,
    state: MockArmState,
    handle: JoinHandle<()>,
}

impl MockArmServer {
    /// Bind on an ephemeral local port and start serving `pages`
    pub async fn start(pages: Vec<MockPage>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = MockArmState {
            base_url: format!("http://{addr}"),
            pages: Arc::new(pages),
            token_scopes: Arc::new(Mutex::new(Vec::new())),
            page_requests: Arc::new(Mutex::new(Vec::new())),
            token_status: Arc::new(Mutex::new(StatusCode::OK)),
        };

        let app = Router::new()
            .route("/{tenant}/oauth2/v2.0/token", post(issue_token))
            .route(
                "/subscriptions/{subscription}/resourceGroups/{rg}/providers/Microsoft.Network/virtualNetworks/{vnet}/virtualNetworkPeerings",
                get(first_page),
            )
            .route("/pages/{index}", get(next_page))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("[mock-arm] server stopped: {e}");
            }
        });
        tracing::debug!("[mock-arm] listening on {addr}");

        Ok(Self { addr, state, handle })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.state.base_url
    }

    /// An ARM lister pointed at this server for both login and management calls
    pub fn lister(&self) -> Result<ArmPeeringLister> {
        let credential = ClientSecretCredential::new(MOCK_TENANT, "mock-client", "mock-secret")?
            .with_login_endpoint(self.base_url())?;
        Ok(ArmPeeringLister::new(MOCK_SUBSCRIPTION, credential)?
            .with_arm_endpoint(self.base_url())?)
    }

    /// Make the token endpoint answer with `status` from now on
    pub fn fail_token_requests(&self, status: StatusCode) {
        *self.state.token_status.lock().unwrap() = status;
    }

    pub fn token_requests(&self) -> usize {
        self.state.token_scopes.lock().unwrap().len()
    }

    /// `scope` of every token request, oldest first
    pub fn token_scopes(&self) -> Vec<String> {
        self.state.token_scopes.lock().unwrap().clone()
    }

    /// Paths (with query) of every page request, oldest first
    pub fn page_requests(&self) -> Vec<String> {
        self.state.page_requests.lock().unwrap().clone()
    }
}

impl Drop for MockArmServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn issue_token(
    State(state): State<MockArmState>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state
        .token_scopes
        .lock()
        .unwrap()
        .push(form.get("scope").cloned().unwrap_or_default());
    let status = *state.token_status.lock().unwrap();
    if status != StatusCode::OK {
        return (status, Json(serde_json::json!({ "error": "invalid_client" }))).into_response();
    }
    if form.get("grant_type").map(String::as_str) != Some("client_credentials") {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "unsupported_grant_type" })),
        )
            .into_response();
    }

    Json(serde_json::json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": MOCK_TOKEN
    }))
    .into_response()
}

async fn first_page(
    State(state): State<MockArmState>,
    Path((subscription, rg, vnet)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response {
    state
        .page_requests
        .lock()
        .unwrap()
        .push(format!("/subscriptions/{subscription}/resourceGroups/{rg}/virtualNetworks/{vnet}"));
    serve_page(&state, &headers, 0)
}

async fn next_page(
    State(state): State<MockArmState>,
    Path(index): Path<usize>,
    headers: HeaderMap,
) -> Response {
    state.page_requests.lock().unwrap().push(format!("/pages/{index}"));
    serve_page(&state, &headers, index)
}

fn serve_page(state: &MockArmState, headers: &HeaderMap, index: usize) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {MOCK_TOKEN}"))
        .unwrap_or(false);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match state.pages.get(index) {
        Some(MockPage::Peerings(peerings)) => {
            let next_link = (index + 1 < state.pages.len())
                .then(|| format!("{}/pages/{}", state.base_url, index + 1));
            Json(ArmPayloadBuilder::page(peerings.clone(), next_link.as_deref())).into_response()
        }
        Some(MockPage::Status(code)) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(serde_json::json!({
                    "error": { "code": "MockFailure", "message": format!("scripted status {code}") }
                })),
            )
                .into_response()
        }
        // an empty listing when nothing is scripted
        None => Json(ArmPayloadBuilder::page(Vec::new(), None)).into_response(),
    }
}

/// Builds ARM JSON payloads
pub struct ArmPayloadBuilder;

impl ArmPayloadBuilder {
    /// One `virtualNetworkPeerings` entry; `sync_level: None` omits the field
    pub fn peering(name: &str, state: &str, sync_level: Option<&str>) -> Value {
        let mut properties = serde_json::json!({
            "peeringState": state,
            "provisioningState": "Succeeded",
            "allowVirtualNetworkAccess": true
        });
        if let Some(sync_level) = sync_level {
            properties["peeringSyncLevel"] = Value::String(sync_level.to_string());
        }
        serde_json::json!({
            "name": name,
            "type": "Microsoft.Network/virtualNetworks/virtualNetworkPeerings",
            "properties": properties
        })
    }

    /// A list page, with `nextLink` when there is a following page
    pub fn page(peerings: Vec<Value>, next_link: Option<&str>) -> Value {
        let mut page = serde_json::json!({ "value": peerings });
        if let Some(next_link) = next_link {
            page["nextLink"] = Value::String(next_link.to_string());
        }
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_builders() {
        let peering = ArmPayloadBuilder::peering("hub-to-spoke", "Connected", Some("FullyInSync"));
        assert_eq!(peering["name"], "hub-to-spoke");
        assert_eq!(peering["properties"]["peeringState"], "Connected");
        assert_eq!(peering["properties"]["peeringSyncLevel"], "FullyInSync");

        let without_sync = ArmPayloadBuilder::peering("hub-to-legacy", "Disconnected", None);
        assert!(without_sync["properties"].get("peeringSyncLevel").is_none());

        let page = ArmPayloadBuilder::page(vec![peering], Some("http://localhost/pages/1"));
        assert_eq!(page["value"].as_array().unwrap().len(), 1);
        assert_eq!(page["nextLink"], "http://localhost/pages/1");
        assert!(ArmPayloadBuilder::page(vec![], None).get("nextLink").is_none());
    }

    #[tokio::test]
    async fn test_mock_server_starts() {
        let server = MockArmServer::start(vec![]).await.unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert_eq!(server.token_requests(), 0);
        assert!(server.token_scopes().is_empty());
        assert!(server.lister().is_ok());
    }
}
