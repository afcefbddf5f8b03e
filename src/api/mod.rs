// HTTP surface: install flow, credential settings, payment endpoints

mod credentials;
mod error;
mod oauth;
mod pages;
mod payments;

pub use credentials::{create_credentials_router, CredentialView, CredentialsAppState};
pub use error::TenantQuery;
pub use oauth::{create_oauth_router, OAuthAppState};
pub use payments::{
    create_payments_router, CreatePaymentRequest, PaymentsAppState, QueryPaymentRequest,
};

use crate::config::AppConfig;
use crate::credentials::{CredentialStore, GatewayCredentialManager};
use crate::billplz::BillplzClient;
use crate::oauth::{ProviderRegistration, TokenManager};
use crate::payments::{PaymentAdapter, PaymentEvent};
use axum::{response::Json, routing::get, Router};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// Capacity of the payment event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Every component the routers need, wired once at startup.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub token_manager: Arc<TokenManager>,
    pub registration: Arc<ProviderRegistration>,
    pub credential_manager: Arc<GatewayCredentialManager>,
    pub adapter: Arc<PaymentAdapter>,
    pub events: broadcast::Sender<PaymentEvent>,
    pub dashboard_url: String,
}

impl AppState {
    /// Wires components from configuration around a shared store and HTTP client.
    pub fn new(config: &AppConfig, store: Arc<CredentialStore>, http_client: Client) -> Self {
        let billplz = BillplzClient::new(http_client.clone(), config.gateway_endpoints());
        let adapter = Arc::new(PaymentAdapter::new(
            Arc::clone(&store),
            billplz,
            config.public_base_url(),
        ));
        let token_manager = Arc::new(TokenManager::new(
            Arc::clone(&store),
            http_client.clone(),
            config.oauth_client(),
        ));
        let registration = Arc::new(ProviderRegistration::new(
            http_client,
            config.registration(),
        ));
        let credential_manager = Arc::new(GatewayCredentialManager::new(
            Arc::clone(&store),
            Arc::clone(&adapter),
        ));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            store,
            token_manager,
            registration,
            credential_manager,
            adapter,
            events,
            dashboard_url: config.server.dashboard_url.clone(),
        }
    }
}

/// Builds the complete application router.
pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .merge(create_oauth_router(OAuthAppState {
            token_manager: state.token_manager,
            registration: state.registration,
            dashboard_url: state.dashboard_url.clone(),
        }))
        .merge(create_credentials_router(CredentialsAppState {
            manager: state.credential_manager,
        }))
        .merge(create_payments_router(PaymentsAppState {
            adapter: state.adapter,
            events: state.events,
            dashboard_url: state.dashboard_url,
        }))
        .layer(cors)
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
