use anyhow::{Context, Result};
use paybridge::api::{create_app, AppState};
use paybridge::config::{AppConfig, ENCRYPTION_KEY_ENV};
use paybridge::credentials::CredentialStore;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paybridge=info".into()),
        )
        .init();

    info!("Paybridge starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let encryption_key = std::env::var(ENCRYPTION_KEY_ENV)
        .with_context(|| format!("{} is required (base64-encoded 32-byte key)", ENCRYPTION_KEY_ENV))?;

    info!(
        port = config.server.port,
        public_base_url = %config.public_base_url(),
        database_path = %config.storage.database_path,
        registration_mode = %config.host.registration_mode,
        has_client_secret = !config.host.client_secret.is_empty(),
        "Configuration loaded"
    );

    let store = Arc::new(
        CredentialStore::new(&config.storage.database_path, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    info!("Credential store initialized");

    let http_client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let state = AppState::new(&config, store, http_client);

    // Payment notifications are logged; forwarding them to the host is out of scope
    let mut events = state.events.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    tenant_id = %event.tenant_id,
                    mode = %event.mode,
                    charge_id = %event.charge_id,
                    state = ?event.state,
                    paid = event.paid,
                    amount_paid = event.amount_paid,
                    "Payment event"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Payment event logger lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .context("Failed to bind API port")?;
    info!(port = config.server.port, "Paybridge API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl_c signal");
            }
            info!("Shutdown signal received");
        })
        .await
        .context("API server error")?;

    event_logger.abort();
    info!("Paybridge stopped");

    Ok(())
}
