use crate::billplz::{GatewayEndpoints, PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
use crate::credentials::GatewayMode;
use crate::oauth::{
    OAuthClientConfig, RegistrationConfig, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL,
    HOST_API_VERSION,
};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_ENV: &str = "PAYBRIDGE_CONFIG";

/// Environment variable holding the base64 storage encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "PAYBRIDGE_ENCRYPTION_KEY";

const DEFAULT_CONFIG_PATH: &str = "paybridge.toml";

/// Complete paybridge configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Listener and public URLs
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used in registered and gateway callback URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Where the browser lands after a completed install
    #[serde(default = "default_dashboard_url")]
    pub dashboard_url: String,
}

fn default_port() -> u16 {
    5000
}

fn default_public_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_dashboard_url() -> String {
    "https://app.gohighlevel.com".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            public_base_url: default_public_base_url(),
            dashboard_url: default_dashboard_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "paybridge.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Host platform OAuth client and provider listing
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Defaults to `{public_base_url}/oauth/callback` when empty
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_user_type")]
    pub user_type: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    #[serde(default = "default_provider_description")]
    pub provider_description: String,
    #[serde(default)]
    pub provider_image_url: String,
    /// Gateway mode baked into the URLs registered with the host
    #[serde(default = "default_registration_mode")]
    pub registration_mode: GatewayMode,
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_user_type() -> String {
    "Location".to_string()
}

fn default_api_version() -> String {
    HOST_API_VERSION.to_string()
}

fn default_provider_name() -> String {
    "Billplz".to_string()
}

fn default_provider_description() -> String {
    "Accept FPX, card and e-wallet payments through Billplz".to_string()
}

fn default_registration_mode() -> GatewayMode {
    GatewayMode::Production
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            api_base_url: default_api_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            user_type: default_user_type(),
            api_version: default_api_version(),
            provider_name: default_provider_name(),
            provider_description: default_provider_description(),
            provider_image_url: String::new(),
            registration_mode: default_registration_mode(),
        }
    }
}

/// Payment gateway API bases
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_sandbox_base_url")]
    pub sandbox_base_url: String,
    #[serde(default = "default_production_base_url")]
    pub production_base_url: String,
}

fn default_sandbox_base_url() -> String {
    SANDBOX_BASE_URL.to_string()
}

fn default_production_base_url() -> String {
    PRODUCTION_BASE_URL.to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sandbox_base_url: default_sandbox_base_url(),
            production_base_url: default_production_base_url(),
        }
    }
}

/// Outbound HTTP policy
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl AppConfig {
    /// Loads the config file named by `PAYBRIDGE_CONFIG` (if present) and applies
    /// `PAYBRIDGE_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&path).exists() {
            load_config(&path)?
        } else {
            tracing::info!(path = %path, "No config file found, using defaults");
            AppConfig::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PAYBRIDGE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PAYBRIDGE_PORT") {
            self.server.port = port
                .parse()
                .context("PAYBRIDGE_PORT must be a valid port number")?;
        }
        if let Some(url) = lookup("PAYBRIDGE_PUBLIC_BASE_URL") {
            self.server.public_base_url = url;
        }
        if let Some(url) = lookup("PAYBRIDGE_DASHBOARD_URL") {
            self.server.dashboard_url = url;
        }
        if let Some(path) = lookup("PAYBRIDGE_DATABASE_PATH") {
            self.storage.database_path = path;
        }
        if let Some(id) = lookup("PAYBRIDGE_CLIENT_ID") {
            self.host.client_id = id;
        }
        if let Some(secret) = lookup("PAYBRIDGE_CLIENT_SECRET") {
            self.host.client_secret = secret;
        }
        if let Some(uri) = lookup("PAYBRIDGE_REDIRECT_URI") {
            self.host.redirect_uri = uri;
        }
        if let Some(mode) = lookup("PAYBRIDGE_REGISTRATION_MODE") {
            self.host.registration_mode = mode
                .parse()
                .map_err(|e: String| anyhow::anyhow!("PAYBRIDGE_REGISTRATION_MODE: {}", e))?;
        }
        Ok(())
    }

    /// Fails when required settings are missing.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.host.client_id.trim().is_empty() {
            missing.push("host.client_id (PAYBRIDGE_CLIENT_ID)");
        }
        if self.host.client_secret.trim().is_empty() {
            missing.push("host.client_secret (PAYBRIDGE_CLIENT_SECRET)");
        }
        if self.server.public_base_url.trim().is_empty() {
            missing.push("server.public_base_url (PAYBRIDGE_PUBLIC_BASE_URL)");
        }
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        if self.http.timeout_seconds == 0 {
            bail!("http.timeout_seconds must be greater than zero");
        }
        Ok(())
    }

    pub fn public_base_url(&self) -> String {
        self.server.public_base_url.trim_end_matches('/').to_string()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_seconds)
    }

    pub fn oauth_client(&self) -> OAuthClientConfig {
        let redirect_uri = if self.host.redirect_uri.trim().is_empty() {
            format!("{}/oauth/callback", self.public_base_url())
        } else {
            self.host.redirect_uri.clone()
        };
        OAuthClientConfig {
            token_url: self.host.token_url.clone(),
            client_id: self.host.client_id.clone(),
            client_secret: self.host.client_secret.clone(),
            redirect_uri,
            user_type: self.host.user_type.clone(),
        }
    }

    pub fn registration(&self) -> RegistrationConfig {
        RegistrationConfig {
            api_base_url: self.host.api_base_url.clone(),
            api_version: self.host.api_version.clone(),
            provider_name: self.host.provider_name.clone(),
            description: self.host.provider_description.clone(),
            image_url: self.host.provider_image_url.clone(),
            public_base_url: self.public_base_url(),
            mode: self.host.registration_mode,
        }
    }

    pub fn gateway_endpoints(&self) -> GatewayEndpoints {
        GatewayEndpoints {
            sandbox_base_url: self.gateway.sandbox_base_url.clone(),
            production_base_url: self.gateway.production_base_url.clone(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}
