//! Encrypted, tenant-keyed credential storage.
//!
//! Two record kinds live here:
//!
//! - [`HostAuthGrant`]: the host platform's OAuth grant, one per tenant.
//! - [`GatewayCredential`]: payment gateway credentials, one per tenant × [`GatewayMode`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  GatewayCredentialManager / TokenManager │
//! │  - validation, probes, refresh           │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - keyed upserts, revision tracking      │
//! │  - transparent encryption/decryption     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite Database                    │
//! │  - secrets encrypted with AES-256-GCM    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use paybridge::credentials::{CredentialStore, GatewayCredentialFields, GatewayMode};
//!
//! # fn main() -> anyhow::Result<()> {
//! let encryption_key = std::env::var("PAYBRIDGE_ENCRYPTION_KEY")?;
//! let store = CredentialStore::new("paybridge.db", &encryption_key)?;
//!
//! let fields = GatewayCredentialFields {
//!     api_key: "api-key".to_string(),
//!     signing_secret: "x-signature-key".to_string(),
//!     collection_id: "abc123".to_string(),
//! };
//! let saved = store.upsert_gateway_credential("location-1", GatewayMode::Sandbox, &fields)?;
//! assert!(!saved.verified);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

mod encryption;
mod manager;
mod storage;

pub use manager::{GatewayCredentialManager, SaveCredentialsRequest};
pub use storage::CredentialStore;

/// Gateway environment. Carried explicitly on every credential and request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Sandbox,
    Production,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Sandbox => "sandbox",
            GatewayMode::Production => "production",
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandbox" => Ok(GatewayMode::Sandbox),
            "production" => Ok(GatewayMode::Production),
            other => Err(format!(
                "invalid mode '{}', expected 'sandbox' or 'production'",
                other
            )),
        }
    }
}

/// OAuth grant allowing calls to the host platform on a tenant's behalf.
///
/// # Security
/// - Tokens are encrypted at rest in the credential store
/// - Never serialized into HTTP responses
#[derive(Clone, Debug, PartialEq)]
pub struct HostAuthGrant {
    /// Tenant (location) identifier issued by the host platform
    pub tenant_id: String,

    /// Host-side account (company) identifier
    pub account_id: String,

    /// Host-side user who authorized the install
    pub user_id: String,

    /// OAuth access token
    pub access_token: String,

    /// OAuth refresh token (may be rotated on every refresh)
    pub refresh_token: String,

    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

/// Input fields for a gateway credential save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayCredentialFields {
    pub api_key: String,
    pub signing_secret: String,
    pub collection_id: String,
}

/// Stored gateway credentials for one tenant and mode.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayCredential {
    pub tenant_id: String,
    pub mode: GatewayMode,
    pub api_key: String,
    pub signing_secret: String,
    pub collection_id: String,

    /// True only after a successful probe with exactly these values
    pub verified: bool,

    /// Bumped on every save; verification applies to a single revision
    pub revision: i64,

    pub updated_at: DateTime<Utc>,
}

impl GatewayCredential {
    /// Field values as saved, without derived state.
    pub fn fields(&self) -> GatewayCredentialFields {
        GatewayCredentialFields {
            api_key: self.api_key.clone(),
            signing_secret: self.signing_secret.clone(),
            collection_id: self.collection_id.clone(),
        }
    }
}

/// Masks a secret for echoing back to a browser, keeping the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
