//! Error taxonomy shared by the managers, the payment adapter and the HTTP layer.
//!
//! Every variant maps to a stable `kind` string that API callers can match on.
//! Messages carry upstream status and body detail but never tokens, API keys or
//! signing secrets.

use thiserror::Error;

/// Result alias used across the crate's component boundaries.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bad or missing input. Never retried.
    #[error("{message}")]
    Validation {
        message: String,
        /// Every offending field, not just the first.
        fields: Vec<String>,
    },

    /// No grant or credential exists for the key.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The tenant has no gateway credentials for the requested mode.
    #[error("Payment gateway is not configured for tenant '{tenant_id}' in {mode} mode")]
    NotConfigured { tenant_id: String, mode: String },

    /// The host platform reported the authorization code as already exchanged.
    #[error("Authorization code has already been used: {detail}")]
    CodeAlreadyUsed { detail: String },

    /// Inbound callback failed authentication.
    #[error("Signature verification failed: {0}")]
    Signature(String),

    /// An outbound call exceeded its timeout.
    #[error("Upstream request timed out: {0}")]
    UpstreamTimeout(String),

    /// The host platform's token endpoint rejected the request.
    #[error("Host platform error (status {status:?}): {detail}")]
    HostPlatform { status: Option<u16>, detail: String },

    /// The payment gateway rejected the request or could not be reached.
    #[error("Payment gateway error (status {status:?}): {detail}")]
    Gateway { status: Option<u16>, detail: String },

    /// Provider registration with the host platform failed.
    #[error("Provider registration failed (status {status:?}): {detail}")]
    Registration { status: Option<u16>, detail: String },

    /// Persistence or encryption failure.
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl BridgeError {
    /// Builds a validation error naming the given fields.
    pub fn validation(message: impl Into<String>, fields: Vec<String>) -> Self {
        BridgeError::Validation {
            message: message.into(),
            fields,
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::Validation { .. } => "validation_error",
            BridgeError::NotFound(_) => "not_found",
            BridgeError::NotConfigured { .. } => "not_configured",
            BridgeError::CodeAlreadyUsed { .. } => "code_already_used",
            BridgeError::Signature(_) => "signature_error",
            BridgeError::UpstreamTimeout(_) => "upstream_timeout",
            BridgeError::HostPlatform { .. } => "host_platform_error",
            BridgeError::Gateway { .. } => "gateway_error",
            BridgeError::Registration { .. } => "registration_error",
            BridgeError::Storage(_) => "internal_error",
        }
    }

    /// HTTP status code equivalent.
    pub fn status_code(&self) -> u16 {
        match self {
            BridgeError::Validation { .. } => 400,
            BridgeError::NotFound(_) | BridgeError::NotConfigured { .. } => 404,
            BridgeError::CodeAlreadyUsed { .. } => 409,
            BridgeError::Signature(_) => 401,
            BridgeError::UpstreamTimeout(_) => 504,
            BridgeError::HostPlatform { .. }
            | BridgeError::Gateway { .. }
            | BridgeError::Registration { .. } => 502,
            BridgeError::Storage(_) => 500,
        }
    }
}

/// Maps a transport-level reqwest failure onto the taxonomy.
///
/// `upstream` picks the variant used for non-timeout failures.
pub(crate) fn from_transport(
    err: reqwest::Error,
    what: &str,
    upstream: fn(Option<u16>, String) -> BridgeError,
) -> BridgeError {
    if err.is_timeout() {
        BridgeError::UpstreamTimeout(what.to_string())
    } else {
        upstream(err.status().map(|s| s.as_u16()), format!("{}: {}", what, err))
    }
}

pub(crate) fn gateway(status: Option<u16>, detail: String) -> BridgeError {
    BridgeError::Gateway { status, detail }
}

pub(crate) fn host_platform(status: Option<u16>, detail: String) -> BridgeError {
    BridgeError::HostPlatform { status, detail }
}

pub(crate) fn registration(status: Option<u16>, detail: String) -> BridgeError {
    BridgeError::Registration { status, detail }
}
