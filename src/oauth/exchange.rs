//! Token endpoint calls for the two grants the integration uses.

use crate::error::{from_transport, host_platform, BridgeError, BridgeResult};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Host platform OAuth client registration.
#[derive(Clone, Debug)]
pub struct OAuthClientConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Sent on every token call (`Location` for per-tenant tokens)
    pub user_type: String,
}

/// Grant presented to the token endpoint.
#[derive(Clone, Copy)]
pub(crate) enum TokenGrant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

impl TokenGrant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            TokenGrant::AuthorizationCode(_) => "authorization_code",
            TokenGrant::RefreshToken(_) => "refresh_token",
        }
    }
}

/// Token endpoint response. Identity fields are only present on some grants.
#[derive(Deserialize, Debug)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(rename = "locationId", default)]
    pub location_id: Option<String>,
    #[serde(rename = "companyId", default)]
    pub company_id: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
}

/// OAuth error body.
#[derive(Deserialize, Debug, Default)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Posts a form-encoded grant to the token endpoint.
pub(crate) async fn request_token(
    http_client: &Client,
    config: &OAuthClientConfig,
    grant: TokenGrant<'_>,
) -> BridgeResult<TokenResponse> {
    let mut form: Vec<(&str, &str)> = vec![
        ("grant_type", grant.grant_type()),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
        ("user_type", config.user_type.as_str()),
    ];
    match grant {
        TokenGrant::AuthorizationCode(code) => {
            form.push(("code", code));
            form.push(("redirect_uri", config.redirect_uri.as_str()));
        }
        TokenGrant::RefreshToken(token) => form.push(("refresh_token", token)),
    }

    debug!(token_url = %config.token_url, grant_type = grant.grant_type(), "Calling token endpoint");

    let response = http_client
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| from_transport(e, "Failed to send token request", host_platform))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());

        if matches!(grant, TokenGrant::AuthorizationCode(_)) && is_code_already_used(status, &body)
        {
            return Err(BridgeError::CodeAlreadyUsed { detail: body });
        }
        return Err(BridgeError::HostPlatform {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| from_transport(e, "Failed to parse token response", host_platform))?;

    debug!(
        has_refresh_token = token.refresh_token.is_some(),
        expires_in = ?token.expires_in,
        "Token endpoint call succeeded"
    );

    Ok(token)
}

/// Whether a failed code exchange means the code was already redeemed.
///
/// The host reports this as `invalid_grant` with a description mentioning that the
/// code was used or consumed.
pub(crate) fn is_code_already_used(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::BAD_REQUEST && status != StatusCode::UNAUTHORIZED {
        return false;
    }
    let parsed: TokenErrorBody = serde_json::from_str(body).unwrap_or_default();
    if parsed.error.as_deref() != Some("invalid_grant") {
        return false;
    }
    let description = parsed.error_description.unwrap_or_default().to_lowercase();
    ["used", "consumed", "already"]
        .iter()
        .any(|marker| description.contains(marker))
}
