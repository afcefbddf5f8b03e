use crate::credentials::GatewayMode;
use crate::error::{from_transport, gateway, BridgeError, BridgeResult};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Billplz API base URLs, one per mode.
#[derive(Clone, Debug)]
pub struct GatewayEndpoints {
    pub sandbox_base_url: String,
    pub production_base_url: String,
}

impl GatewayEndpoints {
    /// Base URL for `mode`. The mode is the only input to this choice.
    pub fn base_url(&self, mode: GatewayMode) -> &str {
        let url = match mode {
            GatewayMode::Sandbox => &self.sandbox_base_url,
            GatewayMode::Production => &self.production_base_url,
        };
        url.trim_end_matches('/')
    }
}

/// Billing collection metadata.
#[derive(Debug, Deserialize)]
pub struct Collection {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Bill creation payload.
#[derive(Debug, Serialize)]
pub struct CreateBill {
    pub collection_id: String,
    pub email: String,
    pub name: String,
    /// Minor currency units
    pub amount: i64,
    pub description: String,
    pub callback_url: String,
    pub redirect_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
}

/// A bill as returned by the gateway.
#[derive(Debug, Deserialize)]
pub struct Bill {
    pub id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub paid_amount: i64,
    #[serde(default)]
    pub url: String,
}

/// HTTP client for the Billplz v3 REST API.
///
/// Authenticates with HTTP Basic: the API key as username and an empty password.
#[derive(Clone)]
pub struct BillplzClient {
    http_client: Client,
    endpoints: GatewayEndpoints,
}

impl BillplzClient {
    pub fn new(http_client: Client, endpoints: GatewayEndpoints) -> Self {
        Self {
            http_client,
            endpoints,
        }
    }

    /// Fetch collection metadata (read-only; used as the connectivity probe).
    pub async fn get_collection(
        &self,
        mode: GatewayMode,
        api_key: &str,
        collection_id: &str,
    ) -> BridgeResult<Collection> {
        let url = format!(
            "{}/collections/{}",
            self.endpoints.base_url(mode),
            urlencoding::encode(collection_id)
        );
        let response = self
            .http_client
            .get(&url)
            .basic_auth(api_key, None::<&str>)
            .send()
            .await
            .map_err(|e| from_transport(e, "Failed to send collection lookup", gateway))?;

        parse_response(response, "collection").await
    }

    /// Create a bill and return the hosted payment page.
    pub async fn create_bill(
        &self,
        mode: GatewayMode,
        api_key: &str,
        bill: &CreateBill,
    ) -> BridgeResult<Bill> {
        let url = format!("{}/bills", self.endpoints.base_url(mode));
        let response = self
            .http_client
            .post(&url)
            .basic_auth(api_key, None::<&str>)
            .json(bill)
            .send()
            .await
            .map_err(|e| from_transport(e, "Failed to send bill creation", gateway))?;

        parse_response(response, "bill").await
    }

    /// Fetch a bill's current state.
    pub async fn get_bill(
        &self,
        mode: GatewayMode,
        api_key: &str,
        bill_id: &str,
    ) -> BridgeResult<Bill> {
        let url = format!(
            "{}/bills/{}",
            self.endpoints.base_url(mode),
            urlencoding::encode(bill_id)
        );
        let response = self
            .http_client
            .get(&url)
            .basic_auth(api_key, None::<&str>)
            .send()
            .await
            .map_err(|e| from_transport(e, "Failed to send bill query", gateway))?;

        parse_response(response, "bill").await
    }
}

/// Turns a non-2xx response into a gateway error carrying the upstream body.
async fn parse_response<T: DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> BridgeResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(BridgeError::Gateway {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|e| from_transport(e, &format!("Failed to parse {} response", what), gateway))
}
