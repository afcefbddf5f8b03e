//! JSON error bodies and shared query parsing for the API routers.

use crate::credentials::GatewayMode;
use crate::error::BridgeError;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    kind: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if let BridgeError::Storage(e) = &self {
            error!(error = %e, "Storage failure");
        }

        let error_message = match &self {
            // Internal detail stays in the log
            BridgeError::Storage(_) => "Internal storage error".to_string(),
            other => other.to_string(),
        };
        let fields = match &self {
            BridgeError::Validation { fields, .. } => fields.clone(),
            _ => Vec::new(),
        };

        let body = Json(ErrorResponse {
            kind: self.kind(),
            error: error_message,
            fields,
        });

        (status, body).into_response()
    }
}

// Parser messages can quote body values, so only the status is logged
impl From<JsonRejection> for BridgeError {
    fn from(rejection: JsonRejection) -> Self {
        debug!(status = rejection.status().as_u16(), "Rejected request body");
        let message = match rejection {
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "request body has missing or mistyped fields",
            JsonRejection::MissingJsonContentType(_) => {
                "expected request with `Content-Type: application/json`"
            }
            _ => "request body could not be read",
        };
        BridgeError::validation(message, Vec::new())
    }
}

/// `Json<T>` whose rejections use the structured error body.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = BridgeError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// `?tenantId=&mode=` query parameters
#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    #[serde(rename = "tenantId", default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
}

impl TenantQuery {
    /// The tenant alone, for routes that are not mode specific.
    pub fn tenant(&self) -> Result<String, BridgeError> {
        self.tenant_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| BridgeError::validation("tenantId is required", vec!["tenantId".into()]))
    }

    /// Tenant and mode, both required. Mode is never defaulted.
    pub fn tenant_and_mode(&self) -> Result<(String, GatewayMode), BridgeError> {
        let tenant = self.tenant();
        let mode = match self.mode.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw.parse::<GatewayMode>().map_err(Some),
            _ => Err(None),
        };

        match (tenant, mode) {
            (Ok(tenant), Ok(mode)) => Ok((tenant, mode)),
            (tenant, mode) => {
                let mut fields = Vec::new();
                let mut problems = Vec::new();
                if tenant.is_err() {
                    fields.push("tenantId".to_string());
                    problems.push("tenantId is required".to_string());
                }
                if let Err(problem) = mode {
                    fields.push("mode".to_string());
                    problems.push(problem.unwrap_or_else(|| "mode is required".to_string()));
                }
                Err(BridgeError::validation(problems.join("; "), fields))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: &str) -> TenantQuery {
        serde_urlencoded::from_str(raw).unwrap()
    }

    #[test]
    fn test_tenant_and_mode_parsed() {
        let (tenant, mode) = query("tenantId=loc-1&mode=production")
            .tenant_and_mode()
            .unwrap();
        assert_eq!(tenant, "loc-1");
        assert_eq!(mode, GatewayMode::Production);
    }

    #[test]
    fn test_missing_parts_all_reported() {
        match query("").tenant_and_mode().unwrap_err() {
            BridgeError::Validation { fields, .. } => assert_eq!(fields, vec!["tenantId", "mode"]),
            other => panic!("unexpected error: {:?}", other),
        }
        match query("tenantId=loc-1&mode=live").tenant_and_mode().unwrap_err() {
            BridgeError::Validation { fields, message } => {
                assert_eq!(fields, vec!["mode"]);
                assert!(message.contains("invalid mode"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response =
            BridgeError::validation("Missing fields", vec!["apiKey".into()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "validation_error");
        assert_eq!(json["fields"][0], "apiKey");
    }

    fn json_request(body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap()
    }

    #[derive(Debug, Deserialize)]
    struct Named {
        #[allow(dead_code)]
        name: String,
    }

    #[tokio::test]
    async fn test_json_rejections_become_validation_errors() {
        let err = JsonBody::<Named>::from_request(json_request("{not json"), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("not valid JSON"));

        assert!(JsonBody::<Named>::from_request(json_request(r#"{"name":"Ali"}"#), &())
            .await
            .is_ok());

        let err = JsonBody::<Named>::from_request(json_request(r#"{"name":123}"#), &())
            .await
            .err()
            .unwrap();
        assert_eq!(err.status_code(), 400);
        assert!(!err.to_string().contains("123"));
    }

    #[tokio::test]
    async fn test_storage_detail_not_exposed() {
        let response =
            BridgeError::Storage(anyhow::anyhow!("disk /var/lib/db corrupted")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["kind"], "internal_error");
        assert!(!json["error"].as_str().unwrap().contains("/var/lib"));
        assert!(json.get("fields").is_none());
    }
}
