use crate::credentials::GatewayMode;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

/// A request to collect money from a payer. Never persisted.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Major currency units; converted to minor units before reaching the gateway
    pub amount: Decimal,
    pub currency: String,
    pub payer_name: String,
    pub payer_email: String,
    pub payer_phone: Option<String>,
    pub description: String,
}

/// Result of a successful charge creation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargeCreated {
    pub charge_id: String,
    /// Hosted payment page
    pub redirect_url: String,
}

/// Normalized charge state.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChargeState {
    Pending,
    Paid,
    Failed,
}

impl ChargeState {
    /// Maps the gateway's state vocabulary. Unknown states are treated as pending.
    pub fn from_gateway(state: &str) -> Self {
        match state {
            "paid" => ChargeState::Paid,
            "deleted" | "failed" | "cancelled" => ChargeState::Failed,
            "due" | "pending" => ChargeState::Pending,
            other => {
                warn!(state = %other, "Unknown gateway charge state, treating as pending");
                ChargeState::Pending
            }
        }
    }
}

/// Current status of a charge.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargeStatus {
    pub state: ChargeState,
    pub paid: bool,
    /// Minor currency units
    pub amount_paid: i64,
}

/// An authenticated payment notification from the gateway.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub tenant_id: String,
    pub mode: GatewayMode,
    pub charge_id: String,
    pub state: ChargeState,
    pub paid: bool,
    /// Minor currency units
    pub amount_paid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<String>,
}
