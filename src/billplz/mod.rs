//! Billplz gateway REST client and callback signature scheme.

mod client;
pub mod signature;

pub use client::{Bill, BillplzClient, Collection, CreateBill, GatewayEndpoints};

/// Default sandbox API base.
pub const SANDBOX_BASE_URL: &str = "https://www.billplz-sandbox.com/api/v3";

/// Default production API base.
pub const PRODUCTION_BASE_URL: &str = "https://www.billplz.com/api/v3";
