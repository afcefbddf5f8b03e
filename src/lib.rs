// Shared error taxonomy
pub mod error;

// Configuration loading
pub mod config;

// Encrypted grant and gateway credential storage
pub mod credentials;

// Host platform OAuth and provider registration
pub mod oauth;

// Billplz REST client and signature scheme
pub mod billplz;

// Payment adapter
pub mod payments;

// HTTP APIs
pub mod api;

pub use error::{BridgeError, BridgeResult};
