//! Casedesk Common Library
//!
//! Shared code for the Casedesk services including:
//! - Database models, storage traits and the repository
//! - Subscription entitlements and plan checks
//! - Client portal grants and token validation
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - AI relay client
//! - Metrics and observability

pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod entitlements;
pub mod errors;
pub mod metrics;
pub mod portal;
pub mod relay;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
#[cfg(any(test, feature = "test-util"))]
pub use db::MemoryStore;
pub use entitlements::EntitlementResolver;
pub use errors::{AppError, Result};
pub use portal::PortalTokenGate;
pub use relay::ChatRelay;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
