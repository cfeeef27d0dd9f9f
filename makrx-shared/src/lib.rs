//! # MakrX Shared Library
//!
//! Types, persistence and business logic shared by the MakrX API server and
//! the dispatcher worker.
//!
//! ## Module Organization
//!
//! - `db`: Connection pooling and migrations
//! - `auth`: Keycloak token verification and authorization helpers
//! - `models`: Database models and their queries
//! - `dispatch`: Provider matching and service-order dispatch
//! - `pricing`: Cart totals and fabrication quotes
//! - `features`: Feature flag evaluation and caching
//! - `notifications`: Notification templates
//! - `integration`: Best-effort sync with the store service
//! - `pagination`: Page/per-page query helpers

pub mod auth;
pub mod db;
pub mod dispatch;
pub mod features;
pub mod integration;
pub mod models;
pub mod notifications;
pub mod pagination;
pub mod pricing;

/// Current version of the MakrX shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
