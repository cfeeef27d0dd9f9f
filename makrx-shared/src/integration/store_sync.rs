/// Service order → store order status sync
///
/// When a service order was placed from a store order, every status change
/// is pushed to the store so the customer's order page stays current. The
/// push is best-effort: callers log failures and carry on.
///
/// # Example
///
/// ```no_run
/// use makrx_shared::integration::{HttpStoreSync, StoreSync};
/// use makrx_shared::models::service_order::ServiceOrderStatus;
/// use std::time::Duration;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sync = HttpStoreSync::new("https://store.makrx.org", Duration::from_millis(3000))?;
/// sync.push_service_status(Uuid::new_v4(), Uuid::new_v4(), ServiceOrderStatus::Accepted)
///     .await?;
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::models::service_order::ServiceOrderStatus;

/// Path the store service receives status updates on
pub const STATUS_PATH: &str = "/api/v1/integrations/service-orders/status";

#[derive(Debug, thiserror::Error)]
pub enum StoreSyncError {
    #[error("Invalid store sync URL: {0}")]
    InvalidUrl(String),

    #[error("Store sync request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Store responded with status {0}")]
    Status(u16),
}

/// Body of a status push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub store_order_id: Uuid,
    pub service_order_id: Uuid,
    pub status: ServiceOrderStatus,
}

#[async_trait]
pub trait StoreSync: Send + Sync {
    async fn push_service_status(
        &self,
        store_order_id: Uuid,
        service_order_id: Uuid,
        status: ServiceOrderStatus,
    ) -> Result<(), StoreSyncError>;

    /// Readiness check; `None` when there is nothing to check
    async fn check(&self) -> Option<Result<(), StoreSyncError>> {
        None
    }
}

/// Used when no store URL is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStoreSync;

#[async_trait]
impl StoreSync for NoopStoreSync {
    async fn push_service_status(
        &self,
        store_order_id: Uuid,
        service_order_id: Uuid,
        status: ServiceOrderStatus,
    ) -> Result<(), StoreSyncError> {
        tracing::debug!(
            store_order_id = %store_order_id,
            service_order_id = %service_order_id,
            status = status.as_str(),
            "Store sync disabled, skipping status push"
        );
        Ok(())
    }
}

/// Pushes status updates to the store over HTTP
#[derive(Debug, Clone)]
pub struct HttpStoreSync {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStoreSync {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StoreSyncError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StoreSyncError::InvalidUrl(base_url));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("makrx-services/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn status_url(&self) -> String {
        format!("{}{}", self.base_url, STATUS_PATH)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

#[async_trait]
impl StoreSync for HttpStoreSync {
    async fn push_service_status(
        &self,
        store_order_id: Uuid,
        service_order_id: Uuid,
        status: ServiceOrderStatus,
    ) -> Result<(), StoreSyncError> {
        let body = StatusUpdate {
            store_order_id,
            service_order_id,
            status,
        };

        let response = self.client.post(self.status_url()).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(StoreSyncError::Status(response.status().as_u16()));
        }

        tracing::debug!(
            store_order_id = %store_order_id,
            service_order_id = %service_order_id,
            status = status.as_str(),
            "Pushed service status to store"
        );

        Ok(())
    }

    async fn check(&self) -> Option<Result<(), StoreSyncError>> {
        let result = match self.client.get(self.health_url()).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(StoreSyncError::Status(response.status().as_u16())),
            Err(e) => Err(StoreSyncError::Request(e)),
        };
        Some(result)
    }
}
