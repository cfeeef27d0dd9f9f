/// Outbound integrations
///
/// Currently only the service → store order status sync.

pub mod store_sync;

pub use store_sync::{HttpStoreSync, NoopStoreSync, StatusUpdate, StoreSync, StoreSyncError};
