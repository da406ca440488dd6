//! Server-facing adapters (sync protocol client).

pub mod sync_client;

pub use sync_client::{SyncClient, SyncClientConfig};
