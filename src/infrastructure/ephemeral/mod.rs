//! Backends for the `EphemeralStore` abstraction.

mod memory_store;
mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;

use crate::config::{EphemeralBackend, RedisConfig};
use crate::domain::EphemeralStorePtr;
use anyhow::Result;
use std::sync::Arc;

/// Creates the ephemeral store selected by configuration.
pub fn create_ephemeral_store(config: &RedisConfig) -> Result<EphemeralStorePtr> {
    // ---
    match config.backend {
        EphemeralBackend::Memory => {
            tracing::warn!(
                "Using process-local ephemeral store; sessions and challenges are not shared between instances"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
        EphemeralBackend::Redis => {
            let client = redis::Client::open(config.url.clone())?;
            Ok(Arc::new(RedisStore::new(client, config.key_prefix.clone())))
        }
    }
}
