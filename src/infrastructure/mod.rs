mod database;
mod ephemeral;
pub mod memory;
pub mod metrics;

// Re-export the factory functions for easy access
pub use database::{connect_with_retry, create_postgres_repository, PostgresRepository};
pub use ephemeral::{create_ephemeral_store, MemoryStore, RedisStore};
pub use memory::{create as create_memory_repository, MemoryRepository};
pub use metrics::{create_noop_metrics, create_prom_metrics};
