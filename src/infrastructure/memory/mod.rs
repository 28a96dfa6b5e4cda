//! In-process implementations of the durable storage abstraction.

mod memory_repository;

pub use memory_repository::MemoryRepository;
use std::sync::Arc;

/// Creates an empty in-memory repository.
pub fn create() -> Arc<MemoryRepository> {
    Arc::new(MemoryRepository::new())
}
