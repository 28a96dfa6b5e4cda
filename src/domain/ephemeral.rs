use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Abstraction for short-lived, TTL-bound key/value state.
///
/// Sessions, trusted devices, passkey challenges, OAuth states and consumed
/// second-factor codes all live behind this interface. Values are opaque
/// bytes; keys expire on their own once their TTL passes.
///
/// Index sets (`index_*`) group keys per user so that multi-device
/// enumeration does not require a keyspace scan. Members may outlive the keys
/// they point at; readers drop dangling members.
#[async_trait::async_trait]
pub trait EphemeralStore: Send + Sync {
    // ---
    /// Get a value, `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with a time-to-live, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Store a value only if the key is absent. Returns `true` if stored.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Overwrite a value only if the key is still live. Returns `true` if stored.
    ///
    /// A key deleted or expired in the meantime stays gone.
    async fn put_if_present(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Atomically read and delete a value (single-use consumption).
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a value. Returns `true` if something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Add a member to an index set and extend the set's lifetime to `ttl`.
    async fn index_add(&self, index: &str, member: &str, ttl: Duration) -> Result<()>;

    /// Remove a member from an index set.
    async fn index_remove(&self, index: &str, member: &str) -> Result<()>;

    /// All members of an index set.
    async fn index_members(&self, index: &str) -> Result<Vec<String>>;

    /// Drop expired entries. Backends with native expiry report 0.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Type alias for any backend that implements EphemeralStore.
pub type EphemeralStorePtr = Arc<dyn EphemeralStore>;
