//! Typed JSON records on top of the byte-oriented `EphemeralStore`.

use crate::domain::{AuthResult, EphemeralStorePtr};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct RecordStore {
    inner: EphemeralStorePtr,
}

impl RecordStore {
    // ---
    pub fn new(inner: EphemeralStorePtr) -> Self {
        Self { inner }
    }

    /// The underlying byte store, for index and sweep operations.
    pub fn raw(&self) -> &EphemeralStorePtr {
        &self.inner
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        // ---
        match self.inner.get(key).await? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> AuthResult<()> {
        // ---
        let bytes = encode(key, value)?;
        self.inner.put(key, bytes, ttl).await?;
        Ok(())
    }

    pub async fn put_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AuthResult<bool> {
        // ---
        let bytes = encode(key, value)?;
        Ok(self.inner.put_if_absent(key, bytes, ttl).await?)
    }

    /// Overwrite only while the key is live; never recreates a deleted record.
    pub async fn put_if_present<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AuthResult<bool> {
        // ---
        let bytes = encode(key, value)?;
        Ok(self.inner.put_if_present(key, bytes, ttl).await?)
    }

    /// Read and delete in one step. A second `take` of the same key sees `None`.
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> AuthResult<Option<T>> {
        // ---
        match self.inner.take(key).await? {
            Some(bytes) => Ok(Some(decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn delete(&self, key: &str) -> AuthResult<bool> {
        Ok(self.inner.delete(key).await?)
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> anyhow::Result<Vec<u8>> {
    serde_json::to_vec(value).with_context(|| format!("Failed to serialize record {key}"))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> anyhow::Result<T> {
    serde_json::from_slice(bytes).with_context(|| format!("Corrupt record under {key}"))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::domain::AuthError;
    use crate::infrastructure::MemoryStore;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        hits: u32,
    }

    fn store() -> RecordStore {
        RecordStore::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn take_is_single_use() {
        // ---
        let store = store();
        let sample = Sample {
            name: "a".to_string(),
            hits: 1,
        };
        store.put("k", &sample, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.take::<Sample>("k").await.unwrap(), Some(sample));
        assert_eq!(store.take::<Sample>("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_bytes_are_a_persistence_error() {
        // ---
        let store = store();
        store
            .raw()
            .put("bad", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let result = store.get::<Sample>("bad").await;
        assert!(matches!(result, Err(AuthError::Persistence(_))));
    }
}
