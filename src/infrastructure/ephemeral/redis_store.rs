use crate::domain::EphemeralStore;
use anyhow::{Context, Result};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Redis-backed TTL store shared by every service instance.
///
/// Expiry is native (`SET .. EX`), so `purge_expired` has nothing to do.
/// Conditional writes map to `SET .. NX` and `SET .. XX`.
/// Index sets are plain Redis sets whose lifetime is reset on every insert.
#[derive(Clone)]
pub struct RedisStore {
    // ---
    client: Client,
    prefix: String,
}

impl RedisStore {
    // ---
    pub fn new(client: Client, prefix: impl Into<String>) -> Self {
        // ---
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// Creates a new multiplexed Redis connection.
    async fn conn(&self) -> Result<MultiplexedConnection> {
        // ---
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| {
                tracing::error!("Failed to connect to Redis: {:?}", err);
                err
            })
            .context("Redis connection failed")
    }

    fn key(&self, key: &str) -> String {
        // ---
        format!("{}{}", self.prefix, key)
    }
}

/// Redis rejects `EX 0`; anything shorter than a second still lives one second.
fn ttl_secs(ttl: Duration) -> u64 {
    // ---
    ttl.as_secs().max(1)
}

#[async_trait::async_trait]
impl EphemeralStore for RedisStore {
    // ---
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // ---
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        // ---
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(self.key(key), value, ttl_secs(ttl))
            .await?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        // ---
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn put_if_present(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        // ---
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("XX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // ---
        // GETDEL: at most one caller ever sees the value.
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get_del(self.key(key)).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        // ---
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(self.key(key)).await?;
        Ok(removed > 0)
    }

    async fn index_add(&self, index: &str, member: &str, ttl: Duration) -> Result<()> {
        // ---
        let mut conn = self.conn().await?;
        let index = self.key(index);
        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&index)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(&index)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn index_remove(&self, index: &str, member: &str) -> Result<()> {
        // ---
        let mut conn = self.conn().await?;
        let _: i64 = conn.srem(self.key(index), member).await?;
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>> {
        // ---
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(self.key(index)).await?;
        Ok(members)
    }

    async fn purge_expired(&self) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn sub_second_ttls_round_up() {
        // ---
        assert_eq!(ttl_secs(Duration::ZERO), 1);
        assert_eq!(ttl_secs(Duration::from_millis(1500)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(300)), 300);
    }

    #[tokio::test]
    async fn unreachable_redis_surfaces_an_error() {
        // ---
        let client = Client::open("redis://invalid-host:6379").unwrap();
        let store = RedisStore::new(client, "test:");

        assert!(store.get("anything").await.is_err());
    }
}
