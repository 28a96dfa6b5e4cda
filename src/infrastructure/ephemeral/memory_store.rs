use crate::domain::EphemeralStore;
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

struct Index {
    members: HashSet<String>,
    expires_at: Instant,
}

#[derive(Default)]
struct Maps {
    entries: HashMap<String, Entry>,
    indexes: HashMap<String, Index>,
}

/// Process-local TTL store.
///
/// State is not shared between instances and is lost on restart. Expired
/// entries are invisible to readers immediately and physically removed by
/// `purge_expired` (driven by the cleanup scheduler).
#[derive(Default)]
pub struct MemoryStore {
    // ---
    maps: Mutex<Maps>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    fn maps(&self) -> Result<std::sync::MutexGuard<'_, Maps>> {
        // ---
        self.maps
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))
    }
}

fn deadline(ttl: Duration) -> Instant {
    // ---
    Instant::now() + ttl
}

#[async_trait::async_trait]
impl EphemeralStore for MemoryStore {
    // ---
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // ---
        let maps = self.maps()?;
        let now = Instant::now();
        Ok(maps
            .entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        // ---
        let mut maps = self.maps()?;
        maps.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: deadline(ttl),
            },
        );
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();
        if maps.entries.get(key).is_some_and(|e| e.expires_at > now) {
            return Ok(false);
        }
        maps.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: deadline(ttl),
            },
        );
        Ok(true)
    }

    async fn put_if_present(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();
        match maps.entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.value = value;
                entry.expires_at = deadline(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();
        Ok(maps
            .entries
            .remove(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();
        Ok(maps
            .entries
            .remove(key)
            .is_some_and(|e| e.expires_at > now))
    }

    async fn index_add(&self, index: &str, member: &str, ttl: Duration) -> Result<()> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();
        let expires_at = deadline(ttl);

        let slot = maps.indexes.entry(index.to_string()).or_insert_with(|| Index {
            members: HashSet::new(),
            expires_at,
        });
        if slot.expires_at <= now {
            slot.members.clear();
        }
        slot.members.insert(member.to_string());
        slot.expires_at = expires_at;
        Ok(())
    }

    async fn index_remove(&self, index: &str, member: &str) -> Result<()> {
        // ---
        let mut maps = self.maps()?;
        if let Some(slot) = maps.indexes.get_mut(index) {
            slot.members.remove(member);
            if slot.members.is_empty() {
                maps.indexes.remove(index);
            }
        }
        Ok(())
    }

    async fn index_members(&self, index: &str) -> Result<Vec<String>> {
        // ---
        let maps = self.maps()?;
        let now = Instant::now();
        Ok(maps
            .indexes
            .get(index)
            .filter(|slot| slot.expires_at > now)
            .map(|slot| slot.members.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn purge_expired(&self) -> Result<u64> {
        // ---
        let mut maps = self.maps()?;
        let now = Instant::now();

        let before = maps.entries.len();
        maps.entries.retain(|_, e| e.expires_at > now);
        let removed = before - maps.entries.len();

        maps.indexes.retain(|_, slot| slot.expires_at > now);

        Ok(removed as u64)
    }
}
