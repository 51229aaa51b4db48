//! The shard ring: a fixed set of key-value shards plus the consistent
//! hash mapping any key to exactly one of them.

pub mod client;
pub mod hash;
pub mod mem;

pub use client::{RedisShard, ShardCommands};
pub use mem::MemShard;

use crate::common::{Error, Result};
use hash::{ConsistentHash, DEFAULT_REPLICAS};
use std::ops::Deref;
use std::sync::Arc;

/// One shard of the ring: a stable id plus its command client.
pub struct Shard {
    pub id: String,
    client: Arc<dyn ShardCommands>,
}

impl Deref for Shard {
    type Target = dyn ShardCommands;

    fn deref(&self) -> &Self::Target {
        self.client.as_ref()
    }
}

/// Immutable shard set with consistent-hash routing. Shard ids are
/// `"0".."N-1"` in address order, so placement only depends on the
/// configured address list.
pub struct ShardRing {
    shards: Vec<Arc<Shard>>,
    hash: ConsistentHash,
}

impl ShardRing {
    /// Ring over Redis shards, one bounded connection pool each.
    pub fn connect(addrs: &[String], max_connections: usize) -> Result<Self> {
        if addrs.is_empty() {
            return Err(Error::Config("no shard addresses configured".to_string()));
        }
        let mut clients: Vec<Arc<dyn ShardCommands>> = Vec::with_capacity(addrs.len());
        for addr in addrs {
            clients.push(Arc::new(RedisShard::connect(addr, max_connections)?));
        }
        Ok(Self::from_clients(clients))
    }

    /// Ring over in-memory shards, for tests and development.
    pub fn in_memory(shard_count: usize) -> Self {
        let clients: Vec<Arc<dyn ShardCommands>> = (0..shard_count.max(1))
            .map(|_| Arc::new(MemShard::new()) as Arc<dyn ShardCommands>)
            .collect();
        Self::from_clients(clients)
    }

    pub fn from_clients(clients: Vec<Arc<dyn ShardCommands>>) -> Self {
        let shards: Vec<Arc<Shard>> = clients
            .into_iter()
            .enumerate()
            .map(|(i, client)| {
                Arc::new(Shard {
                    id: i.to_string(),
                    client,
                })
            })
            .collect();
        let mut hash = ConsistentHash::new(DEFAULT_REPLICAS);
        hash.add(shards.iter().map(|s| s.id.clone()));
        Self { shards, hash }
    }

    /// The shard owning `key`, honouring the `{...}` hash-tag rule.
    pub fn shard(&self, key: &str) -> &Shard {
        let idx = self
            .hash
            .get(hash_tag(key))
            .and_then(|id| id.parse::<usize>().ok())
            .unwrap_or(0);
        &self.shards[idx]
    }

    pub fn shards(&self) -> &[Arc<Shard>] {
        &self.shards
    }

    pub fn close(&self) {
        for shard in &self.shards {
            shard.close();
        }
    }
}

/// If the key contains a `{...}` substring, only the part between the
/// first `{` and the first following `}` is hashed. All keys sharing a
/// tag land on the same shard.
fn hash_tag(key: &str) -> &str {
    if let Some(start) = key.find('{') {
        if let Some(end) = key[start + 1..].find('}') {
            if end > 0 {
                return &key[start + 1..start + 1 + end];
            }
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_tag() {
        assert_eq!(hash_tag("{/scratch/f}:mode"), "/scratch/f");
        assert_eq!(hash_tag("plain-key"), "plain-key");
        assert_eq!(hash_tag("{}:mode"), "{}:mode");
        assert_eq!(hash_tag("{unclosed"), "{unclosed");
        assert_eq!(hash_tag("a{b}c{d}"), "b");
    }

    #[test]
    fn test_tagged_keys_colocate() {
        let ring = ShardRing::in_memory(8);
        for i in 0..50 {
            let path = format!("/scratch/job/file-{i}");
            let mode = ring.shard(&format!("{{{path}}}:mode")).id.clone();
            let children = ring.shard(&format!("{{{path}}}:children")).id.clone();
            assert_eq!(mode, children);
        }
    }

    #[test]
    fn test_untagged_stripes_spread() {
        let ring = ShardRing::in_memory(4);
        let mut seen = std::collections::HashSet::new();
        for id in 0..200 {
            seen.insert(ring.shard(&format!("/scratch/out.dat:{id}")).id.clone());
        }
        assert!(seen.len() > 1);
    }
}
