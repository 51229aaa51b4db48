//! Simple in-memory shard for testing and development.
//!
//! Implements the same command surface as a Redis shard, including
//! SETRANGE zero-padding, inclusive GETRANGE clamping, and set key
//! removal when the last member is gone. One lock per shard stands in
//! for the server's command serialisation.

use crate::common::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

use super::client::ShardCommands;

#[derive(Default)]
struct ShardState {
    strings: HashMap<String, Vec<u8>>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl ShardState {
    fn set_range(&mut self, key: &str, offset: u64, data: &[u8]) {
        let value = self.strings.entry(key.to_string()).or_default();
        let end = offset as usize + data.len();
        if value.len() < end {
            value.resize(end, 0);
        }
        value[offset as usize..end].copy_from_slice(data);
    }

    fn get_range(&self, key: &str, start: u64, end: u64) -> Bytes {
        match self.strings.get(key) {
            None => Bytes::new(),
            Some(value) => {
                let start = start as usize;
                if start >= value.len() {
                    return Bytes::new();
                }
                let end = (end as usize).min(value.len() - 1);
                Bytes::copy_from_slice(&value[start..=end])
            }
        }
    }

    fn sadd(&mut self, key: &str, member: &str) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
    }

    fn srem(&mut self, key: &str, member: &str) {
        if let Some(set) = self.sets.get_mut(key) {
            set.remove(member);
            if set.is_empty() {
                self.sets.remove(key);
            }
        }
    }

    fn unlink(&mut self, key: &str) {
        self.strings.remove(key);
        self.sets.remove(key);
    }
}

#[derive(Default)]
pub struct MemShard {
    state: Mutex<ShardState>,
}

impl MemShard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShardCommands for MemShard {
    async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.strings.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn setnx(&self, key: &str, data: &[u8]) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.strings.contains_key(key) {
            return Ok(false);
        }
        state.strings.insert(key.to_string(), data.to_vec());
        Ok(true)
    }

    async fn set_range(&self, key: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.set_range(key, offset, data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let state = self.state.lock().await;
        state
            .strings
            .get(key)
            .map(|v| Bytes::copy_from_slice(v))
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        let state = self.state.lock().await;
        Ok(state.get_range(key, start, end))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.strings.contains_key(key) || state.sets.contains_key(key))
    }

    async fn unlink(&self, keys: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        for key in keys {
            state.unlink(key);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.sadd(key, member);
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.srem(key, member);
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn write_stripe(
        &self,
        set_key: &str,
        id: u64,
        data_key: &str,
        offset: u64,
        data: &[u8],
        full: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.sadd(set_key, &id.to_string());
        if full {
            state.strings.insert(data_key.to_string(), data.to_vec());
        } else {
            state.set_range(data_key, offset, data);
        }
        Ok(())
    }

    async fn drop_stripe(&self, set_key: &str, id: u64, data_key: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.srem(set_key, &id.to_string());
        state.unlink(data_key);
        Ok(())
    }

    async fn trim(&self, key: &str, new_len: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        let prefix = state.get_range(key, 0, new_len.saturating_sub(1));
        state.strings.insert(key.to_string(), prefix.to_vec());
        Ok(())
    }

    async fn init_meta(
        &self,
        mode_key: &str,
        mode: u32,
        children_key: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(children_key) = children_key {
            state.sadd(children_key, "");
        }
        if !state.strings.contains_key(mode_key) {
            state
                .strings
                .insert(mode_key.to_string(), mode.to_string().into_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_range_zero_pads() {
        let shard = MemShard::new();
        shard.set_range("k", 5, b"abc").await.unwrap();
        let value = shard.get("k").await.unwrap();
        assert_eq!(&value[..], b"\0\0\0\0\0abc");
    }

    #[tokio::test]
    async fn test_get_range_clamps() {
        let shard = MemShard::new();
        shard.set("k", b"0123456789").await.unwrap();
        assert_eq!(&shard.get_range("k", 2, 4).await.unwrap()[..], b"234");
        assert_eq!(&shard.get_range("k", 5, 100).await.unwrap()[..], b"56789");
        assert!(shard.get_range("k", 20, 30).await.unwrap().is_empty());
        assert!(shard.get_range("missing", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let shard = MemShard::new();
        assert!(matches!(shard.get("nope").await, Err(Error::KeyNotFound(_))));
    }

    #[tokio::test]
    async fn test_sets() {
        let shard = MemShard::new();
        shard.sadd("s", "a").await.unwrap();
        shard.sadd("s", "b").await.unwrap();
        shard.sadd("s", "a").await.unwrap();
        assert_eq!(shard.smembers("s").await.unwrap(), vec!["a", "b"]);
        assert!(shard.exists("s").await.unwrap());

        shard.srem("s", "a").await.unwrap();
        shard.srem("s", "b").await.unwrap();
        // emptied sets disappear, like on the server
        assert!(!shard.exists("s").await.unwrap());
        assert!(shard.smembers("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_and_drop_stripe() {
        let shard = MemShard::new();
        shard
            .write_stripe("f:stripes", 3, "f:3", 0, b"hello", false)
            .await
            .unwrap();
        assert_eq!(shard.smembers("f:stripes").await.unwrap(), vec!["3"]);
        assert_eq!(&shard.get("f:3").await.unwrap()[..], b"hello");

        shard.drop_stripe("f:stripes", 3, "f:3").await.unwrap();
        assert!(shard.smembers("f:stripes").await.unwrap().is_empty());
        assert!(shard.get("f:3").await.is_err());
    }

    #[tokio::test]
    async fn test_trim() {
        let shard = MemShard::new();
        shard.set("k", b"0123456789").await.unwrap();
        shard.trim("k", 4).await.unwrap();
        assert_eq!(&shard.get("k").await.unwrap()[..], b"0123");
    }

    #[tokio::test]
    async fn test_init_meta_idempotent() {
        let shard = MemShard::new();
        shard
            .init_meta("{/d}:mode", 0o755, Some("{/d}:children"))
            .await
            .unwrap();
        shard.sadd("{/d}:children", "/d/x").await.unwrap();
        // retried creation keeps existing mode and children
        shard
            .init_meta("{/d}:mode", 0o700, Some("{/d}:children"))
            .await
            .unwrap();
        assert_eq!(&shard.get("{/d}:mode").await.unwrap()[..], b"493");
        assert_eq!(
            shard.smembers("{/d}:children").await.unwrap(),
            vec!["", "/d/x"]
        );
    }
}
