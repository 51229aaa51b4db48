//! Typed command surface of a single key-value shard, and its
//! Redis-backed implementation.

use crate::common::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Lua used to shrink the last stripe of a file: read the surviving
/// prefix and write it back in one server-side step so no concurrent
/// reader observes a transient value.
const TRIM_SCRIPT: &str = r#"local str = redis.call("GETRANGE", KEYS[1], 0, ARGV[1])
return redis.call("SET", KEYS[1], str)"#;

/// Commands the upper layers issue against one shard.
///
/// Plain commands mirror the Redis command set; the compound operations
/// (`write_stripe`, `drop_stripe`, `trim`, `init_meta`) are executed
/// atomically on the shard (MULTI/EXEC pipelines or Lua).
#[async_trait]
pub trait ShardCommands: Send + Sync {
    async fn set(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Set `key` only if it does not exist yet; true when the value was
    /// written.
    async fn setnx(&self, key: &str, data: &[u8]) -> Result<bool>;

    async fn set_range(&self, key: &str, offset: u64, data: &[u8]) -> Result<()>;

    /// Full value of `key`; `Error::KeyNotFound` when missing.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Bytes in the inclusive range `[start, end]`, clamped to the
    /// value's length; empty for a missing key.
    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn unlink(&self, keys: &[String]) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Record stripe membership and write the stripe bytes in one
    /// atomic step. Full aligned stripes replace the whole value; the
    /// rest patch a range (the shard zero-pads any gap).
    async fn write_stripe(
        &self,
        set_key: &str,
        id: u64,
        data_key: &str,
        offset: u64,
        data: &[u8],
        full: bool,
    ) -> Result<()>;

    /// Drop stripe membership and data in one atomic step.
    async fn drop_stripe(&self, set_key: &str, id: u64, data_key: &str) -> Result<()>;

    /// Atomically replace the value of `key` with its first `new_len`
    /// bytes; `new_len` must be at least 1.
    async fn trim(&self, key: &str, new_len: u64) -> Result<()>;

    /// Create inode metadata: sentinel member in the children set for
    /// directories, mode bits unless already present. Idempotent.
    async fn init_meta(&self, mode_key: &str, mode: u32, children_key: Option<&str>)
        -> Result<()>;

    /// Release the shard's connections.
    fn close(&self) {}
}

/// A client to a single Redis shard behind a bounded connection pool.
/// Callers queue when the pool is exhausted, which throttles the
/// per-stripe fan-out of large transfers.
pub struct RedisShard {
    pool: deadpool_redis::Pool,
    addr: String,
}

impl RedisShard {
    pub fn connect(addr: &str, max_connections: usize) -> Result<Self> {
        // Bare ":6379" style addresses mean localhost.
        let url = if addr.starts_with(':') {
            format!("redis://127.0.0.1{addr}")
        } else {
            format!("redis://{addr}")
        };
        let mut cfg = deadpool_redis::Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(max_connections.max(1)));
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("shard pool for {addr}: {e}")))?;
        Ok(Self {
            pool,
            addr: addr.to_string(),
        })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Transport(format!("{}: {}", self.addr, e)))
    }

    fn transport(&self, err: redis::RedisError) -> Error {
        Error::Transport(format!("{}: {}", self.addr, err))
    }
}

#[async_trait]
impl ShardCommands for RedisShard {
    async fn set(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(data)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn setnx(&self, key: &str, data: &[u8]) -> Result<bool> {
        let mut conn = self.conn().await?;
        let set: i64 = redis::cmd("SETNX")
            .arg(key)
            .arg(data)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(set != 0)
    }

    async fn set_range(&self, key: &str, offset: u64, data: &[u8]) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SETRANGE")
            .arg(key)
            .arg(offset)
            .arg(data)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        value
            .map(Bytes::from)
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    async fn get_range(&self, key: &str, start: u64, end: u64) -> Result<Bytes> {
        let mut conn = self.conn().await?;
        let value: Vec<u8> = redis::cmd("GETRANGE")
            .arg(key)
            .arg(start)
            .arg(end)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(Bytes::from(value))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let n: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(n != 0)
    }

    async fn unlink(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("UNLINK")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))
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
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SADD").arg(set_key).arg(id).ignore();
        if full {
            pipe.cmd("SET").arg(data_key).arg(data).ignore();
        } else {
            pipe.cmd("SETRANGE").arg(data_key).arg(offset).arg(data).ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn drop_stripe(&self, set_key: &str, id: u64, data_key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SREM").arg(set_key).arg(id).ignore();
        pipe.cmd("UNLINK").arg(data_key).ignore();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn trim(&self, key: &str, new_len: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::Script::new(TRIM_SCRIPT)
            .key(key)
            .arg(new_len.saturating_sub(1))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    async fn init_meta(
        &self,
        mode_key: &str,
        mode: u32,
        children_key: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(children_key) = children_key {
            pipe.cmd("SADD").arg(children_key).arg("").ignore();
        }
        pipe.cmd("SETNX").arg(mode_key).arg(mode.to_string()).ignore();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| self.transport(e))?;
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
    }
}
