//! The data store persists one unstructured byte sequence per file
//! name, stripped across the ring.
//!
//! Stripe `i` of file `name` lives under key `name:i` on the shard the
//! consistent hash assigns to that key, so the stripes of one file
//! spread over the whole ring. Each shard additionally keeps a
//! `name:stripes` set of the stripe ids it holds; the file size is
//! derived from those sets and the last stripe's length instead of a
//! central size key.

pub mod layout;

use crate::common::{Error, Result};
use crate::ring::ShardRing;
use bytes::Bytes;
use futures::future;
use layout::{stripe_layout, StripeInfo};
use std::sync::Arc;

#[derive(Clone)]
pub struct DataStore {
    ring: Arc<ShardRing>,
    stripe_size: u64,
}

impl DataStore {
    pub fn new(ring: Arc<ShardRing>, stripe_size: u64) -> Self {
        Self { ring, stripe_size }
    }

    pub fn stripe_size(&self) -> u64 {
        self.stripe_size
    }

    fn stripe_key(name: &str, id: u64) -> String {
        format!("{name}:{id}")
    }

    fn set_key(name: &str) -> String {
        format!("{name}:stripes")
    }

    /// Write `data` at byte offset `off`, one concurrent task per
    /// stripe. Each task records stripe membership and writes the bytes
    /// atomically on its shard.
    pub async fn write_at(&self, name: &str, off: u64, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let stripes = stripe_layout(self.stripe_size, off, data.len() as u64);
        tracing::debug!(name, off, len = data.len(), stripes = stripes.len(), "write");

        let mut tasks = Vec::with_capacity(stripes.len());
        let mut k = 0usize;
        for stripe in stripes {
            let chunk = &data[k..k + stripe.len as usize];
            k += stripe.len as usize;
            tasks.push(self.write_stripe(name, stripe, chunk));
        }
        future::try_join_all(tasks).await?;
        Ok(())
    }

    async fn write_stripe(&self, name: &str, stripe: StripeInfo, chunk: &[u8]) -> Result<()> {
        let key = Self::stripe_key(name, stripe.id);
        let full = stripe.off == 0 && chunk.len() as u64 == self.stripe_size;
        self.ring
            .shard(&key)
            .write_stripe(
                &Self::set_key(name),
                stripe.id,
                &key,
                stripe.off,
                chunk,
                full,
            )
            .await
    }

    /// Read into `dst` from byte offset `off`, one concurrent task per
    /// stripe. Missing stripes leave their part of `dst` untouched and
    /// contribute nothing to the returned count.
    pub async fn read_at(&self, name: &str, off: u64, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        let stripes = stripe_layout(self.stripe_size, off, dst.len() as u64);
        tracing::debug!(name, off, len = dst.len(), stripes = stripes.len(), "read");

        let mut tasks = Vec::with_capacity(stripes.len());
        let mut rest = dst;
        for stripe in stripes {
            let (chunk, tail) = std::mem::take(&mut rest).split_at_mut(stripe.len as usize);
            rest = tail;
            tasks.push(self.read_stripe(name, stripe, chunk));
        }
        let counts = future::try_join_all(tasks).await?;
        Ok(counts.into_iter().sum())
    }

    async fn read_stripe(
        &self,
        name: &str,
        stripe: StripeInfo,
        dst: &mut [u8],
    ) -> Result<usize> {
        let key = Self::stripe_key(name, stripe.id);
        let shard = self.ring.shard(&key);
        let data = if stripe.off == 0 && stripe.len == self.stripe_size {
            match shard.get(&key).await {
                Ok(data) => data,
                Err(Error::KeyNotFound(_)) => Bytes::new(),
                Err(e) => return Err(e),
            }
        } else {
            shard
                .get_range(&key, stripe.off, stripe.off + stripe.len - 1)
                .await?
        };
        let n = data.len().min(dst.len());
        dst[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    /// Highest stripe id any shard reports for `name`.
    async fn last_stripe(&self, name: &str) -> Result<Option<u64>> {
        let set_key = Self::set_key(name);
        let tasks = self.ring.shards().iter().map(|s| s.smembers(&set_key));
        let members = future::try_join_all(tasks).await?;
        Ok(members
            .into_iter()
            .flatten()
            .filter_map(|id| id.parse::<u64>().ok())
            .max())
    }

    /// Total size of `name`: the highest recorded stripe id times the
    /// stripe size, plus the length of that last stripe. 0 when no
    /// shard holds any stripe.
    pub async fn size(&self, name: &str) -> Result<u64> {
        let Some(last) = self.last_stripe(name).await? else {
            return Ok(0);
        };
        let key = Self::stripe_key(name, last);
        let last_len = match self.ring.shard(&key).get(&key).await {
            Ok(data) => data.len() as u64,
            Err(Error::KeyNotFound(_)) => 0,
            Err(e) => return Err(e),
        };
        Ok(last * self.stripe_size + last_len)
    }

    /// Drop every stripe of `name` on every shard.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let Some(last) = self.last_stripe(name).await? else {
            return Ok(());
        };
        self.drop_stripes(name, 0, last).await
    }

    async fn drop_stripes(&self, name: &str, from: u64, to: u64) -> Result<()> {
        let set_key = Self::set_key(name);
        let tasks = (from..=to).map(|id| {
            let key = Self::stripe_key(name, id);
            let set_key = &set_key;
            async move {
                self.ring
                    .shard(&key)
                    .drop_stripe(set_key, id, &key)
                    .await
            }
        });
        future::try_join_all(tasks).await?;
        Ok(())
    }

    /// Change the size of `name` to `new_size`: shrinking drops stripes
    /// past the new end and trims the new last stripe, growing
    /// zero-fills without transferring zeros.
    pub async fn resize(&self, name: &str, new_size: u64) -> Result<()> {
        let cur_size = self.size(name).await?;
        match new_size.cmp(&cur_size) {
            std::cmp::Ordering::Equal => Ok(()),
            std::cmp::Ordering::Less => self.shrink(name, new_size, cur_size).await,
            std::cmp::Ordering::Greater => self.grow(name, new_size, cur_size).await,
        }
    }

    async fn shrink(&self, name: &str, new_size: u64, cur_size: u64) -> Result<()> {
        tracing::debug!(name, new_size, cur_size, "shrink");
        let cur_last = (cur_size - 1) / self.stripe_size;
        if new_size == 0 {
            return self.drop_stripes(name, 0, cur_last).await;
        }
        let new_last = (new_size - 1) / self.stripe_size;
        let new_last_len = (new_size - 1) % self.stripe_size + 1;

        if new_last < cur_last {
            self.drop_stripes(name, new_last + 1, cur_last).await?;
        }
        let key = Self::stripe_key(name, new_last);
        self.ring.shard(&key).trim(&key, new_last_len).await
    }

    async fn grow(&self, name: &str, new_size: u64, cur_size: u64) -> Result<()> {
        tracing::debug!(name, new_size, cur_size, "grow");
        let new_last = (new_size - 1) / self.stripe_size;
        let new_last_len = (new_size - 1) % self.stripe_size + 1;

        // Each pad is a single NUL byte placed at the stripe's final
        // position; the shard zero-fills everything before it. The new
        // last stripe is padded to its exact logical length so the
        // derived size comes out to new_size.
        let mut pads: Vec<(u64, u64)> = Vec::new();
        let first_new = if cur_size == 0 {
            0
        } else {
            let cur_last = (cur_size - 1) / self.stripe_size;
            let cur_last_len = (cur_size - 1) % self.stripe_size + 1;
            if new_last > cur_last && cur_last_len < self.stripe_size {
                pads.push((cur_last, self.stripe_size - 1));
            }
            cur_last + 1
        };
        for id in first_new..new_last {
            pads.push((id, self.stripe_size - 1));
        }
        pads.push((new_last, new_last_len - 1));

        let set_key = Self::set_key(name);
        let tasks = pads.into_iter().map(|(id, pos)| {
            let key = Self::stripe_key(name, id);
            let set_key = &set_key;
            async move {
                self.ring
                    .shard(&key)
                    .write_stripe(set_key, id, &key, pos, &[0], false)
                    .await
            }
        });
        future::try_join_all(tasks).await?;
        Ok(())
    }
}
