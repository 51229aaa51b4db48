//! Consistent hashing over the shard ids.
//!
//! Every shard id is inserted as `replicas` virtual points on a hash
//! circle; a key is served by the first point at or after its own hash,
//! wrapping around at the end of the circle. CRC32-IEEE keeps the point
//! placement stable across processes and languages.

use std::collections::HashMap;

pub const DEFAULT_REPLICAS: usize = 100;

pub struct ConsistentHash {
    replicas: usize,
    points: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl ConsistentHash {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas: replicas.max(1),
            points: Vec::new(),
            owners: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Add shard ids to the circle.
    pub fn add<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        for id in ids {
            for i in 0..self.replicas {
                let point = crc32fast::hash(format!("{i}{id}").as_bytes());
                self.points.push(point);
                self.owners.insert(point, id.clone());
            }
        }
        self.points.sort_unstable();
    }

    /// Id of the shard owning `key`, None on an empty circle.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.is_empty() {
            return None;
        }
        let hash = crc32fast::hash(key.as_bytes());
        let idx = self.points.partition_point(|p| *p < hash);
        let point = if idx == self.points.len() {
            self.points[0]
        } else {
            self.points[idx]
        };
        self.owners.get(&point).map(String::as_str)
    }
}
