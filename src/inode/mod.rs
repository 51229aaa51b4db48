//! File and directory metadata as ring keys, keyed by absolute path.
//!
//! Each inode owns two keys, `{path}:mode` and `{path}:children`; the
//! braces are a hash tag, so both always land on the same shard. The
//! existence of `:children` is the directory marker — a sentinel empty
//! member keeps the set alive for empty directories — and a regular
//! file has no `:children` key at all.

use crate::common::{Error, Result};
use crate::ring::{Shard, ShardRing};
use crate::store::DataStore;
use std::sync::Arc;
use tokio::sync::RwLock;

const DIR_SENTINEL: &str = "";

pub struct Inode {
    path: String,
    ring: Arc<ShardRing>,
    store: DataStore,
    /// Held by file handles: read for reads, write for writes, seeks
    /// and truncates.
    lock: RwLock<()>,
}

impl Inode {
    pub fn new(ring: Arc<ShardRing>, store: DataStore, path: String) -> Self {
        Self {
            path,
            ring,
            store,
            lock: RwLock::new(()),
        }
    }

    fn sibling(&self, path: String) -> Inode {
        Inode::new(self.ring.clone(), self.store.clone(), path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lock(&self) -> &RwLock<()> {
        &self.lock
    }

    fn mode_key(&self) -> String {
        format!("{{{}}}:mode", self.path)
    }

    fn children_key(&self) -> String {
        format!("{{{}}}:children", self.path)
    }

    /// The shard holding this inode's metadata; both keys share the
    /// `{path}` tag.
    fn shard(&self) -> &Shard {
        self.ring.shard(&self.mode_key())
    }

    pub async fn exists(&self) -> Result<bool> {
        self.shard().exists(&self.mode_key()).await
    }

    pub async fn is_dir(&self) -> Result<bool> {
        self.shard().exists(&self.children_key()).await
    }

    /// Create the metadata keys; safe to retry and on concurrent
    /// creation the first mode wins.
    pub async fn init_meta(&self, is_dir: bool, mode: u32) -> Result<()> {
        let children_key = self.children_key();
        self.shard()
            .init_meta(
                &self.mode_key(),
                mode,
                is_dir.then_some(children_key.as_str()),
            )
            .await
    }

    pub async fn del_meta(&self) -> Result<()> {
        self.shard()
            .unlink(&[self.mode_key(), self.children_key()])
            .await
    }

    /// Access mode bits, as recorded at creation. Stored, not enforced.
    pub async fn mode(&self) -> Result<u32> {
        let raw = match self.shard().get(&self.mode_key()).await {
            Ok(raw) => raw,
            Err(Error::KeyNotFound(_)) => return Err(Error::NotFound(self.path.clone())),
            Err(e) => return Err(e),
        };
        String::from_utf8_lossy(&raw)
            .parse()
            .map_err(|_| Error::Transport(format!("corrupt mode bits for {}", self.path)))
    }

    pub async fn add_child(&self, child_path: &str) -> Result<()> {
        self.shard().sadd(&self.children_key(), child_path).await
    }

    pub async fn remove_child(&self, child_path: &str) -> Result<()> {
        self.shard().srem(&self.children_key(), child_path).await
    }

    /// Absolute paths of this directory's entries, sentinel excluded.
    pub async fn children(&self) -> Result<Vec<String>> {
        let members = self.shard().smembers(&self.children_key()).await?;
        Ok(members.into_iter().filter(|m| m != DIR_SENTINEL).collect())
    }

    pub async fn size(&self) -> Result<u64> {
        if self.is_dir().await? {
            return Ok(0);
        }
        self.store.size(&self.path).await
    }

    /// Remove this inode and, for directories, everything below it.
    /// File data goes before metadata so a crashed removal never leaves
    /// orphaned stripes behind a missing inode.
    pub async fn remove(&self) -> Result<()> {
        // collect the subtree in parent-before-child order
        let mut stack = vec![self.path.clone()];
        let mut subtree: Vec<(String, bool)> = Vec::new();
        while let Some(path) = stack.pop() {
            let node = self.sibling(path.clone());
            let is_dir = node.is_dir().await?;
            if is_dir {
                stack.extend(node.children().await?);
            }
            subtree.push((path, is_dir));
        }
        // delete children before their parents
        for (path, is_dir) in subtree.into_iter().rev() {
            let node = self.sibling(path);
            if !is_dir {
                self.store.remove(node.path()).await?;
            }
            node.del_meta().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Arc<ShardRing>, DataStore) {
        let ring = Arc::new(ShardRing::in_memory(4));
        let store = DataStore::new(ring.clone(), 100);
        (ring, store)
    }

    fn inode(ring: &Arc<ShardRing>, store: &DataStore, path: &str) -> Inode {
        Inode::new(ring.clone(), store.clone(), path.to_string())
    }

    #[tokio::test]
    async fn test_file_lifecycle() {
        let (ring, store) = fixture();
        let node = inode(&ring, &store, "/mnt/f");

        assert!(!node.exists().await.unwrap());
        node.init_meta(false, 0o644).await.unwrap();
        assert!(node.exists().await.unwrap());
        assert!(!node.is_dir().await.unwrap());
        assert_eq!(node.mode().await.unwrap(), 0o644);

        node.del_meta().await.unwrap();
        assert!(!node.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_directory_children() {
        let (ring, store) = fixture();
        let dir = inode(&ring, &store, "/mnt/d");
        dir.init_meta(true, 0o755).await.unwrap();
        assert!(dir.is_dir().await.unwrap());

        // empty directory: the sentinel is filtered out
        assert!(dir.children().await.unwrap().is_empty());

        dir.add_child("/mnt/d/a").await.unwrap();
        dir.add_child("/mnt/d/b").await.unwrap();
        let mut children = dir.children().await.unwrap();
        children.sort();
        assert_eq!(children, vec!["/mnt/d/a", "/mnt/d/b"]);

        dir.remove_child("/mnt/d/a").await.unwrap();
        assert_eq!(dir.children().await.unwrap(), vec!["/mnt/d/b"]);
        // still a directory with the last real child gone
        dir.remove_child("/mnt/d/b").await.unwrap();
        assert!(dir.is_dir().await.unwrap());
    }

    #[tokio::test]
    async fn test_init_meta_idempotent() {
        let (ring, store) = fixture();
        let dir = inode(&ring, &store, "/mnt/d");
        dir.init_meta(true, 0o755).await.unwrap();
        dir.add_child("/mnt/d/a").await.unwrap();

        dir.init_meta(true, 0o700).await.unwrap();
        assert_eq!(dir.mode().await.unwrap(), 0o755);
        assert_eq!(dir.children().await.unwrap(), vec!["/mnt/d/a"]);
    }

    #[tokio::test]
    async fn test_file_size_tracks_data() {
        let (ring, store) = fixture();
        let node = inode(&ring, &store, "/mnt/f");
        node.init_meta(false, 0o644).await.unwrap();

        assert_eq!(node.size().await.unwrap(), 0);
        store.write_at("/mnt/f", 0, &vec![1u8; 250]).await.unwrap();
        assert_eq!(node.size().await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_cascading_remove() {
        let (ring, store) = fixture();
        let root = inode(&ring, &store, "/mnt");
        root.init_meta(true, 0o755).await.unwrap();

        let dir = inode(&ring, &store, "/mnt/d");
        dir.init_meta(true, 0o755).await.unwrap();
        root.add_child("/mnt/d").await.unwrap();

        let sub = inode(&ring, &store, "/mnt/d/sub");
        sub.init_meta(true, 0o755).await.unwrap();
        dir.add_child("/mnt/d/sub").await.unwrap();

        let file = inode(&ring, &store, "/mnt/d/sub/f");
        file.init_meta(false, 0o644).await.unwrap();
        sub.add_child("/mnt/d/sub/f").await.unwrap();
        store
            .write_at("/mnt/d/sub/f", 0, &vec![1u8; 300])
            .await
            .unwrap();

        dir.remove().await.unwrap();

        assert!(!dir.exists().await.unwrap());
        assert!(!sub.exists().await.unwrap());
        assert!(!file.exists().await.unwrap());
        assert_eq!(store.size("/mnt/d/sub/f").await.unwrap(), 0);
        // the parent keeps its own metadata
        assert!(root.is_dir().await.unwrap());
    }

    #[tokio::test]
    async fn test_meta_keys_colocate() {
        let (ring, store) = fixture();
        for i in 0..20 {
            let node = inode(&ring, &store, &format!("/mnt/file-{i}"));
            let mode_shard = ring.shard(&node.mode_key()).id.clone();
            let children_shard = ring.shard(&node.children_key()).id.clone();
            assert_eq!(mode_shard, children_shard);
        }
    }
}
