//! Namespace operations for one mount: path validation against the
//! mount root, lookup, mkdir/rmdir/open/remove/readdir/stat.

use crate::common::{path, Error, Result};
use crate::config::MountConfig;
use crate::inode::Inode;
use crate::ring::ShardRing;
use crate::store::DataStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::file::{File, OpenFlags, Whence};

/// What stat reports: kind, stored mode bits and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub path: String,
    pub is_dir: bool,
    pub mode: u32,
    pub size: u64,
}

pub struct Filesystem {
    mount: MountConfig,
    ring: Arc<ShardRing>,
    store: DataStore,
    /// Read-through cache of inode descriptors; holds no state beyond
    /// the per-inode lock, so it never needs invalidation.
    inodes: RwLock<HashMap<String, Arc<Inode>>>,
}

impl Filesystem {
    /// Set up the mount and make sure its root directory inode exists.
    pub async fn new(ring: Arc<ShardRing>, mount: MountConfig) -> Result<Self> {
        let store = DataStore::new(ring.clone(), mount.stripe_size);
        let fs = Self {
            mount,
            ring,
            store,
            inodes: RwLock::new(HashMap::new()),
        };
        let root = fs.inode(&fs.mount.path).await;
        root.init_meta(true, 0o600).await?;
        tracing::info!(mount = %fs.mount.path, stripe_size = fs.mount.stripe_size, "mounted");
        Ok(fs)
    }

    pub fn root(&self) -> &str {
        &self.mount.path
    }

    /// Whether a cleaned absolute path falls under this mount.
    pub fn manages(&self, abs: &str) -> bool {
        self.mount.path == "/"
            || abs == self.mount.path
            || abs.starts_with(&format!("{}/", self.mount.path))
    }

    fn validate(&self, name: &str) -> Result<String> {
        let abs = path::absolutize(name)?;
        if !self.manages(&abs) {
            return Err(Error::NotManaged(abs));
        }
        Ok(abs)
    }

    async fn inode(&self, abs: &str) -> Arc<Inode> {
        if let Some(inode) = self.inodes.read().await.get(abs) {
            return inode.clone();
        }
        let mut inodes = self.inodes.write().await;
        inodes
            .entry(abs.to_string())
            .or_insert_with(|| {
                Arc::new(Inode::new(
                    self.ring.clone(),
                    self.store.clone(),
                    abs.to_string(),
                ))
            })
            .clone()
    }

    /// Resolve a validated path to `(parent, node-or-none)`. The parent
    /// must exist and be a directory; the mount root has no parent.
    async fn lookup(&self, abs: &str) -> Result<(Option<Arc<Inode>>, Option<Arc<Inode>>)> {
        if abs == self.mount.path {
            return Ok((None, Some(self.inode(abs).await)));
        }
        let parent_path =
            path::parent(abs).ok_or_else(|| Error::NotFound(abs.to_string()))?;
        let parent = self.inode(&parent_path).await;
        if !parent.exists().await? || !parent.is_dir().await? {
            return Err(Error::NotFound(parent_path));
        }
        let node = self.inode(abs).await;
        let node = if node.exists().await? { Some(node) } else { None };
        Ok((Some(parent), node))
    }

    pub async fn mkdir(&self, name: &str, mode: u32) -> Result<()> {
        let abs = self.validate(name)?;
        let (parent, node) = self.lookup(&abs).await?;
        if node.is_some() {
            return Err(Error::AlreadyExists(abs));
        }
        let dir = self.inode(&abs).await;
        dir.init_meta(true, mode).await?;
        if let Some(parent) = parent {
            parent.add_child(&abs).await?;
        }
        tracing::debug!(path = %abs, "mkdir");
        Ok(())
    }

    /// Directory entries as absolute paths, sorted by name.
    pub async fn read_dir(&self, name: &str) -> Result<Vec<String>> {
        let abs = self.validate(name)?;
        let (_, node) = self.lookup(&abs).await?;
        let node = node.ok_or_else(|| Error::NotFound(abs.clone()))?;
        if !node.is_dir().await? {
            return Err(Error::NotDirectory(abs));
        }
        let mut children = node.children().await?;
        children.sort();
        Ok(children)
    }

    pub async fn rmdir(&self, name: &str) -> Result<()> {
        let abs = self.validate(name)?;
        let (parent, node) = self.lookup(&abs).await?;
        let node = node.ok_or_else(|| Error::NotFound(abs.clone()))?;
        if !node.is_dir().await? {
            return Err(Error::NotDirectory(abs));
        }
        if !node.children().await?.is_empty() {
            return Err(Error::DirectoryNotEmpty(abs));
        }
        if let Some(parent) = parent {
            parent.remove_child(&abs).await?;
        }
        node.remove().await?;
        tracing::debug!(path = %abs, "rmdir");
        Ok(())
    }

    /// Remove a file or a whole directory tree.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let abs = self.validate(name)?;
        let (parent, node) = self.lookup(&abs).await?;
        let node = node.ok_or_else(|| Error::NotFound(abs.clone()))?;
        if let Some(parent) = parent {
            parent.remove_child(&abs).await?;
        }
        node.remove().await?;
        tracing::debug!(path = %abs, "removed");
        Ok(())
    }

    pub async fn stat(&self, name: &str) -> Result<FileStat> {
        let abs = self.validate(name)?;
        let (_, node) = self.lookup(&abs).await?;
        let node = node.ok_or_else(|| Error::NotFound(abs.clone()))?;
        Ok(FileStat {
            is_dir: node.is_dir().await?,
            mode: node.mode().await?,
            size: node.size().await?,
            path: abs,
        })
    }

    /// Symbolic links are not supported, so lstat is stat.
    pub async fn lstat(&self, name: &str) -> Result<FileStat> {
        self.stat(name).await
    }

    pub async fn open_file(&self, name: &str, flags: OpenFlags, mode: u32) -> Result<File> {
        let abs = self.validate(name)?;
        let (parent, node) = self.lookup(&abs).await?;

        let inode = match node {
            None => {
                if !flags.create() {
                    return Err(Error::NotFound(abs));
                }
                let inode = self.inode(&abs).await;
                inode.init_meta(false, mode).await?;
                if let Some(parent) = parent {
                    parent.add_child(&abs).await?;
                }
                tracing::debug!(path = %abs, "created file");
                inode
            }
            Some(inode) => {
                if flags.create() && flags.excl() {
                    return Err(Error::AlreadyExists(abs));
                }
                if inode.is_dir().await? {
                    return Err(Error::IsDirectory(abs));
                }
                inode
            }
        };

        if flags.trunc() {
            self.store.remove(&abs).await?;
        }

        let mut file = File::new(inode, self.store.clone(), flags.access_mode());
        if flags.append() {
            file.seek(0, Whence::End).await?;
        }
        Ok(file)
    }
}
