//! The filesystem facade the interception layer talks to: one
//! process-wide [`StripeFs`] owning the mount table and the open
//! descriptor table, with POSIX-shaped entry points.

pub mod file;
pub mod filesystem;

pub use file::{AccessMode, File, OpenFlags, Whence};
pub use filesystem::{FileStat, Filesystem};

use crate::common::{path, Error, Result};
use crate::config::Config;
use crate::ring::ShardRing;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Synthetic statfs/statvfs answer. The type tag masquerades as a
/// Lustre filesystem so MPI-IO and friends pick their parallel-fs code
/// paths; the counts just have to be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub fs_type: i64,
    pub block_size: i64,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_avail: u64,
    pub files: u64,
    pub files_free: u64,
}

pub const SYNTHETIC_STATFS: FsStats = FsStats {
    fs_type: 0x0BD0_0BD0,
    block_size: 1,
    blocks: 1,
    blocks_free: 1,
    blocks_avail: 1,
    files: 1,
    files_free: 1,
};

/// The process-wide virtual filesystem: every intercepted call lands
/// here. Descriptors are assigned by the interception layer and mapped
/// to open files in one table, serialised like the original
/// process-wide lock.
pub struct StripeFs {
    mounts: Vec<Filesystem>,
    files: Mutex<HashMap<i32, File>>,
    ring: Arc<ShardRing>,
}

impl StripeFs {
    /// Connect to the configured shards and set up every mount.
    pub async fn new(conf: Config) -> Result<Self> {
        let ring = Arc::new(ShardRing::connect(
            &conf.shards.addrs,
            conf.shards.max_connections,
        )?);
        Self::with_ring(conf, ring).await
    }

    /// Like [`StripeFs::new`] but over a caller-provided ring.
    pub async fn with_ring(conf: Config, ring: Arc<ShardRing>) -> Result<Self> {
        if conf.mounts.is_empty() {
            return Err(Error::Config("no mount path configured".to_string()));
        }
        let mut mounts = Vec::with_capacity(conf.mounts.len());
        for mount in conf.mounts.values() {
            mounts.push(Filesystem::new(ring.clone(), mount.clone()).await?);
        }
        Ok(Self {
            mounts,
            files: Mutex::new(HashMap::new()),
            ring,
        })
    }

    /// Full startup path for the preloaded library: logging, config
    /// from the environment, shard connections.
    pub async fn from_env() -> Result<Self> {
        crate::config::init_logging();
        let conf = Config::load()?;
        Self::new(conf).await
    }

    /// Whether `name` falls under one of the mounts; the trampoline
    /// forwards everything else to the real libc.
    pub fn is_managed(&self, name: &str) -> bool {
        self.mount_for(name).is_ok()
    }

    fn mount_for(&self, name: &str) -> Result<&Filesystem> {
        if name.is_empty() {
            return Err(Error::NotManaged(String::new()));
        }
        let abs = path::absolutize(name)?;
        self.mounts
            .iter()
            .find(|fs| fs.manages(&abs))
            .ok_or(Error::NotManaged(abs))
    }

    /// Open `name` and register it under the descriptor the caller
    /// picked. Returns the descriptor.
    pub async fn open(&self, name: &str, flags: i32, mode: u32, fd: i32) -> Result<i32> {
        let file = self
            .mount_for(name)?
            .open_file(name, OpenFlags(flags), mode)
            .await?;
        let mut files = self.files.lock().await;
        if files.contains_key(&fd) {
            return Err(Error::BadDescriptor(fd));
        }
        files.insert(fd, file);
        Ok(fd)
    }

    pub async fn close(&self, fd: i32) -> Result<()> {
        let file = self
            .files
            .lock()
            .await
            .remove(&fd)
            .ok_or(Error::BadDescriptor(fd))?;
        file.close().await
    }

    pub async fn read(&self, fd: i32, buf: &mut [u8]) -> Result<usize> {
        let mut files = self.files.lock().await;
        let file = files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))?;
        let (n, _eof) = file.read(buf).await?;
        Ok(n)
    }

    pub async fn pread(&self, fd: i32, buf: &mut [u8], off: i64) -> Result<usize> {
        let files = self.files.lock().await;
        let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
        let (n, _eof) = file.read_at(buf, off).await?;
        Ok(n)
    }

    pub async fn write(&self, fd: i32, buf: &[u8]) -> Result<usize> {
        let mut files = self.files.lock().await;
        let file = files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.write(buf).await
    }

    pub async fn pwrite(&self, fd: i32, buf: &[u8], off: i64) -> Result<usize> {
        let files = self.files.lock().await;
        let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.write_at(buf, off).await
    }

    pub async fn readv(&self, fd: i32, bufs: &mut [&mut [u8]]) -> Result<usize> {
        let mut files = self.files.lock().await;
        let file = files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))?;
        let (n, _eof) = file.read_vec(bufs).await?;
        Ok(n)
    }

    pub async fn preadv(&self, fd: i32, bufs: &mut [&mut [u8]], off: i64) -> Result<usize> {
        let files = self.files.lock().await;
        let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
        let (n, _eof) = file.read_vec_at(bufs, off).await?;
        Ok(n)
    }

    pub async fn writev(&self, fd: i32, bufs: &[&[u8]]) -> Result<usize> {
        let mut files = self.files.lock().await;
        let file = files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.write_vec(bufs).await
    }

    pub async fn pwritev(&self, fd: i32, bufs: &[&[u8]], off: i64) -> Result<usize> {
        let files = self.files.lock().await;
        let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.write_vec_at(bufs, off).await
    }

    /// Returns the new absolute cursor position.
    pub async fn lseek(&self, fd: i32, off: i64, whence: i32) -> Result<u64> {
        let whence = Whence::from_raw(whence)?;
        let mut files = self.files.lock().await;
        let file = files.get_mut(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.seek(off, whence).await
    }

    pub async fn unlink(&self, name: &str) -> Result<()> {
        self.mount_for(name)?.remove(name).await
    }

    pub async fn mkdir(&self, name: &str, mode: u32) -> Result<()> {
        self.mount_for(name)?.mkdir(name, mode).await
    }

    pub async fn rmdir(&self, name: &str) -> Result<()> {
        self.mount_for(name)?.rmdir(name).await
    }

    /// Existence check; requested access modes are accepted but not
    /// enforced.
    pub async fn access(&self, name: &str, _mode: i32) -> Result<()> {
        self.mount_for(name)?.stat(name).await.map(|_| ())
    }

    pub async fn stat(&self, name: &str) -> Result<FileStat> {
        self.mount_for(name)?.stat(name).await
    }

    pub async fn lstat(&self, name: &str) -> Result<FileStat> {
        self.stat(name).await
    }

    pub async fn fstat(&self, fd: i32) -> Result<FileStat> {
        let name = {
            let files = self.files.lock().await;
            let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
            file.name().to_string()
        };
        self.stat(&name).await
    }

    pub async fn readdir(&self, name: &str) -> Result<Vec<String>> {
        self.mount_for(name)?.read_dir(name).await
    }

    pub async fn ftruncate(&self, fd: i32, len: i64) -> Result<()> {
        let files = self.files.lock().await;
        let file = files.get(&fd).ok_or(Error::BadDescriptor(fd))?;
        file.truncate(len).await
    }

    pub fn statfs(&self, _name: &str) -> FsStats {
        SYNTHETIC_STATFS
    }

    pub fn statvfs(&self, _name: &str) -> FsStats {
        SYNTHETIC_STATFS
    }

    pub fn fadvise(&self, _fd: i32, _off: i64, _len: i64, _advice: i32) {}

    pub fn fflush(&self) {}

    /// Tear down the shard connections.
    pub fn finalize(&self) {
        self.ring.close();
    }
}
