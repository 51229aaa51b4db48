//! A file handle over the data store: a seek cursor, positional and
//! vectored reads and writes, and access-mode enforcement.

use crate::common::{Error, Result};
use crate::inode::Inode;
use crate::store::DataStore;
use std::sync::Arc;

pub const O_RDONLY: i32 = 0o0;
pub const O_WRONLY: i32 = 0o1;
pub const O_RDWR: i32 = 0o2;
pub const O_ACCMODE: i32 = 0o3;
pub const O_CREAT: i32 = 0o100;
pub const O_EXCL: i32 = 0o200;
pub const O_TRUNC: i32 = 0o1000;
pub const O_APPEND: i32 = 0o2000;

/// Raw open(2) flag word, as handed over by the interception layer.
#[derive(Debug, Clone, Copy)]
pub struct OpenFlags(pub i32);

impl OpenFlags {
    fn contains(self, flag: i32) -> bool {
        self.0 & flag == flag
    }

    pub fn create(self) -> bool {
        self.contains(O_CREAT)
    }

    pub fn excl(self) -> bool {
        self.contains(O_EXCL)
    }

    pub fn trunc(self) -> bool {
        self.contains(O_TRUNC)
    }

    pub fn append(self) -> bool {
        self.contains(O_APPEND)
    }

    pub fn access_mode(self) -> AccessMode {
        match self.0 & O_ACCMODE {
            O_WRONLY => AccessMode::WriteOnly,
            O_RDWR => AccessMode::ReadWrite,
            _ => AccessMode::ReadOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    fn readable(self) -> bool {
        self != AccessMode::WriteOnly
    }

    fn writable(self) -> bool {
        self != AccessMode::ReadOnly
    }
}

/// Seek origin, decoded from the lseek(2) whence integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

impl Whence {
    pub fn from_raw(whence: i32) -> Result<Self> {
        match whence {
            0 => Ok(Whence::Start),
            1 => Ok(Whence::Current),
            2 => Ok(Whence::End),
            w => Err(Error::InvalidArgument(format!("invalid whence: {w}"))),
        }
    }
}

/// An open file. Cursor reads and writes advance the offset by the
/// exact transferred byte count; positional variants leave it alone.
/// Reads report `(n, eof)` where `eof` is set whenever fewer bytes than
/// requested were available.
pub struct File {
    inode: Arc<Inode>,
    store: DataStore,
    access: AccessMode,
    offset: u64,
}

impl File {
    pub(crate) fn new(inode: Arc<Inode>, store: DataStore, access: AccessMode) -> Self {
        Self {
            inode,
            store,
            access,
            offset: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.inode.path()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub async fn size(&self) -> Result<u64> {
        let _guard = self.inode.lock().read().await;
        self.inode.size().await
    }

    fn check_readable(&self) -> Result<()> {
        if !self.access.readable() {
            return Err(Error::WriteOnlyFile);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if !self.access.writable() {
            return Err(Error::ReadOnlyFile);
        }
        Ok(())
    }

    async fn read_span(&self, dst: &mut [u8], off: u64) -> Result<(usize, bool)> {
        let n = self.store.read_at(self.name(), off, dst).await?;
        Ok((n, n < dst.len()))
    }

    /// Read at the cursor; advances it by the byte count returned.
    pub async fn read(&mut self, dst: &mut [u8]) -> Result<(usize, bool)> {
        self.check_readable()?;
        let inode = self.inode.clone();
        let _guard = inode.lock().read().await;
        let (n, eof) = self.read_span(dst, self.offset).await?;
        self.offset += n as u64;
        Ok((n, eof))
    }

    /// Read at `off` without touching the cursor.
    pub async fn read_at(&self, dst: &mut [u8], off: i64) -> Result<(usize, bool)> {
        self.check_readable()?;
        let off = non_negative(off, "read at negative offset")?;
        let _guard = self.inode.lock().read().await;
        self.read_span(dst, off).await
    }

    async fn read_vec_span(
        &self,
        bufs: &mut [&mut [u8]],
        off: u64,
    ) -> Result<(usize, bool)> {
        let mut total = 0;
        let mut pos = off;
        for buf in bufs.iter_mut() {
            let (n, eof) = self.read_span(buf, pos).await?;
            total += n;
            pos += n as u64;
            if eof {
                return Ok((total, true));
            }
        }
        Ok((total, false))
    }

    /// Vectored read at the cursor; stops at the first short segment.
    pub async fn read_vec(&mut self, bufs: &mut [&mut [u8]]) -> Result<(usize, bool)> {
        self.check_readable()?;
        let inode = self.inode.clone();
        let _guard = inode.lock().read().await;
        let (n, eof) = self.read_vec_span(bufs, self.offset).await?;
        self.offset += n as u64;
        Ok((n, eof))
    }

    /// Vectored read at `off` without touching the cursor.
    pub async fn read_vec_at(
        &self,
        bufs: &mut [&mut [u8]],
        off: i64,
    ) -> Result<(usize, bool)> {
        self.check_readable()?;
        let off = non_negative(off, "read at negative offset")?;
        let _guard = self.inode.lock().read().await;
        self.read_vec_span(bufs, off).await
    }

    /// Write at the cursor; advances it past the written bytes. Writes
    /// past the end grow the file.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let inode = self.inode.clone();
        let _guard = inode.lock().write().await;
        self.store.write_at(self.name(), self.offset, data).await?;
        self.offset += data.len() as u64;
        Ok(data.len())
    }

    /// Write at `off` without touching the cursor.
    pub async fn write_at(&self, data: &[u8], off: i64) -> Result<usize> {
        self.check_writable()?;
        let off = non_negative(off, "write at negative offset")?;
        let _guard = self.inode.lock().write().await;
        self.store.write_at(self.name(), off, data).await?;
        Ok(data.len())
    }

    async fn write_vec_span(&self, bufs: &[&[u8]], off: u64) -> Result<usize> {
        let mut total = 0;
        let mut pos = off;
        for buf in bufs {
            self.store.write_at(self.name(), pos, buf).await?;
            total += buf.len();
            pos += buf.len() as u64;
        }
        Ok(total)
    }

    /// Vectored write at the cursor; advances it by the total count.
    pub async fn write_vec(&mut self, bufs: &[&[u8]]) -> Result<usize> {
        self.check_writable()?;
        let inode = self.inode.clone();
        let _guard = inode.lock().write().await;
        let n = self.write_vec_span(bufs, self.offset).await?;
        self.offset += n as u64;
        Ok(n)
    }

    /// Vectored write at `off` without touching the cursor.
    pub async fn write_vec_at(&self, bufs: &[&[u8]], off: i64) -> Result<usize> {
        self.check_writable()?;
        let off = non_negative(off, "write at negative offset")?;
        let _guard = self.inode.lock().write().await;
        self.write_vec_span(bufs, off).await
    }

    /// Move the cursor. Seeking past the end is allowed: a later read
    /// reports EOF, a later write grows the file.
    pub async fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let inode = self.inode.clone();
        let _guard = inode.lock().write().await;
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.offset as i64,
            Whence::End => inode.size().await? as i64,
        };
        let position = base.checked_add(off).unwrap_or(-1);
        if position < 0 {
            return Err(Error::InvalidArgument(
                "seek to negative position".to_string(),
            ));
        }
        self.offset = position as u64;
        Ok(self.offset)
    }

    /// Change the file size: growing zero-fills, shrinking drops the
    /// extra bytes.
    pub async fn truncate(&self, len: i64) -> Result<()> {
        let len = non_negative(len, "truncate to negative length")?;
        let _guard = self.inode.lock().write().await;
        self.store.resize(self.name(), len).await
    }

    pub async fn sync(&self) -> Result<()> {
        Ok(())
    }

    /// No-op on the core; the interception layer drops its descriptor
    /// mapping.
    pub async fn close(&self) -> Result<()> {
        Ok(())
    }
}

fn non_negative(off: i64, what: &str) -> Result<u64> {
    if off < 0 {
        return Err(Error::InvalidArgument(format!("{what}: {off}")));
    }
    Ok(off as u64)
}
