//! Memory-mapped region access for package files
//!
//! Every mapping is a [`Region`] guard that unmaps on drop, so a region is
//! released on every exit path of the code that mapped it.

use crate::error::Result;
use crate::header::is_region_aligned;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Disk-backed package storage
pub struct RegionFile {
    file: File,
    path: PathBuf,
    live: Arc<AtomicUsize>,
}

impl RegionFile {
    /// Open a package file, creating it if it does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self::from_file(file, path.as_ref()))
    }

    /// Create a package file, discarding any previous contents
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        Ok(Self::from_file(file, path.as_ref()))
    }

    fn from_file(file: File, path: &Path) -> Self {
        RegionFile {
            file,
            path: path.to_path_buf(),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Current length of the backing file
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Map `size` bytes at a region-aligned `offset`, growing the file
    /// when the range extends past its end.
    pub fn map_region(&self, offset: u64, size: u64) -> Result<Region> {
        check_range(offset, size)?;

        let end = offset + size;
        if self.len()? < end {
            trace!("Growing {:?} to {} bytes", self.path, end);
            self.file.set_len(end)?;
        }

        self.map(offset, size)
    }

    /// Map `size` bytes at `offset` without growing the file. Ranges past
    /// the end of the file fail with `UnexpectedEof`.
    pub fn map_existing(&self, offset: u64, size: u64) -> Result<Region> {
        check_range(offset, size)?;

        let len = self.len()?;
        if offset + size > len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "region {}..{} is past the end of the file ({} bytes)",
                    offset,
                    offset + size,
                    len
                ),
            )
            .into());
        }

        self.map(offset, size)
    }

    fn map(&self, offset: u64, size: u64) -> Result<Region> {
        let len = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "region too large"))?;

        // SAFETY: the package owns its file exclusively for the lifetime of
        // the mapping; nothing truncates it while a region is mapped.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map_mut(&self.file)? };

        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(Region {
            map,
            offset,
            live: Arc::clone(&self.live),
        })
    }

    /// Number of regions currently mapped from this file
    pub fn live_regions(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sync all writes to disk
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

fn check_range(offset: u64, size: u64) -> Result<()> {
    if !is_region_aligned(offset) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("region offset {offset} is not region aligned"),
        )
        .into());
    }
    if size == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty region").into());
    }
    Ok(())
}

/// A mapped window of the package file. Unmapped on drop.
pub struct Region {
    map: MmapMut,
    offset: u64,
    live: Arc<AtomicUsize>,
}

impl Region {
    /// File offset this region starts at
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }
}

impl Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl DerefMut for Region {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::Relaxed);
    }
}
