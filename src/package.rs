//! Package handle
//!
//! A [`Package`] exclusively owns its backing file, the mapped header region,
//! the directory and the index document. Every mutating operation takes
//! `&mut self`; the type has no interior locking.

use crate::allocator::Cursors;
use crate::compression::CompressionConfig;
use crate::directory::{self, ChainWalker, Directory};
use crate::error::{PackageError, Result};
use crate::header::{Header, HEADER_SIZE, MAGIC, REGION_SIZE};
use crate::record::FileRecord;
use crate::region::{Region, RegionFile};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

/// Package configuration
#[derive(Debug, Clone, Default)]
pub struct PackageConfig {
    /// Codec settings for files written with compression
    pub compression: CompressionConfig,
}

impl PackageConfig {
    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

/// An open package file
pub struct Package {
    pub(crate) file: RegionFile,

    /// Region 0, mapped for the lifetime of the package
    header_region: Option<Region>,

    pub(crate) header: Header,

    /// Whether the header has been written to disk
    pub(crate) header_written: bool,

    pub(crate) directory: Directory,

    pub(crate) index: Value,

    /// Set once `save_index` has written the index this session
    pub(crate) index_saved: bool,

    pub(crate) config: PackageConfig,
}

impl Package {
    /// Open a package, creating an empty file if none exists
    ///
    /// The header is not written until the first file is.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, PackageConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: PackageConfig) -> Result<Self> {
        info!("Opening package at {:?}", path.as_ref());
        let file = RegionFile::open(path)?;
        Self::from_file(file, config)
    }

    /// Create a fresh package, discarding any existing file at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with(path, PackageConfig::default())
    }

    pub fn create_with<P: AsRef<Path>>(path: P, config: PackageConfig) -> Result<Self> {
        info!("Creating package at {:?}", path.as_ref());
        let file = RegionFile::create(path)?;
        Self::from_file(file, config)
    }

    fn from_file(file: RegionFile, config: PackageConfig) -> Result<Self> {
        let stored = probe_header(&file)?;

        // Only a blank file may be grown to hold region 0
        let header_region = match stored {
            Some(_) => file.map_existing(0, REGION_SIZE as u64)?,
            None => file.map_region(0, REGION_SIZE as u64)?,
        };

        let header_written = stored.is_some();
        let header = stored.unwrap_or_default();

        let directory = if header_written {
            Directory::rebuild(ChainWalker::new(&file, &header))?
        } else {
            Directory::new()
        };

        let mut package = Package {
            file,
            header_region: Some(header_region),
            header,
            header_written,
            directory,
            index: Value::Object(Default::default()),
            index_saved: false,
            config,
        };

        package.load_index()?;

        debug!(
            "Package ready: {} records, {} names",
            package.header.num_of_files,
            package.directory.len()
        );
        Ok(package)
    }

    /// Write the header for a package that has none yet, along with its
    /// first, empty record chunk.
    pub(crate) fn ensure_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        let mut header = Header::new();
        header.container_id = rand::random();
        header.patch_source_id = [0; 16];
        header.next_region_offset = REGION_SIZE;

        let mut cursors = Cursors::from_header(&header);
        let chunk = cursors.allocate_regions(REGION_SIZE as u64)?;
        {
            let mut region = self.file.map_region(chunk as u64, REGION_SIZE as u64)?;
            region.fill(0);
        }
        cursors.next_record = chunk;
        cursors.store(&mut header);
        header.first_file_offset = chunk;

        self.header = header;
        self.header_written = true;
        self.store_header()?;

        info!("Initialized package header at {:?}", self.file.path());
        Ok(())
    }

    /// Encode the in-memory header into the mapped header region
    pub(crate) fn store_header(&mut self) -> Result<()> {
        let bytes = self.header.to_bytes();
        let region = self.header_region.as_mut().ok_or_else(|| {
            PackageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "header region is not mapped",
            ))
        })?;
        region[..HEADER_SIZE].copy_from_slice(&bytes);
        Ok(())
    }

    /// Offset of the most recent record named `name`
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.directory.get(name)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Look `name` up by walking the on-disk chain, bypassing the directory
    pub fn scan(&self, name: &str) -> Result<Option<u32>> {
        directory::scan(self.records(), name)
    }

    /// Every record in chain order, duplicates included
    pub fn records(&self) -> ChainWalker<'_> {
        if self.header_written {
            ChainWalker::new(&self.file, &self.header)
        } else {
            ChainWalker::empty(&self.file)
        }
    }

    /// Decoded record for the most recent write of `name`
    pub fn record(&self, name: &str) -> Result<FileRecord> {
        let offset = self
            .resolve(name)
            .ok_or_else(|| PackageError::NotFound(name.to_string()))?;
        self.load_record(offset)
    }

    /// Distinct file names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory.names().map(str::to_string).collect();
        names.sort();
        names
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn is_initialized(&self) -> bool {
        self.header_written
    }

    pub fn container_id(&self) -> Option<[u8; 16]> {
        self.header_written.then_some(self.header.container_id)
    }

    pub fn patch_source_id(&self) -> Option<[u8; 16]> {
        (self.header_written && self.header.is_patch()).then_some(self.header.patch_source_id)
    }

    /// Records written, duplicates included
    pub fn file_count(&self) -> u16 {
        if self.header_written {
            self.header.num_of_files
        } else {
            0
        }
    }

    pub fn config(&self) -> &PackageConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Regions currently mapped, the header region included
    pub fn live_regions(&self) -> usize {
        self.file.live_regions()
    }

    /// Flush and release the header region and sync the file.
    ///
    /// The index is not saved here; call [`Package::save_index`] first.
    pub fn close(mut self) -> Result<()> {
        info!("Closing package at {:?}", self.file.path());
        if let Some(region) = self.header_region.take() {
            if self.header_written {
                region.flush()?;
            }
        }
        self.file.sync()
    }
}

/// Decode the header from the start of the file without growing it.
///
/// `None` means the file is empty or its header area is all zero. Anything
/// else must be a valid header.
fn probe_header(file: &RegionFile) -> Result<Option<Header>> {
    let len = file.len()?;
    if len == 0 {
        return Ok(None);
    }

    let prefix = file.map_existing(0, len.min(HEADER_SIZE as u64))?;
    if Header::is_blank(&prefix) {
        return Ok(None);
    }
    if !prefix.starts_with(&MAGIC) {
        return Err(PackageError::InvalidMagic);
    }

    Header::from_bytes(&prefix).map(Some)
}
