//! Write path
//!
//! Appends one record and its content regions. Existing records are never
//! touched: writing a name twice leaves two records, and the directory
//! follows the newer one.

use crate::allocator::Cursors;
use crate::compression;
use crate::error::{PackageError, Result};
use crate::header::REGION_SIZE;
use crate::package::Package;
use crate::record::{self, CompressionKind, EncryptionKind, FileRecord};
use tracing::debug;

impl Package {
    /// Append `content` under `name`, optionally zlib-compressed
    ///
    /// # Errors
    ///
    /// - `InvalidName` for empty names, names over 95 bytes or names with NUL
    /// - `SizeLimit` for content over `u32::MAX` bytes
    /// - `Codec` if compression fails
    /// - `OutOfSpace` when the 32-bit offset space or record count is exhausted
    pub fn write_file(&mut self, name: &str, content: &[u8], compress: bool) -> Result<()> {
        let encoded_name = record::encode_name(name)?;
        let decompressed_size = size_field(name, content.len())?;

        self.ensure_header()?;

        let compressed: Vec<u8>;
        let (payload, compression) = if compress {
            compressed = compression::compress(content, &self.config.compression)?;
            (compressed.as_slice(), CompressionKind::Deflate)
        } else {
            (content, CompressionKind::None)
        };
        let stored_size = size_field(name, payload.len())?;

        let mut cursors = Cursors::from_header(&self.header);
        let plan = cursors.plan_write(stored_size)?;

        let mut slot_region = self
            .file
            .map_region(plan.slot.region as u64, REGION_SIZE as u64)?;

        if plan.content_span > 0 {
            let mut content_region = self
                .file
                .map_region(plan.content_offset as u64, plan.content_span as u64)?;
            content_region[..payload.len()].copy_from_slice(payload);
            content_region[payload.len()..].fill(0);
        }

        if let Some(chunk) = plan.new_chunk {
            let mut chunk_region = self.file.map_region(chunk as u64, REGION_SIZE as u64)?;
            chunk_region.fill(0);
            debug!("Allocated record chunk at {}", chunk);
        }

        let file_record = FileRecord {
            offset: plan.content_offset,
            size: stored_size,
            decompressed_size,
            compression,
            encryption: EncryptionKind::None as u8,
            latest_revision: 0,
            next_offset: plan.next_offset,
            name: encoded_name,
        };
        record::store(&mut slot_region, plan.slot, &file_record)?;
        drop(slot_region);

        cursors.store(&mut self.header);
        self.store_header()?;
        self.directory.insert(name, plan.slot.offset());

        debug!(
            "Wrote {} ({} bytes, stored {} bytes, {:?}) record at {}, content at {}",
            name,
            decompressed_size,
            stored_size,
            compression,
            plan.slot.offset(),
            plan.content_offset
        );
        Ok(())
    }
}

fn size_field(name: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| PackageError::SizeLimit {
        path: name.to_string(),
        size: len as u64,
        limit: u32::MAX as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::is_region_aligned;
    use crate::record::{RecordPtr, RECORDS_PER_CHUNK, RECORD_SIZE};
    use tempfile::TempDir;

    #[test]
    fn test_first_write_layout() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("w.epkg")).unwrap();
        package.write_file("hello.txt", b"Hello, World", false).unwrap();

        let header = *package.header();
        assert_eq!(header.num_of_files, 1);
        assert_eq!(header.first_file_offset, 4096);
        assert_eq!(header.next_record_offset, 4096 + RECORD_SIZE);
        assert_eq!(header.next_region_offset, 3 * 4096);

        let record = package.record("hello.txt").unwrap();
        assert_eq!(record.offset, 8192);
        assert_eq!(record.size, 12);
        assert_eq!(record.decompressed_size, 12);
        assert_eq!(record.compression, CompressionKind::None);
        assert_eq!(record.next_offset, 4096 + RECORD_SIZE);
        assert_eq!(package.resolve("hello.txt"), Some(4096));
        assert_eq!(package.live_regions(), 1);
    }

    #[test]
    fn test_chunk_rollover_keeps_chain() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("roll.epkg")).unwrap();

        for i in 0..RECORDS_PER_CHUNK + 3 {
            package
                .write_file(&format!("{i}.bin"), &[i as u8; 10], false)
                .unwrap();
        }

        let last_in_chunk = package.record("31.bin").unwrap();
        let next_chunk = last_in_chunk.next_offset;
        assert!(is_region_aligned(next_chunk as u64));
        assert_eq!(package.resolve("32.bin"), Some(next_chunk));
        assert_eq!(
            RecordPtr::from_offset(package.resolve("33.bin").unwrap())
                .unwrap()
                .slot(),
            1
        );

        assert_eq!(package.records().count(), RECORDS_PER_CHUNK as usize + 3);
    }

    #[test]
    fn test_invalid_name_leaves_package_untouched() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("n.epkg")).unwrap();

        let long = "x".repeat(96);
        assert!(matches!(
            package.write_file(&long, b"data", false),
            Err(PackageError::InvalidName { .. })
        ));
        assert!(!package.is_initialized());
        assert_eq!(package.live_regions(), 1);
    }

    #[test]
    fn test_empty_content() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("e.epkg")).unwrap();

        package.write_file("empty", b"", false).unwrap();
        package.write_file("after", b"x", false).unwrap();

        let empty = package.record("empty").unwrap();
        let after = package.record("after").unwrap();
        assert_eq!(empty.size, 0);
        assert_eq!(empty.offset, after.offset);
        assert!(package.read_file("empty").unwrap().is_empty());
        assert_eq!(package.read_file("after").unwrap(), b"x");
    }
}
