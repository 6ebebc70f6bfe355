//! Read path

use crate::compression;
use crate::error::{PackageError, Result};
use crate::header::{is_region_aligned, round_up_to_region, REGION_SIZE};
use crate::package::Package;
use crate::record::{self, CompressionKind, EncryptionKind, FileRecord, RecordPtr};
use tracing::debug;

impl Package {
    /// Read the most recent content written under `name`
    ///
    /// Returns the decompressed bytes in a fresh buffer owned by the caller.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let offset = self
            .resolve(name)
            .ok_or_else(|| PackageError::NotFound(name.to_string()))?;

        let file_record = self.load_record(offset)?;
        let content = self.read_record(&file_record, offset)?;

        debug!("Read {} ({} bytes)", name, content.len());
        Ok(content)
    }

    /// Decode and validate the record at an absolute offset
    pub(crate) fn load_record(&self, offset: u32) -> Result<FileRecord> {
        let ptr = RecordPtr::from_offset(offset)?;
        let region = self
            .file
            .map_existing(ptr.region as u64, REGION_SIZE as u64)
            .map_err(|e| PackageError::corrupt(offset as u64, format!("chunk unreadable: {e}")))?;
        record::load(&region, ptr)
    }

    /// Fetch and decode the content described by `file_record`, which was
    /// loaded from `record_offset`.
    pub fn read_record(&self, file_record: &FileRecord, record_offset: u32) -> Result<Vec<u8>> {
        if file_record.encryption_kind() != Some(EncryptionKind::None) {
            return Err(PackageError::UnsupportedFeature(format!(
                "{} uses encryption kind {}",
                file_record.name(),
                file_record.encryption
            )));
        }

        let stored = self.read_stored(file_record, record_offset)?;

        match file_record.compression {
            CompressionKind::None => {
                if file_record.size != file_record.decompressed_size {
                    return Err(PackageError::corrupt(
                        record_offset as u64,
                        format!(
                            "uncompressed record stores {} bytes but declares {}",
                            file_record.size, file_record.decompressed_size
                        ),
                    ));
                }
                Ok(stored)
            }
            CompressionKind::Deflate => {
                let decompressed =
                    compression::decompress(&stored, file_record.decompressed_size as usize)?;
                drop(stored);
                Ok(decompressed)
            }
        }
    }

    /// Copy the stored bytes out of the record's content regions
    fn read_stored(&self, file_record: &FileRecord, record_offset: u32) -> Result<Vec<u8>> {
        if file_record.size == 0 {
            return Ok(Vec::new());
        }

        let offset = file_record.offset as u64;
        let span = round_up_to_region(file_record.size as u64);
        if !is_region_aligned(offset) || offset < REGION_SIZE as u64 {
            return Err(PackageError::corrupt(
                record_offset as u64,
                format!("content offset {offset} is not a content region"),
            ));
        }
        if offset + span > self.file.len()? {
            return Err(PackageError::corrupt(
                record_offset as u64,
                format!("content {}..{} is past the end of the file", offset, offset + span),
            ));
        }

        let region = self.file.map_existing(offset, span)?;
        Ok(region[..file_record.size as usize].to_vec())
    }
}
