//! File records and record chunks
//!
//! A record chunk is one region holding [`RECORDS_PER_CHUNK`] fixed-size
//! records. Records form a singly-linked chain through their `next_offset`
//! field, starting at the header's `first_file_offset`.
//!
//! ```text
//!  0  tag                 4   "EPKF"
//!  4  offset              4   content region offset
//!  8  size                4   stored size
//! 12  decompressed_size   4
//! 16  compression         1
//! 17  encryption          1
//! 18  reserved            2
//! 20  latest_revision     4   reserved
//! 24  next_offset         4
//! 28  reserved            4
//! 32  name               96
//! ```

use crate::error::{PackageError, Result};
use crate::header::{read_u32, region_base, region_offset, REGION_SIZE};
use crate::region::Region;

pub const RECORD_SIZE: u32 = 128;
pub const RECORDS_PER_CHUNK: u32 = REGION_SIZE / RECORD_SIZE;
pub const NAME_FIELD_LEN: usize = 96;

/// Longest name accepted on write. The field itself is one byte longer.
pub const MAX_NAME_LEN: usize = NAME_FIELD_LEN - 1;

/// Corruption-check tag at the start of every record
pub const RECORD_TAG: u32 = u32::from_le_bytes(*b"EPKF");

const NAME_START: usize = 32;

/// Compression applied to a file's stored bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompressionKind {
    None = 0,
    /// zlib-wrapped DEFLATE
    Deflate = 1,
}

impl CompressionKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionKind::None),
            1 => Some(CompressionKind::Deflate),
            _ => None,
        }
    }
}

/// Encryption applied to a file's stored bytes. Only `None` is ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionKind {
    None = 0,
}

impl EncryptionKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EncryptionKind::None),
            _ => None,
        }
    }
}

/// Location of a record: the chunk region it lives in and its byte offset
/// inside that region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordPtr {
    pub region: u32,
    pub byte_offset: u32,
}

impl RecordPtr {
    /// Split an absolute record offset. The offset must sit on a record
    /// boundary outside the header region.
    pub fn from_offset(offset: u32) -> Result<Self> {
        if (offset as u64) < REGION_SIZE as u64 {
            return Err(PackageError::corrupt(
                offset as u64,
                "record offset points into the header region",
            ));
        }
        if offset % RECORD_SIZE != 0 {
            return Err(PackageError::corrupt(
                offset as u64,
                "record offset is not on a record boundary",
            ));
        }

        Ok(RecordPtr {
            region: region_base(offset as u64) as u32,
            byte_offset: region_offset(offset as u64) as u32,
        })
    }

    pub fn offset(&self) -> u32 {
        self.region + self.byte_offset
    }

    /// Index of the slot within its chunk
    pub fn slot(&self) -> u32 {
        self.byte_offset / RECORD_SIZE
    }

    fn range(&self, region: &Region) -> Result<std::ops::Range<usize>> {
        if region.offset() != self.region as u64 {
            return Err(PackageError::corrupt(
                self.offset() as u64,
                format!("record is not inside the region mapped at {}", region.offset()),
            ));
        }
        let start = self.byte_offset as usize;
        let end = start + RECORD_SIZE as usize;
        if end > region.len() {
            return Err(PackageError::corrupt(
                self.offset() as u64,
                "record extends past the mapped region",
            ));
        }
        Ok(start..end)
    }
}

/// Read and validate the record at `ptr` from a mapped chunk
pub fn load(region: &Region, ptr: RecordPtr) -> Result<FileRecord> {
    let range = ptr.range(region)?;
    FileRecord::decode(&region[range], ptr.offset())
}

/// Encode `record` into its slot of a mapped chunk
pub fn store(region: &mut Region, ptr: RecordPtr, record: &FileRecord) -> Result<()> {
    let range = ptr.range(region)?;
    region[range].copy_from_slice(&record.encode());
    Ok(())
}

/// Validate a name and pack it into the fixed-width name field
pub fn encode_name(name: &str) -> Result<[u8; NAME_FIELD_LEN]> {
    let bytes = name.as_bytes();
    let reason = if bytes.is_empty() {
        Some("name is empty")
    } else if bytes.len() > MAX_NAME_LEN {
        Some("name is longer than 95 bytes")
    } else if bytes.contains(&0) {
        Some("name contains a NUL byte")
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(PackageError::InvalidName {
            name: name.to_string(),
            reason,
        });
    }

    let mut field = [0u8; NAME_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}

/// One 128-byte directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub offset: u32,
    pub size: u32,
    pub decompressed_size: u32,
    pub compression: CompressionKind,
    /// Raw encryption byte, rejected on read unless it is `EncryptionKind::None`
    pub encryption: u8,
    pub latest_revision: u32,
    pub next_offset: u32,
    pub name: [u8; NAME_FIELD_LEN],
}

impl FileRecord {
    /// Name bytes up to the first NUL, or the whole field when it is full
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        &self.name[..end]
    }

    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    pub fn name_matches(&self, name: &str) -> bool {
        self.name_bytes() == name.as_bytes()
    }

    pub fn encryption_kind(&self) -> Option<EncryptionKind> {
        EncryptionKind::from_u8(self.encryption)
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE as usize] {
        let mut bytes = [0u8; RECORD_SIZE as usize];

        bytes[0..4].copy_from_slice(&RECORD_TAG.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.size.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.decompressed_size.to_le_bytes());
        bytes[16] = self.compression as u8;
        bytes[17] = self.encryption;
        bytes[20..24].copy_from_slice(&self.latest_revision.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.next_offset.to_le_bytes());
        bytes[NAME_START..].copy_from_slice(&self.name);

        bytes
    }

    /// Decode a record, checking its tag before trusting any field.
    /// `at` is the record's absolute offset, used for error reporting.
    pub fn decode(bytes: &[u8], at: u32) -> Result<Self> {
        if bytes.len() < RECORD_SIZE as usize {
            return Err(PackageError::corrupt(at as u64, "truncated record"));
        }

        let tag = read_u32(bytes, 0);
        if tag != RECORD_TAG {
            return Err(PackageError::corrupt(
                at as u64,
                format!("bad record tag {tag:#010x}"),
            ));
        }

        let compression = CompressionKind::from_u8(bytes[16]).ok_or_else(|| {
            PackageError::corrupt(at as u64, format!("unknown compression kind {}", bytes[16]))
        })?;

        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&bytes[NAME_START..NAME_START + NAME_FIELD_LEN]);

        Ok(FileRecord {
            offset: read_u32(bytes, 4),
            size: read_u32(bytes, 8),
            decompressed_size: read_u32(bytes, 12),
            compression,
            encryption: bytes[17],
            latest_revision: read_u32(bytes, 20),
            next_offset: read_u32(bytes, 24),
            name,
        })
    }
}
