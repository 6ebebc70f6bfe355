use crate::error::{PackageError, Result};
use crate::record::RECORD_SIZE;

pub const MAGIC: [u8; 4] = *b"EPKG";
pub const FORMAT_VERSION: u16 = 1;

/// Allocation granularity for every structure and content blob.
pub const REGION_SIZE: u32 = 4096;

/// Encoded size of [`Header`]. The header lives at the start of region 0.
pub const HEADER_SIZE: usize = 64;

/// Round an offset down to the start of the region containing it.
pub fn region_base(offset: u64) -> u64 {
    offset - region_offset(offset)
}

/// Position of an offset within its region.
pub fn region_offset(offset: u64) -> u64 {
    offset % REGION_SIZE as u64
}

/// Round a size up to a whole number of regions.
pub fn round_up_to_region(size: u64) -> u64 {
    let region = REGION_SIZE as u64;
    size.div_ceil(region) * region
}

pub fn is_region_aligned(offset: u64) -> bool {
    region_offset(offset) == 0
}

/// Container header (first 64 bytes of region 0)
///
/// Written lazily on the first write to a container. Every offset it holds
/// is a byte offset from the start of the file.
///
/// ```text
///  0  magic                 4
///  4  version               2
///  6  first_file_offset     4
/// 10  container_id         16
/// 26  patch_source_id      16
/// 42  legacy_index_offset   4
/// 46  num_of_files          2
/// 48  next_region_offset    4
/// 52  next_record_offset    4
/// 56  reserved              8
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: [u8; 4],
    pub version: u16,

    /// Offset of the first file-record chunk
    pub first_file_offset: u32,

    /// Identifier generated when the header is first written
    pub container_id: [u8; 16],

    /// All zero unless this container is a delta against another one
    pub patch_source_id: [u8; 16],

    /// Unused, always zero
    pub legacy_index_offset: u32,

    /// Total records written, duplicates included
    pub num_of_files: u16,

    /// Content/chunk allocation cursor
    pub next_region_offset: u32,

    /// Next free file-record slot
    pub next_record_offset: u32,
}

impl Header {
    pub fn new() -> Self {
        Header {
            magic: MAGIC,
            version: FORMAT_VERSION,
            first_file_offset: 0,
            container_id: [0; 16],
            patch_source_id: [0; 16],
            legacy_index_offset: 0,
            num_of_files: 0,
            next_region_offset: REGION_SIZE,
            next_record_offset: 0,
        }
    }

    /// Validate the magic, version and cursor alignment
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(PackageError::InvalidMagic);
        }

        if self.version != FORMAT_VERSION {
            return Err(PackageError::UnsupportedVersion(self.version));
        }

        for (field, offset) in [
            ("first_file_offset", self.first_file_offset),
            ("next_region_offset", self.next_region_offset),
        ] {
            if offset == 0 || !is_region_aligned(offset as u64) {
                return Err(PackageError::corrupt(
                    0,
                    format!("header {field} {offset} is not a region offset"),
                ));
            }
        }

        if self.next_record_offset < REGION_SIZE {
            return Err(PackageError::corrupt(
                0,
                format!(
                    "header next_record_offset {} points into the header region",
                    self.next_record_offset
                ),
            ));
        }

        if self.next_record_offset % RECORD_SIZE != 0 {
            return Err(PackageError::corrupt(
                0,
                format!(
                    "header next_record_offset {} is not on a record boundary",
                    self.next_record_offset
                ),
            ));
        }

        // Both cursors point into chunks that were already allocated
        for (field, offset) in [
            ("first_file_offset", self.first_file_offset),
            ("next_record_offset", self.next_record_offset),
        ] {
            if offset >= self.next_region_offset {
                return Err(PackageError::corrupt(
                    0,
                    format!(
                        "header {field} {offset} is past the allocation cursor {}",
                        self.next_region_offset
                    ),
                ));
            }
        }

        Ok(())
    }

    /// True when the header area has never been written.
    pub fn is_blank(bytes: &[u8]) -> bool {
        bytes.iter().take(HEADER_SIZE).all(|&b| b == 0)
    }

    pub fn is_patch(&self) -> bool {
        self.patch_source_id != [0; 16]
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..10].copy_from_slice(&self.first_file_offset.to_le_bytes());
        bytes[10..26].copy_from_slice(&self.container_id);
        bytes[26..42].copy_from_slice(&self.patch_source_id);
        bytes[42..46].copy_from_slice(&self.legacy_index_offset.to_le_bytes());
        bytes[46..48].copy_from_slice(&self.num_of_files.to_le_bytes());
        bytes[48..52].copy_from_slice(&self.next_region_offset.to_le_bytes());
        bytes[52..56].copy_from_slice(&self.next_record_offset.to_le_bytes());

        bytes
    }

    /// Deserialize and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(PackageError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for header",
            )));
        }

        let mut header = Header::new();
        header.magic.copy_from_slice(&bytes[0..4]);
        header.version = read_u16(bytes, 4);
        header.first_file_offset = read_u32(bytes, 6);
        header.container_id.copy_from_slice(&bytes[10..26]);
        header.patch_source_id.copy_from_slice(&bytes[26..42]);
        header.legacy_index_offset = read_u32(bytes, 42);
        header.num_of_files = read_u16(bytes, 46);
        header.next_region_offset = read_u32(bytes, 48);
        header.next_record_offset = read_u32(bytes, 52);

        header.validate()?;

        Ok(header)
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
