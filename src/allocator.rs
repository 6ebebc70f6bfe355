//! Append-only region allocation
//!
//! A package grows through two monotonic cursors kept in the header:
//!
//! - the region cursor (`next_region_offset`), where the next content blob
//!   or record chunk is placed, always region aligned
//! - the record cursor (`next_record_offset`), the next free slot in the
//!   current record chunk
//!
//! Nothing is ever freed. Allocation is planned on a copy of the cursors and
//! written back to the header only once the write has succeeded, so a write
//! that fails its checks leaves the header untouched.

use crate::error::{PackageError, Result};
use crate::header::{region_base, round_up_to_region, Header, REGION_SIZE};
use crate::record::{RecordPtr, RECORD_SIZE};

/// Allocation cursors of one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub next_region: u32,
    pub next_record: u32,
    pub file_count: u16,
}

/// Where a single file write lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePlan {
    /// Slot receiving the file's record
    pub slot: RecordPtr,

    /// Value of the record's `next_offset` field
    pub next_offset: u32,

    /// First content region
    pub content_offset: u32,

    /// Bytes reserved for content, a whole number of regions
    pub content_span: u32,

    /// Fresh record chunk allocated because the slot was the last of its chunk
    pub new_chunk: Option<u32>,
}

impl Cursors {
    pub fn from_header(header: &Header) -> Self {
        Cursors {
            next_region: header.next_region_offset,
            next_record: header.next_record_offset,
            file_count: header.num_of_files,
        }
    }

    pub fn store(&self, header: &mut Header) {
        header.next_region_offset = self.next_region;
        header.next_record_offset = self.next_record;
        header.num_of_files = self.file_count;
    }

    /// Reserve whole regions for `size` bytes and return the first offset.
    /// A zero size reserves nothing and returns the current cursor.
    pub fn allocate_regions(&mut self, size: u64) -> Result<u32> {
        let offset = self.next_region;
        let span = round_up_to_region(size);

        let end = (offset as u64)
            .checked_add(span)
            .filter(|&end| end <= u32::MAX as u64 - (REGION_SIZE as u64 - 1))
            .ok_or_else(|| {
                PackageError::OutOfSpace(format!(
                    "allocating {span} bytes at {offset} exceeds the 32-bit offset space"
                ))
            })?;

        self.next_region = end as u32;
        Ok(offset)
    }

    /// Plan the allocations for one file whose stored payload is
    /// `stored_size` bytes, advancing the cursors.
    pub fn plan_write(&mut self, stored_size: u32) -> Result<WritePlan> {
        let slot = RecordPtr::from_offset(self.next_record)?;

        let file_count = self.file_count.checked_add(1).ok_or_else(|| {
            PackageError::OutOfSpace(format!("record count limit of {} reached", u16::MAX))
        })?;

        let mut next_offset = self.next_record.checked_add(RECORD_SIZE).ok_or_else(|| {
            PackageError::OutOfSpace(format!(
                "record cursor {} exceeds the 32-bit offset space",
                self.next_record
            ))
        })?;

        let content_span = round_up_to_region(stored_size as u64);
        let content_offset = self.allocate_regions(content_span)?;

        let new_chunk = if region_base(next_offset as u64) != slot.region as u64 {
            let chunk = self.allocate_regions(REGION_SIZE as u64)?;
            next_offset = chunk;
            Some(chunk)
        } else {
            None
        };

        self.next_record = next_offset;
        self.file_count = file_count;

        Ok(WritePlan {
            slot,
            next_offset,
            content_offset,
            content_span: content_span as u32,
            new_chunk,
        })
    }
}
