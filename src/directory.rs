//! File directory
//!
//! Records are chained through their `next_offset` fields. [`ChainWalker`]
//! follows the chain one chunk-sized region at a time, and [`Directory`]
//! keeps the name → record offset map built from it.

use crate::error::{PackageError, Result};
use crate::header::{Header, REGION_SIZE};
use crate::record::{self, FileRecord, RecordPtr};
use crate::region::{Region, RegionFile};
use std::collections::HashMap;
use tracing::debug;

/// Iterator over `(record offset, record)` pairs in chain order
///
/// Visits exactly `num_of_files` records. A region is re-mapped only when
/// the walk moves into a different chunk. The first error ends the walk.
pub struct ChainWalker<'a> {
    file: &'a RegionFile,
    chunk: Option<Region>,
    next: u32,
    remaining: u16,
}

impl<'a> ChainWalker<'a> {
    pub fn new(file: &'a RegionFile, header: &Header) -> Self {
        ChainWalker {
            file,
            chunk: None,
            next: header.first_file_offset,
            remaining: header.num_of_files,
        }
    }

    /// A walker over nothing, for packages whose header was never written
    pub fn empty(file: &'a RegionFile) -> Self {
        ChainWalker {
            file,
            chunk: None,
            next: 0,
            remaining: 0,
        }
    }

    fn step(&mut self) -> Result<(u32, FileRecord)> {
        let ptr = RecordPtr::from_offset(self.next)?;

        let mapped = self
            .chunk
            .as_ref()
            .is_some_and(|chunk| chunk.offset() == ptr.region as u64);
        if !mapped {
            // Release the previous chunk before mapping the next one
            self.chunk = None;
            let chunk = self
                .file
                .map_existing(ptr.region as u64, REGION_SIZE as u64)
                .map_err(|e| {
                    PackageError::corrupt(ptr.offset() as u64, format!("chunk unreadable: {e}"))
                })?;
            self.chunk = Some(chunk);
        }

        let chunk = self
            .chunk
            .as_ref()
            .ok_or_else(|| PackageError::corrupt(ptr.offset() as u64, "chunk not mapped"))?;
        let record = record::load(chunk, ptr)?;

        Ok((ptr.offset(), record))
    }
}

impl Iterator for ChainWalker<'_> {
    type Item = Result<(u32, FileRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            self.chunk = None;
            return None;
        }

        match self.step() {
            Ok((offset, record)) => {
                self.remaining -= 1;
                self.next = record.next_offset;
                Some(Ok((offset, record)))
            }
            Err(e) => {
                self.remaining = 0;
                self.chunk = None;
                Some(Err(e))
            }
        }
    }
}

/// Name → record offset map
///
/// Holds one entry per distinct name, pointing at the most recently written
/// record for it. Only positive results are stored.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: HashMap<String, u32>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map by walking the whole chain. Later records shadow
    /// earlier records with the same name.
    pub fn rebuild(walker: ChainWalker<'_>) -> Result<Self> {
        let mut directory = Directory::new();
        let mut records = 0usize;

        for entry in walker {
            let (offset, record) = entry?;
            directory.insert(record.name(), offset);
            records += 1;
        }

        debug!(
            "Directory rebuilt: {} records, {} distinct names",
            records,
            directory.len()
        );
        Ok(directory)
    }

    /// Upsert a name
    pub fn insert(&mut self, name: impl Into<String>, offset: u32) {
        self.entries.insert(name.into(), offset);
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Walk the chain uncached and return the offset of the most recent record
/// named `name`.
pub fn scan(walker: ChainWalker<'_>, name: &str) -> Result<Option<u32>> {
    let mut found = None;
    for entry in walker {
        let (offset, record) = entry?;
        if record.name_matches(name) {
            found = Some(offset);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_name, CompressionKind, RECORD_SIZE};
    use tempfile::NamedTempFile;

    fn record(name: &str, next_offset: u32) -> FileRecord {
        FileRecord {
            offset: 0,
            size: 0,
            decompressed_size: 0,
            compression: CompressionKind::None,
            encryption: 0,
            latest_revision: 0,
            next_offset,
            name: encode_name(name).unwrap(),
        }
    }

    /// Lay out a chain by hand: two records in the chunk at 4096, the third
    /// in a chunk at 12288.
    fn chained_file(temp: &NamedTempFile) -> (RegionFile, Header) {
        let file = RegionFile::open(temp.path()).unwrap();
        {
            let mut first = file.map_region(4096, 4096).unwrap();
            let a = RecordPtr::from_offset(4096).unwrap();
            let b = RecordPtr::from_offset(4096 + RECORD_SIZE).unwrap();
            record::store(&mut first, a, &record("a.txt", b.offset())).unwrap();
            record::store(&mut first, b, &record("b.txt", 12288)).unwrap();

            let mut second = file.map_region(12288, 4096).unwrap();
            let c = RecordPtr::from_offset(12288).unwrap();
            record::store(&mut second, c, &record("a.txt", 12288 + RECORD_SIZE)).unwrap();
        }

        let mut header = Header::new();
        header.first_file_offset = 4096;
        header.num_of_files = 3;
        (file, header)
    }

    #[test]
    fn test_walk_follows_chain() {
        let temp = NamedTempFile::new().unwrap();
        let (file, header) = chained_file(&temp);

        let walked: Vec<(u32, String)> = ChainWalker::new(&file, &header)
            .map(|entry| entry.map(|(offset, record)| (offset, record.name())))
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            walked,
            vec![
                (4096, "a.txt".to_string()),
                (4096 + 128, "b.txt".to_string()),
                (12288, "a.txt".to_string()),
            ]
        );
        assert_eq!(file.live_regions(), 0);
    }

    #[test]
    fn test_walk_stops_at_file_count() {
        let temp = NamedTempFile::new().unwrap();
        let (file, mut header) = chained_file(&temp);
        header.num_of_files = 2;

        assert_eq!(ChainWalker::new(&file, &header).count(), 2);
    }

    #[test]
    fn test_rebuild_most_recent_wins() {
        let temp = NamedTempFile::new().unwrap();
        let (file, header) = chained_file(&temp);

        let directory = Directory::rebuild(ChainWalker::new(&file, &header)).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.get("a.txt"), Some(12288));
        assert_eq!(directory.get("b.txt"), Some(4096 + 128));
        assert_eq!(directory.get("c.txt"), None);

        assert_eq!(
            scan(ChainWalker::new(&file, &header), "a.txt").unwrap(),
            Some(12288)
        );
        assert_eq!(scan(ChainWalker::new(&file, &header), "zzz").unwrap(), None);
    }

    #[test]
    fn test_bad_tag_ends_walk_with_error() {
        let temp = NamedTempFile::new().unwrap();
        let (file, header) = chained_file(&temp);
        {
            let mut chunk = file.map_region(12288, 4096).unwrap();
            chunk[0..4].copy_from_slice(b"JUNK");
        }

        let results: Vec<_> = ChainWalker::new(&file, &header).collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_ok());
        assert!(matches!(
            results[2],
            Err(PackageError::CorruptRecord { offset: 12288, .. })
        ));
        assert!(Directory::rebuild(ChainWalker::new(&file, &header)).is_err());
    }

    #[test]
    fn test_chain_past_end_of_file() {
        let temp = NamedTempFile::new().unwrap();
        let (file, mut header) = chained_file(&temp);
        header.num_of_files = 4;

        let last = ChainWalker::new(&file, &header).last().unwrap();
        assert!(matches!(last, Err(PackageError::CorruptRecord { .. })));
        assert_eq!(file.live_regions(), 0);
    }

    #[test]
    fn test_insert_overwrites() {
        let mut directory = Directory::new();
        directory.insert("x", 4096);
        directory.insert("x", 8192);
        assert_eq!(directory.get("x"), Some(8192));
        assert!(directory.contains("x"));
        assert_eq!(directory.names().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn test_empty_walker() {
        let temp = NamedTempFile::new().unwrap();
        let file = RegionFile::open(temp.path()).unwrap();
        assert_eq!(ChainWalker::empty(&file).count(), 0);
    }
}
