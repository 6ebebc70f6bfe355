//! # epkg - Region-Aligned Asset Packages
//!
//! `epkg` packs many named byte blobs into a single container file laid out
//! in fixed 4KB regions, so content can be read straight out of
//! memory-mapped windows of the file. Files may be zlib-compressed
//! individually, and every package carries an embedded JSON index document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use epkg::{Package, Result};
//!
//! # fn main() -> Result<()> {
//! let mut pkg = Package::open("assets.epkg")?;
//!
//! pkg.write_file("scripts/main.js", b"console.log('hi');", true)?;
//! pkg.index_mut()["entry"] = "scripts/main.js".into();
//! pkg.save_index()?;
//! pkg.close()?;
//!
//! let pkg = Package::open("assets.epkg")?;
//! let _script = pkg.read_file("scripts/main.js")?;
//! assert_eq!(pkg.index()["entry"], "scripts/main.js");
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Region 0: Header (64 bytes used)            │
//! │  - Magic "EPKG", version 1                  │
//! │  - Container / patch-source identifiers     │
//! │  - File count and allocation cursors        │
//! ├─────────────────────────────────────────────┤
//! │ Region 1: first record chunk                │
//! │  - 32 × 128-byte file records               │
//! ├─────────────────────────────────────────────┤
//! │ Regions 2+: content, interleaved with       │
//! │  further record chunks as the chain grows   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Packages only grow. Writing an existing name appends a new record and
//! the newest one wins on lookup. There is no delete, no compaction and no
//! journal; a process killed mid-write can leave the package inconsistent.
//!
//! A [`Package`] is a single-owner handle: mutation requires `&mut`, and
//! nothing inside it is synchronized.

pub mod allocator;
pub mod builder;
pub mod compression;
pub mod directory;
pub mod error;
pub mod header;
pub mod index;
pub mod package;
pub mod reader;
pub mod record;
pub mod region;
pub mod writer;

pub use builder::{build_from_manifest, BuildManifest, ManifestEntry};
pub use compression::CompressionConfig;
pub use error::{PackageError, Result};
pub use header::{Header, REGION_SIZE};
pub use index::INDEX_NAME;
pub use package::{Package, PackageConfig};
pub use record::{CompressionKind, EncryptionKind, FileRecord, MAX_NAME_LEN};

/// Package format magic number
pub const MAGIC: &[u8; 4] = &header::MAGIC;
