//! Build a package from a JSON manifest
//!
//! ```json
//! {
//!     "files": [
//!         "scripts/main.js",
//!         { "src": "raw/logo.png", "dest": "logo.png", "compress": false }
//!     ],
//!     "index": { "entry": "scripts/main.js" }
//! }
//! ```
//!
//! A bare string packs a file under its own path. Object entries may rename
//! the file with `dest` and disable compression with `compress`, which
//! defaults to true. Source paths are resolved against the manifest's
//! directory.

use crate::error::{PackageError, Result};
use crate::package::Package;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Largest source file the format can describe
pub const MAX_FILE_SIZE: u64 = u32::MAX as u64;

/// Parsed build manifest
#[derive(Debug, Clone, Deserialize)]
pub struct BuildManifest {
    pub files: Vec<ManifestEntry>,

    /// Initial index document for the new package
    #[serde(default)]
    pub index: Option<Value>,
}

/// One entry of the `files` list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ManifestEntry {
    Path(String),
    Mapped {
        src: String,
        #[serde(default)]
        dest: Option<String>,
        #[serde(default = "default_compress")]
        compress: bool,
    },
}

fn default_compress() -> bool {
    true
}

impl ManifestEntry {
    pub fn source(&self) -> &str {
        match self {
            ManifestEntry::Path(path) => path,
            ManifestEntry::Mapped { src, .. } => src,
        }
    }

    /// Name inside the package, defaulting to the source path
    pub fn destination(&self) -> &str {
        match self {
            ManifestEntry::Path(path) => path,
            ManifestEntry::Mapped { src, dest, .. } => dest.as_deref().unwrap_or(src),
        }
    }

    pub fn compress(&self) -> bool {
        match self {
            ManifestEntry::Path(_) => true,
            ManifestEntry::Mapped { compress, .. } => *compress,
        }
    }
}

impl BuildManifest {
    /// Read and parse a manifest file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read(path.as_ref())?;
        let value: Value = serde_json::from_slice(&raw)
            .map_err(|e| PackageError::MalformedManifest(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let root = value.as_object().ok_or_else(|| {
            PackageError::MalformedManifest("manifest root must be an object".to_string())
        })?;

        match root.get("files") {
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(PackageError::MalformedManifest(
                    "\"files\" must be a list".to_string(),
                ))
            }
            None => {
                return Err(PackageError::MalformedManifest(
                    "missing \"files\" list".to_string(),
                ))
            }
        }

        serde_json::from_value(value)
            .map_err(|e| PackageError::MalformedManifest(format!("invalid file entry: {e}")))
    }
}

/// Build a fresh package at `output_path` from the manifest at `manifest_path`
///
/// Any existing file at `output_path` is replaced. Every source is checked
/// against [`MAX_FILE_SIZE`] before the output is created.
pub fn build_from_manifest<P: AsRef<Path>, Q: AsRef<Path>>(
    manifest_path: P,
    output_path: Q,
) -> Result<Package> {
    let manifest_path = manifest_path.as_ref();
    info!(
        "Building package {:?} from manifest {:?}",
        output_path.as_ref(),
        manifest_path
    );

    let manifest = BuildManifest::load(manifest_path)?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new(""));

    let mut sources: Vec<(PathBuf, &ManifestEntry)> = Vec::with_capacity(manifest.files.len());
    for entry in &manifest.files {
        let source = base.join(entry.source());
        let size = fs::metadata(&source)?.len();
        if size > MAX_FILE_SIZE {
            return Err(PackageError::SizeLimit {
                path: source.display().to_string(),
                size,
                limit: MAX_FILE_SIZE,
            });
        }
        sources.push((source, entry));
    }

    let mut package = Package::create(output_path)?;
    for (source, entry) in sources {
        let content = fs::read(&source)?;
        debug!("Packing {:?} as {}", source, entry.destination());
        package.write_file(entry.destination(), &content, entry.compress())?;
    }

    if let Some(index) = manifest.index {
        package.set_index(index);
        package.save_index()?;
    }

    info!(
        "Built package {:?} with {} files",
        package.path(),
        package.file_count()
    );
    Ok(package)
}

impl Package {
    /// See [`build_from_manifest`]
    pub fn build_from_manifest<P: AsRef<Path>, Q: AsRef<Path>>(
        manifest_path: P,
        output_path: Q,
    ) -> Result<Package> {
        build_from_manifest(manifest_path, output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_defaults() {
        let manifest = BuildManifest::from_value(json!({
            "files": [
                "a.txt",
                {"src": "b.bin", "dest": "c.bin", "compress": false},
                {"src": "d.bin"}
            ]
        }))
        .unwrap();

        let entries = &manifest.files;
        assert_eq!(entries[0].source(), "a.txt");
        assert_eq!(entries[0].destination(), "a.txt");
        assert!(entries[0].compress());

        assert_eq!(entries[1].source(), "b.bin");
        assert_eq!(entries[1].destination(), "c.bin");
        assert!(!entries[1].compress());

        assert_eq!(entries[2].destination(), "d.bin");
        assert!(entries[2].compress());
        assert!(manifest.index.is_none());
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(
            BuildManifest::from_value(json!(["a.txt"])),
            Err(PackageError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_files_must_be_list() {
        assert!(matches!(
            BuildManifest::from_value(json!({"files": "a.txt"})),
            Err(PackageError::MalformedManifest(_))
        ));
        assert!(matches!(
            BuildManifest::from_value(json!({"index": {}})),
            Err(PackageError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_entry_without_src() {
        assert!(matches!(
            BuildManifest::from_value(json!({"files": [{"dest": "x"}]})),
            Err(PackageError::MalformedManifest(_))
        ));
        assert!(matches!(
            BuildManifest::from_value(json!({"files": [42]})),
            Err(PackageError::MalformedManifest(_))
        ));
    }

    #[test]
    fn test_index_is_kept() {
        let manifest = BuildManifest::from_value(json!({
            "files": [],
            "index": {"version": 2}
        }))
        .unwrap();
        assert_eq!(manifest.index, Some(json!({"version": 2})));
    }
}
