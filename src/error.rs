use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("File not found in package: {0}")]
    NotFound(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Source file {path} is {size} bytes, exceeding the {limit} byte limit")]
    SizeLimit { path: String, size: u64, limit: u64 },

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Invalid magic number in header")]
    InvalidMagic,

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u16),

    #[error("Invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Corrupt file record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("Out of space: {0}")]
    OutOfSpace(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PackageError {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        PackageError::CorruptRecord {
            offset,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
