//! Embedded index document
//!
//! Each package carries a JSON document stored as an ordinary file named
//! [`INDEX_NAME`]. It is loaded on open and kept in memory; changes reach
//! disk only through [`Package::save_index`].
//!
//! Because writes append rather than update, the index is saved at most once
//! per open session. A second `save_index` on the same handle does nothing,
//! so mutations made after the first save are not persisted by that handle.

use crate::error::Result;
use crate::package::Package;
use serde_json::Value;
use tracing::{debug, warn};

/// Reserved file name holding the index document
pub const INDEX_NAME: &str = "_index";

impl Package {
    pub fn index(&self) -> &Value {
        &self.index
    }

    /// Live, mutable index document
    pub fn index_mut(&mut self) -> &mut Value {
        &mut self.index
    }

    /// Replace the whole index document
    pub fn set_index(&mut self, index: Value) {
        self.index = index;
    }

    /// Whether this handle has already written the index
    pub fn index_saved(&self) -> bool {
        self.index_saved
    }

    /// Serialize the index and append it under [`INDEX_NAME`]
    ///
    /// Only the first call per open session writes anything.
    pub fn save_index(&mut self) -> Result<()> {
        if self.index_saved {
            debug!("Index already saved this session, skipping");
            return Ok(());
        }

        let serialized = serde_json::to_string(&self.index)?;
        self.write_file(INDEX_NAME, serialized.as_bytes(), true)?;
        self.index_saved = true;

        debug!("Saved index ({} bytes)", serialized.len());
        Ok(())
    }

    /// Load the stored index, if any
    ///
    /// An index that fails to parse is logged and replaced with an empty
    /// document rather than failing the open.
    pub(crate) fn load_index(&mut self) -> Result<()> {
        if !self.file_exists(INDEX_NAME) {
            return Ok(());
        }

        let raw = self.read_file(INDEX_NAME)?;
        self.index = match serde_json::from_slice(&raw) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    "Ignoring unparseable index in {:?}: {}",
                    self.file.path(),
                    e
                );
                Value::Object(Default::default())
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_new_package_has_empty_index() {
        let dir = TempDir::new().unwrap();
        let package = Package::open(dir.path().join("i.epkg")).unwrap();
        assert_eq!(package.index(), &json!({}));
        assert!(!package.file_exists(INDEX_NAME));
    }

    #[test]
    fn test_save_index_writes_once() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("i.epkg")).unwrap();

        package.index_mut()["hello"] = json!("World");
        package.save_index().unwrap();
        assert!(package.index_saved());
        let count = package.file_count();

        package.index_mut()["later"] = json!(1);
        package.save_index().unwrap();
        assert_eq!(package.file_count(), count);

        let stored: Value =
            serde_json::from_slice(&package.read_file(INDEX_NAME).unwrap()).unwrap();
        assert_eq!(stored, json!({"hello": "World"}));
    }

    #[test]
    fn test_set_index() {
        let dir = TempDir::new().unwrap();
        let mut package = Package::open(dir.path().join("i.epkg")).unwrap();
        package.set_index(json!({"levels": [1, 2, 3]}));
        assert_eq!(package.index()["levels"][2], json!(3));
    }
}
