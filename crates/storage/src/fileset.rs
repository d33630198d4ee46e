//! Fileset descriptors for whole-database relocation.
//!
//! A fileset names the on-disk artifacts of a persistent database plus the
//! metadata the destination needs to validate and re-attach it. In-memory
//! backends have no fileset.

use keyfab_core::{BackendKind, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata key: backend kind token (`map`, `null`, `log_store`,
/// `btree_store`).
pub const META_DB_TYPE: &str = "database_type";
/// Metadata key: database name.
pub const META_DB_NAME: &str = "database_name";
/// Metadata key: comparator name, possibly empty.
pub const META_COMPARATOR: &str = "comparator_function";
/// Metadata key: present (any value) when the database rejects overwrites.
pub const META_NO_OVERWRITE: &str = "no_overwrite";
/// Metadata key: primary data file for single-file backends, relative to
/// the fileset root.
pub const META_DATA_FILE: &str = "database_file";

/// On-disk artifacts of a persistent database, plus attach metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fileset {
    /// Directory the files live under
    pub root: PathBuf,
    /// File paths relative to `root`
    pub files: Vec<PathBuf>,
    /// String metadata consumed by destination-side validation
    pub metadata: BTreeMap<String, String>,
}

impl Fileset {
    /// Build a fileset for a backend's files and attach attributes.
    pub fn new(
        root: impl Into<PathBuf>,
        files: Vec<PathBuf>,
        kind: BackendKind,
        name: &str,
        comparator: Option<&str>,
        no_overwrite: bool,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_DB_TYPE.to_string(), kind.as_str().to_string());
        metadata.insert(META_DB_NAME.to_string(), name.to_string());
        metadata.insert(
            META_COMPARATOR.to_string(),
            comparator.unwrap_or_default().to_string(),
        );
        if no_overwrite {
            metadata.insert(META_NO_OVERWRITE.to_string(), "1".to_string());
        }
        Fileset {
            root: root.into(),
            files,
            metadata,
        }
    }

    /// Absolute path of one member file.
    pub fn absolute(&self, file: &Path) -> PathBuf {
        self.root.join(file)
    }

    /// Sum of the member file sizes in bytes.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for file in &self.files {
            total += std::fs::metadata(self.absolute(file))?.len();
        }
        Ok(total)
    }
}
