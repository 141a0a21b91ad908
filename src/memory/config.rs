//! What to map and where it comes from

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipeError, Result};

/// Where the bytes of a region live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingType {
    /// A file any process can map
    #[default]
    FileBacked,
    /// Private to this process; for rings shared between threads
    Anonymous,
}

/// Recipe for a [`SharedMemoryRegion`](super::SharedMemoryRegion)
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Label used in log and error messages
    pub name: String,
    /// Length given to a newly created (empty) backing file or anonymous map
    pub size: usize,
    pub backing_type: BackingType,
    /// Backing file; defaults to `fspipe_<name>` in the temp directory
    pub file_path: Option<PathBuf>,
    /// Create the file when missing; otherwise it must already exist
    pub create: bool,
}

impl RegionConfig {
    /// File-backed region that is created on demand
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            backing_type: BackingType::FileBacked,
            file_path: None,
            create: true,
        }
    }

    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Reject recipes that cannot produce a mapping
    ///
    /// A zero size is only meaningful when attaching to an existing file,
    /// whose own length is then used.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PipeError::invalid_parameter("name", "Region needs a name"));
        }

        let attaching = self.backing_type == BackingType::FileBacked && !self.create;
        if self.size == 0 && !attaching {
            return Err(PipeError::invalid_parameter(
                "size",
                "New regions need a non-zero size",
            ));
        }

        if attaching && self.file_path.is_none() {
            return Err(PipeError::invalid_parameter(
                "file_path",
                "Attaching to an existing region needs its file path",
            ));
        }

        Ok(())
    }

    /// Backing file this recipe resolves to
    pub fn default_file_path(&self) -> PathBuf {
        self.file_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("fspipe_{}", self.name)))
    }
}
