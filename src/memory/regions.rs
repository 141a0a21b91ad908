//! Mapped memory region implementation

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{PipeError, Result};

use super::config::{BackingType, RegionConfig};

/// Mode of newly created backing files
const BACKING_FILE_MODE: u32 = 0o644;

/// A mapped byte region shared by whoever maps the same backing
///
/// The mapping is never resized after creation, so raw pointers handed out by
/// [`SharedMemoryRegion::base_ptr`] stay valid for the lifetime of the region.
#[derive(Debug)]
pub struct SharedMemoryRegion {
    /// Region name
    name: String,
    /// Backing type
    backing_type: BackingType,
    /// Backing file path, if file-backed
    path: Option<PathBuf>,
    /// Memory-mapped region
    mmap: MmapMut,
    /// Base address captured from the mutable mapping
    base: *mut u8,
    /// Keeps the backing file open for the lifetime of the mapping
    _file: Option<File>,
}

impl SharedMemoryRegion {
    /// Create or open a region
    pub fn new(config: RegionConfig) -> Result<Self> {
        config.validate()?;

        match config.backing_type {
            BackingType::FileBacked => {
                let path = config.default_file_path();
                let file = if config.create {
                    let file = Self::open_backing_file(&path)?;
                    Self::size_if_empty(&file, config.size)?;
                    file
                } else {
                    OpenOptions::new()
                        .read(true)
                        .write(true)
                        .open(&path)
                        .map_err(|e| PipeError::from_io(e, "Failed to open existing file"))?
                };
                Self::map_file(config.name, file, path)
            }
            BackingType::Anonymous => {
                let mut mmap = MmapOptions::new()
                    .len(config.size)
                    .map_anon()
                    .map_err(|e| PipeError::from_io(e, "Failed to create anonymous mapping"))?;
                let base = mmap.as_mut_ptr();

                Ok(Self {
                    name: config.name,
                    backing_type: BackingType::Anonymous,
                    path: None,
                    mmap,
                    base,
                    _file: None,
                })
            }
        }
    }

    /// Create the backing file if missing, never truncating an existing one
    pub fn open_backing_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(BACKING_FILE_MODE)
            .open(path)
            .map_err(|e| PipeError::from_io(e, "Failed to create/open file"))
    }

    /// Give a freshly created (empty) backing file its length
    ///
    /// A file that already has a length keeps it: peers may have mapped it,
    /// and every peer derives the layout from the file, not from its own
    /// configuration. Returns whether the file was sized.
    pub fn size_if_empty(file: &File, size: usize) -> Result<bool> {
        let current = file
            .metadata()
            .map_err(|e| PipeError::from_io(e, "Failed to stat backing file"))?
            .len();
        if current > 0 {
            return Ok(false);
        }

        file.set_len(size as u64)
            .map_err(|e| PipeError::from_io(e, "Failed to set file size"))?;
        Ok(true)
    }

    /// Map the whole of an already sized backing file
    pub fn map_file(name: impl Into<String>, file: File, path: impl Into<PathBuf>) -> Result<Self> {
        let len = file
            .metadata()
            .map_err(|e| PipeError::from_io(e, "Failed to stat backing file"))?
            .len() as usize;

        if len == 0 {
            return Err(PipeError::invalid_parameter(
                "size",
                "Cannot map an empty backing file",
            ));
        }

        let mut mmap = unsafe {
            MmapOptions::new()
                .len(len)
                .map_mut(&file)
                .map_err(|e| PipeError::from_io(e, "Failed to create memory mapping"))?
        };
        let base = mmap.as_mut_ptr();

        Ok(Self {
            name: name.into(),
            backing_type: BackingType::FileBacked,
            path: Some(path.into()),
            mmap,
            base,
            _file: Some(file),
        })
    }

    /// Base address of the mapping
    ///
    /// Writes through this pointer must follow the single-writer discipline of
    /// whatever layout lives in the region.
    pub fn base_ptr(&self) -> *mut u8 {
        self.base
    }

    /// Get the size of the region
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Get the name of the region
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing file path, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if the region is file-backed
    pub fn is_file_backed(&self) -> bool {
        matches!(self.backing_type, BackingType::FileBacked)
    }
}

unsafe impl Send for SharedMemoryRegion {}
unsafe impl Sync for SharedMemoryRegion {}
