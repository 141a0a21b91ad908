//! Pipe over a memory-mapped backing file
//!
//! The file is split into two equal halves, each holding one ring (header
//! followed by data). Initialization is a two-phase protocol: every opener
//! tries a non-blocking exclusive `flock`; the winner sizes the file if it
//! is still empty and initializes both rings unless a previous winner already
//! did, then releases the lock. Losers poll until the file is sized and both
//! rings report initialized.
//!
//! The ring layout always follows the length of the file, so endpoints
//! configured with different `shm_size` values still agree on it once the
//! first opener has sized the file.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};

use crate::{
    channel::{ReadableChannel, RingReader, RingWriter, WritableChannel},
    config::PipeConfig,
    error::{PipeError, Result},
    memory::{InitLock, RegionConfig, SharedMemoryRegion},
    ringbuf::{layout::RING_ALIGN, RingBuffer, RingSnapshot},
};

use super::{Pipe, PipeKind, Role};

/// Name of the backing file inside a pipe directory
pub const BACKING_FILE: &str = "pipe.shm";

/// Endpoint of a shared-memory pipe
#[derive(Debug)]
pub struct SharedMemoryPipe {
    path: PathBuf,
    role: Role,
    reader: RingReader,
    writer: RingWriter,
    clean_up_on_close: bool,
    closed: bool,
}

impl SharedMemoryPipe {
    /// Open the pipe whose backing file lives in `dir`
    pub fn open(dir: &Path, role: Role, config: &PipeConfig) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| PipeError::from_io(e, "Failed to create pipe directory"))?;
        Self::open_file(&dir.join(BACKING_FILE), role, config)
    }

    /// Open the pipe backed by `path`, creating the file if needed
    pub fn open_file(path: &Path, role: Role, config: &PipeConfig) -> Result<Self> {
        config.validate()?;

        let (first, second) = Self::attach(path, config)?;
        let (inbound, outbound) = if role.reads_first_half() {
            (first, second)
        } else {
            (second, first)
        };

        debug!(
            "Opened shared-memory pipe {} as {:?} ({} bytes per direction)",
            path.display(),
            role,
            inbound.capacity()
        );

        Ok(Self {
            path: path.to_path_buf(),
            role,
            reader: RingReader::new(inbound, config),
            writer: RingWriter::new(outbound, config),
            clean_up_on_close: config.clean_up_on_close,
            closed: false,
        })
    }

    /// Map the backing file and return its (first, second) rings, initialized
    fn attach(path: &Path, config: &PipeConfig) -> Result<(RingBuffer, RingBuffer)> {
        let file = SharedMemoryRegion::open_backing_file(path)?;
        let poller = config.poller();
        let name = path.display().to_string();

        match InitLock::try_acquire(&file)? {
            Some(lock) => {
                if !SharedMemoryRegion::size_if_empty(&file, config.shm_size)? {
                    debug!("{} already sized, ignoring configured size", path.display());
                }
                let region = Arc::new(SharedMemoryRegion::map_file(name, file, path)?);
                let (first, second) = split_rings(region)?;

                if first.is_initialized() && second.is_initialized() {
                    debug!("{} already initialized by peer", path.display());
                } else {
                    first.init();
                    second.init();
                    debug!("Initialized rings in {}", path.display());
                }
                drop(lock);
                Ok((first, second))
            }
            None => {
                poller.wait_for("waiting for backing file", || {
                    let len = file
                        .metadata()
                        .map_err(|e| PipeError::from_io(e, "Failed to stat backing file"))?
                        .len();
                    Ok((len > 0).then_some(()))
                })?;

                let region = Arc::new(SharedMemoryRegion::map_file(name, file, path)?);
                let (first, second) = split_rings(region)?;
                poller.wait_for("waiting for ring initialization", || {
                    Ok((first.is_initialized() && second.is_initialized()).then_some(()))
                })?;
                Ok((first, second))
            }
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inbound ring reader
    pub fn reader(&mut self) -> &mut RingReader {
        &mut self.reader
    }

    /// Outbound ring writer
    pub fn writer(&mut self) -> &mut RingWriter {
        &mut self.writer
    }

    /// Shared state of both rings in an existing backing file, first half first
    pub fn inspect(path: &Path) -> Result<[RingSnapshot; 2]> {
        let config = RegionConfig::new("inspect", 0)
            .with_file_path(path)
            .with_create(false);
        let region = Arc::new(SharedMemoryRegion::new(config)?);
        let (first, second) = split_rings(region)?;
        Ok([first.snapshot(), second.snapshot()])
    }

    fn remove_backing_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Two rings covering the halves of `region`
fn split_rings(region: Arc<SharedMemoryRegion>) -> Result<(RingBuffer, RingBuffer)> {
    let half = (region.size() / 2) & !(RING_ALIGN - 1);
    let first = RingBuffer::new(Arc::clone(&region), 0, half)?;
    let second = RingBuffer::new(region, half, half)?;
    Ok((first, second))
}

impl Pipe for SharedMemoryPipe {
    fn kind(&self) -> PipeKind {
        PipeKind::SharedMemory
    }

    fn role(&self) -> Role {
        self.role
    }

    fn source(&mut self) -> &mut dyn ReadableChannel {
        &mut self.reader
    }

    fn sink(&mut self) -> &mut dyn WritableChannel {
        &mut self.writer
    }

    fn clean_up_on_close(&mut self) {
        self.clean_up_on_close = true;
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Both endpoints close the first half before the second, so whoever
        // closes the second half last is the last one using the file.
        let closed_last = if self.role.reads_first_half() {
            self.reader.close_shared();
            self.writer.close_shared()
        } else {
            self.writer.close_shared();
            self.reader.close_shared()
        };

        debug!("Closed shared-memory pipe {} as {:?}", self.path.display(), self.role);
        if closed_last && self.clean_up_on_close {
            self.remove_backing_file();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for SharedMemoryPipe {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
