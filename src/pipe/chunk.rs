//! Pipe over two chunk-file directories
//!
//! ```text
//! <pipe dir>/a/   read by Host, written by Guest
//! <pipe dir>/b/   read by Guest, written by Host
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{
    channel::{chunk::remove_tree, ChunkFileReader, ChunkFileWriter, ReadableChannel, WritableChannel},
    config::PipeConfig,
    error::{PipeError, Result},
};

use super::{Pipe, PipeKind, Role};

/// Directory of the first direction
pub const FIRST_DIR: &str = "a";

/// Directory of the second direction
pub const SECOND_DIR: &str = "b";

/// Endpoint of a chunk-file pipe
#[derive(Debug)]
pub struct ChunkFilePipe {
    dir: PathBuf,
    role: Role,
    reader: ChunkFileReader,
    writer: ChunkFileWriter,
    clean_up_on_close: bool,
    closed: bool,
}

impl ChunkFilePipe {
    /// Open the pipe rooted at `dir`, creating both direction directories
    pub fn open(dir: &Path, role: Role, config: &PipeConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(dir).map_err(|e| PipeError::from_io(e, "Failed to create pipe directory"))?;

        let (inbound, outbound) = if role.reads_first_half() {
            (FIRST_DIR, SECOND_DIR)
        } else {
            (SECOND_DIR, FIRST_DIR)
        };
        let reader = ChunkFileReader::open(dir.join(inbound), config)?;
        let writer = ChunkFileWriter::open(dir.join(outbound), config)?;

        debug!("Opened chunk-file pipe {} as {:?}", dir.display(), role);

        Ok(Self {
            dir: dir.to_path_buf(),
            role,
            reader,
            writer,
            clean_up_on_close: config.clean_up_on_close,
            closed: false,
        })
    }

    /// Pipe root directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Inbound chunk reader
    pub fn reader(&mut self) -> &mut ChunkFileReader {
        &mut self.reader
    }

    /// Outbound chunk writer
    pub fn writer(&mut self) -> &mut ChunkFileWriter {
        &mut self.writer
    }
}

impl Pipe for ChunkFilePipe {
    fn kind(&self) -> PipeKind {
        PipeKind::ChunkFile
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
        self.reader.clean_up_on_close();
        self.writer.clean_up_on_close();
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Same fixed order on both endpoints: directory `a`, then `b`.
        let closed_last = if self.role.reads_first_half() {
            self.reader.close_shared()?;
            self.writer.close_shared()?
        } else {
            self.writer.close_shared()?;
            self.reader.close_shared()?
        };

        debug!("Closed chunk-file pipe {} as {:?}", self.dir.display(), self.role);
        if closed_last && self.clean_up_on_close {
            remove_tree(&self.dir);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for ChunkFilePipe {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
