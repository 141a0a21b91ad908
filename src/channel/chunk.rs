//! Channels over a directory of numbered chunk files
//!
//! A stream is a sequence of files `<base>_0`, `<base>_1`, ... holding raw
//! payload bytes. Each chunk is written under a hidden temporary name and
//! renamed into place, so a reader never sees a partially written chunk.
//! Either endpoint signals close by creating the zero-length
//! [`CLOSE_MARKER`](crate::config::CLOSE_MARKER) file with `create_new`; the
//! endpoint whose creation fails with `AlreadyExists` closed second.

use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};

use crate::{
    config::{PipeConfig, CLOSE_MARKER},
    error::{PipeError, Result},
    sync::Poller,
};

use super::{ChannelState, ReadableChannel, WritableChannel};

/// Naming scheme of one chunk directory
#[derive(Debug, Clone)]
pub struct ChunkLayout {
    dir: PathBuf,
    base: String,
}

impl ChunkLayout {
    /// Layout for chunks named `<base>_<n>` in `dir`
    pub fn new(dir: impl Into<PathBuf>, base: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base: base.into(),
        }
    }

    /// Directory holding the chunks
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of chunk `seq`
    pub fn chunk_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}_{}", self.base, seq))
    }

    /// Temporary path a chunk is staged under before being published
    fn staging_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!(".{}_{}.tmp", self.base, seq))
    }

    /// Path of the close marker
    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(CLOSE_MARKER)
    }

    /// Sequence number of a published chunk file name, if it is one
    pub fn parse_chunk_name(&self, name: &str) -> Option<u64> {
        let digits = name.strip_prefix(&self.base)?.strip_prefix('_')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    /// Published chunk sequence numbers, ascending
    pub fn list_chunks(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PipeError::from_io(e, "Failed to list chunk directory")),
        };

        let mut seqs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipeError::from_io(e, "Failed to list chunk directory"))?;
            if let Some(seq) = entry.file_name().to_str().and_then(|n| self.parse_chunk_name(n)) {
                seqs.push(seq);
            }
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    /// Whether either endpoint has signalled close
    pub fn is_marked_closed(&self) -> bool {
        self.marker_path().exists()
    }

    /// Try to create the close marker; `Ok(true)` if it already existed
    pub fn mark_closed(&self) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path())
        {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(true),
            Err(e) => Err(PipeError::from_io(e, "Failed to create close marker")),
        }
    }

    fn create_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| PipeError::from_io(e, "Failed to create chunk directory"))
    }
}

/// Remove a directory tree, treating an already missing tree as success
pub(crate) fn remove_tree(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
}

/// Shared close bookkeeping of both chunk endpoints
#[derive(Debug)]
struct CloseState {
    closed: bool,
    closed_last: bool,
    clean_up_on_close: bool,
}

impl CloseState {
    fn new(clean_up_on_close: bool) -> Self {
        Self {
            closed: false,
            closed_last: false,
            clean_up_on_close,
        }
    }

    /// Signal close once; later calls repeat the first outcome
    fn close(&mut self, layout: &ChunkLayout) -> Result<bool> {
        if self.closed {
            return Ok(self.closed_last);
        }

        let peer_first = layout.mark_closed()?;
        self.closed = true;
        self.closed_last = peer_first;
        if peer_first && self.clean_up_on_close {
            remove_tree(layout.dir());
        }
        Ok(peer_first)
    }
}

/// Appending end of a chunk directory
#[derive(Debug)]
pub struct ChunkFileWriter {
    layout: ChunkLayout,
    next_seq: u64,
    max_chunk_size: usize,
    state: CloseState,
}

impl ChunkFileWriter {
    /// Open a writer on `dir`, creating it if needed
    ///
    /// Appends after any chunks already present.
    pub fn open(dir: impl Into<PathBuf>, config: &PipeConfig) -> Result<Self> {
        config.validate()?;
        let layout = ChunkLayout::new(dir, config.chunk_base_name.clone());
        layout.create_dir()?;
        let next_seq = layout.list_chunks()?.last().map_or(0, |seq| seq + 1);

        Ok(Self {
            layout,
            next_seq,
            max_chunk_size: config.max_chunk_size,
            state: CloseState::new(config.clean_up_on_close),
        })
    }

    /// Directory layout
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Sequence number the next chunk will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Delete the directory once both endpoints have closed
    pub fn clean_up_on_close(&mut self) {
        self.state.clean_up_on_close = true;
    }

    /// Signal close; returns `true` if the peer had closed first
    pub fn close_shared(&mut self) -> Result<bool> {
        self.state.close(&self.layout)
    }

    fn publish(&mut self, payload: &[u8]) -> Result<()> {
        let staging = self.layout.staging_path(self.next_seq);
        let target = self.layout.chunk_path(self.next_seq);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .map_err(|e| PipeError::from_io(e, "Failed to create chunk file"))?;
        file.write_all(payload)
            .map_err(|e| PipeError::from_io(e, "Failed to write chunk file"))?;
        drop(file);

        fs::rename(&staging, &target)
            .map_err(|e| PipeError::from_io(e, "Failed to publish chunk file"))?;
        self.next_seq += 1;
        Ok(())
    }
}

impl WritableChannel for ChunkFileWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.state.closed {
            return Err(PipeError::channel_closed("chunk writer"));
        }
        if buf.is_empty() {
            return Ok(0);
        }
        if self.layout.is_marked_closed() {
            return Err(PipeError::peer_closed("chunk writer"));
        }

        let count = buf.len().min(self.max_chunk_size);
        self.publish(&buf[..count])?;
        Ok(count)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte]).map(|_| ())
    }

    fn state(&self) -> ChannelState {
        ChannelState::derive(self.state.closed, self.layout.is_marked_closed())
    }

    fn close(&mut self) -> Result<()> {
        self.close_shared().map(|_| ())
    }
}

/// Consuming end of a chunk directory
#[derive(Debug)]
pub struct ChunkFileReader {
    layout: ChunkLayout,
    next_seq: u64,
    pending: Vec<u8>,
    offset: usize,
    poller: Poller,
    state: CloseState,
}

impl ChunkFileReader {
    /// Open a reader on `dir`, starting at chunk 0
    pub fn open(dir: impl Into<PathBuf>, config: &PipeConfig) -> Result<Self> {
        config.validate()?;
        let layout = ChunkLayout::new(dir, config.chunk_base_name.clone());
        layout.create_dir()?;

        Ok(Self {
            layout,
            next_seq: 0,
            pending: Vec::new(),
            offset: 0,
            poller: config.poller(),
            state: CloseState::new(config.clean_up_on_close),
        })
    }

    /// Directory layout
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Sequence number of the next chunk to consume
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Delete the directory once both endpoints have closed
    pub fn clean_up_on_close(&mut self) {
        self.state.clean_up_on_close = true;
    }

    /// Signal close; returns `true` if the peer had closed first
    pub fn close_shared(&mut self) -> Result<bool> {
        self.state.close(&self.layout)
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.pending[self.offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.offset += count;
        count
    }

    /// Load the next non-empty chunk into `pending`; `false` if none is published yet
    fn load_next_chunk(&mut self) -> Result<bool> {
        loop {
            match fs::read(self.layout.chunk_path(self.next_seq)) {
                Ok(bytes) => {
                    self.next_seq += 1;
                    if bytes.is_empty() {
                        continue;
                    }
                    self.pending = bytes;
                    self.offset = 0;
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(PipeError::from_io(e, "Failed to read chunk file")),
            }
        }
    }

    /// One look at the directory: data, end of stream, or nothing yet
    fn poll_once(&mut self, buf: &mut [u8]) -> Result<Option<Option<usize>>> {
        if self.load_next_chunk()? {
            return Ok(Some(Some(self.drain_pending(buf))));
        }
        if self.layout.is_marked_closed() {
            // A chunk may have been published just before the marker.
            if self.load_next_chunk()? {
                return Ok(Some(Some(self.drain_pending(buf))));
            }
            return Ok(Some(None));
        }
        Ok(None)
    }
}

impl ReadableChannel for ChunkFileReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.state.closed {
            return Err(PipeError::channel_closed("chunk reader"));
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }
        if self.offset < self.pending.len() {
            return Ok(Some(self.drain_pending(buf)));
        }

        let poller = self.poller.clone();
        poller.wait_for("waiting for chunk", || self.poll_once(buf))
    }

    fn state(&self) -> ChannelState {
        ChannelState::derive(self.state.closed, self.layout.is_marked_closed())
    }

    fn close(&mut self) -> Result<()> {
        self.close_shared().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_name() {
        let layout = ChunkLayout::new("/tmp", "chunk");
        assert_eq!(layout.parse_chunk_name("chunk_0"), Some(0));
        assert_eq!(layout.parse_chunk_name("chunk_42"), Some(42));
        assert_eq!(layout.parse_chunk_name("chunk_"), None);
        assert_eq!(layout.parse_chunk_name("chunk_4x"), None);
        assert_eq!(layout.parse_chunk_name(".chunk_1.tmp"), None);
        assert_eq!(layout.parse_chunk_name("other_1"), None);
        assert_eq!(layout.parse_chunk_name(CLOSE_MARKER), None);
    }
}
