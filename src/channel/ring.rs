//! Channels over a shared-memory ring buffer

use crate::{
    config::PipeConfig,
    error::{PipeError, Result},
    ringbuf::RingBuffer,
    sync::Poller,
};

use super::{ChannelState, ReadableChannel, WritableChannel};

fn wait_initialized(ring: &RingBuffer, poller: &Poller) -> Result<()> {
    if ring.is_initialized() {
        return Ok(());
    }
    poller.wait_for("waiting for ring initialization", || {
        Ok(ring.is_initialized().then_some(()))
    })
}

/// Consumer end of a ring
#[derive(Debug)]
pub struct RingReader {
    ring: RingBuffer,
    poller: Poller,
    closed: bool,
    closed_last: bool,
}

impl RingReader {
    /// Create a reader over `ring`
    pub fn new(ring: RingBuffer, config: &PipeConfig) -> Self {
        Self {
            ring,
            poller: config.poller(),
            closed: false,
            closed_last: false,
        }
    }

    /// Underlying ring
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Mark the ring closed; returns `true` if the peer had closed first
    ///
    /// Later calls leave the ring alone and repeat the first outcome.
    pub fn close_shared(&mut self) -> bool {
        if !self.closed {
            self.closed = true;
            self.closed_last = self.ring.close();
        }
        self.closed_last
    }
}

impl ReadableChannel for RingReader {
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if self.closed {
            return Err(PipeError::channel_closed("ring reader"));
        }
        if buf.is_empty() {
            return Ok(Some(0));
        }

        wait_initialized(&self.ring, &self.poller)?;

        let ring = &self.ring;
        self.poller.wait_for("waiting for data", || {
            let count = ring.read_into(buf);
            if count > 0 {
                return Ok(Some(Some(count)));
            }
            if ring.is_closed() {
                // The writer may have published bytes between our read and its close.
                let count = ring.read_into(buf);
                return Ok(Some((count > 0).then_some(count)));
            }
            Ok(None)
        })
    }

    fn state(&self) -> ChannelState {
        ChannelState::derive(self.closed, self.ring.is_closed())
    }

    fn close(&mut self) -> Result<()> {
        self.close_shared();
        Ok(())
    }
}

/// Producer end of a ring
#[derive(Debug)]
pub struct RingWriter {
    ring: RingBuffer,
    poller: Poller,
    closed: bool,
    closed_last: bool,
}

impl RingWriter {
    /// Create a writer over `ring`
    pub fn new(ring: RingBuffer, config: &PipeConfig) -> Self {
        Self {
            ring,
            poller: config.poller(),
            closed: false,
            closed_last: false,
        }
    }

    /// Underlying ring
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Mark the ring closed; returns `true` if the peer had closed first
    pub fn close_shared(&mut self) -> bool {
        if !self.closed {
            self.closed = true;
            self.closed_last = self.ring.close();
        }
        self.closed_last
    }

    fn check_writable(&self) -> Result<()> {
        if self.closed {
            return Err(PipeError::channel_closed("ring writer"));
        }
        wait_initialized(&self.ring, &self.poller)
    }
}

impl WritableChannel for RingWriter {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_writable()?;
        if buf.is_empty() {
            return Ok(0);
        }

        let ring = &self.ring;
        self.poller.wait_for("waiting for space", || {
            if ring.is_closed() {
                return Err(PipeError::peer_closed("ring writer"));
            }
            let count = ring.write_from(buf);
            Ok((count > 0).then_some(count))
        })
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.check_writable()?;

        let ring = &self.ring;
        self.poller.wait_for("waiting for space", || {
            if ring.is_closed() {
                return Err(PipeError::peer_closed("ring writer"));
            }
            Ok(ring.offer(byte).then_some(()))
        })
    }

    fn state(&self) -> ChannelState {
        ChannelState::derive(self.closed, self.ring.is_closed())
    }

    fn close(&mut self) -> Result<()> {
        self.close_shared();
        Ok(())
    }
}
