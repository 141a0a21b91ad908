//! Blocking byte-stream channels over shared transports
//!
//! Every channel follows the same close state machine:
//!
//! ```text
//!   Open ──peer closes──▶ ClosedByPeer
//!    │                        │
//!    └──── local close ───────┴──▶ Closed (terminal)
//! ```
//!
//! The state is derived from the local `closed` flag and the shared close
//! signal (ring `closed` flag or chunk close marker), never stored twice.

pub mod chunk;
pub mod ring;

pub use chunk::{ChunkFileReader, ChunkFileWriter, ChunkLayout};
pub use ring::{RingReader, RingWriter};

use crate::error::Result;

/// Observable state of one channel endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Neither side has closed
    Open,
    /// The peer signalled close; buffered bytes may still be readable
    ClosedByPeer,
    /// Closed locally
    Closed,
}

impl ChannelState {
    /// Derive the state from the local flag and the shared close signal
    pub fn derive(closed_locally: bool, closed_shared: bool) -> Self {
        if closed_locally {
            ChannelState::Closed
        } else if closed_shared {
            ChannelState::ClosedByPeer
        } else {
            ChannelState::Open
        }
    }
}

/// Inbound half of a pipe
pub trait ReadableChannel: Send {
    /// Read available bytes into `buf`
    ///
    /// Blocks until at least one byte is available, then drains what is
    /// immediately there. Returns `Ok(None)` at end of stream: the peer closed
    /// and every byte it wrote has been consumed.
    fn read(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Current state of this endpoint
    fn state(&self) -> ChannelState;

    /// Close this endpoint; idempotent
    fn close(&mut self) -> Result<()>;

    /// Read a single byte, `None` at end of stream
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        Ok(self.read(&mut byte)?.map(|_| byte[0]))
    }

    /// Whether neither side has closed
    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }
}

/// Outbound half of a pipe
pub trait WritableChannel: Send {
    /// Write as many bytes of `buf` as fit in one pass
    ///
    /// Blocks while no space is available. May write fewer bytes than
    /// requested; callers loop or use [`WritableChannel::write_all`].
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Write one byte, blocking until it is accepted
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Current state of this endpoint
    fn state(&self) -> ChannelState;

    /// Close this endpoint; idempotent
    fn close(&mut self) -> Result<()>;

    /// Write the whole buffer
    fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let written = self.write(buf)?;
            buf = &buf[written..];
        }
        Ok(())
    }

    /// Whether neither side has closed
    fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_derivation() {
        assert_eq!(ChannelState::derive(false, false), ChannelState::Open);
        assert_eq!(ChannelState::derive(false, true), ChannelState::ClosedByPeer);
        assert_eq!(ChannelState::derive(true, false), ChannelState::Closed);
        assert_eq!(ChannelState::derive(true, true), ChannelState::Closed);
    }
}
