//! Two-endpoint pipes over a shared backing resource
//!
//! A pipe owns one inbound and one outbound channel bound to disjoint halves
//! of a single resource. Which half is inbound is derived from the [`Role`]
//! alone, so two endpoints holding opposite roles agree on direction without
//! exchanging a message.

pub mod chunk;
pub mod shm;

pub use chunk::ChunkFilePipe;
pub use shm::SharedMemoryPipe;

use std::{fmt, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    channel::{ReadableChannel, WritableChannel},
    config::PipeConfig,
    error::{PipeError, Result},
};

/// Which side of a pipe an endpoint is
///
/// `Host` reads the first half of the backing resource and writes the
/// second; `Guest` is the mirror. The rendezvous server always takes `Host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The role the peer holds
    pub fn opposite(self) -> Self {
        match self {
            Role::Host => Role::Guest,
            Role::Guest => Role::Host,
        }
    }

    /// Whether this role reads the first half of the backing resource
    pub fn reads_first_half(self) -> bool {
        matches!(self, Role::Host)
    }
}

/// Pipe implementations known to this build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipeKind {
    /// Memory-mapped file split into two rings
    SharedMemory,
    /// Two directories of numbered chunk files
    ChunkFile,
}

impl PipeKind {
    /// Every implementation, in default preference order
    pub const ALL: [PipeKind; 2] = [PipeKind::SharedMemory, PipeKind::ChunkFile];

    /// Name used in `accept-types` lists and rendezvous responses
    pub fn name(&self) -> &'static str {
        match self {
            PipeKind::SharedMemory => "shared-memory",
            PipeKind::ChunkFile => "chunk-file",
        }
    }

    /// Open this kind of pipe rooted at `dir`
    pub fn open(self, dir: &Path, role: Role, config: &PipeConfig) -> Result<AnyPipe> {
        match self {
            PipeKind::SharedMemory => SharedMemoryPipe::open(dir, role, config).map(AnyPipe::SharedMemory),
            PipeKind::ChunkFile => ChunkFilePipe::open(dir, role, config).map(AnyPipe::ChunkFile),
        }
    }
}

impl fmt::Display for PipeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipeKind {
    type Err = PipeError;

    fn from_str(s: &str) -> Result<Self> {
        PipeKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| PipeError::unsupported_pipe_type(s))
    }
}

/// Capability shared by every pipe implementation
pub trait Pipe: Send {
    /// Implementation of this pipe
    fn kind(&self) -> PipeKind;

    /// Role this endpoint holds
    fn role(&self) -> Role;

    /// Inbound channel
    fn source(&mut self) -> &mut dyn ReadableChannel;

    /// Outbound channel
    fn sink(&mut self) -> &mut dyn WritableChannel;

    /// Delete the backing resource once both endpoints have closed
    fn clean_up_on_close(&mut self);

    /// Close both channels; idempotent
    fn close(&mut self) -> Result<()>;

    /// Whether this endpoint was closed
    fn is_closed(&self) -> bool;
}

/// A pipe of any supported implementation
#[derive(Debug)]
pub enum AnyPipe {
    SharedMemory(SharedMemoryPipe),
    ChunkFile(ChunkFilePipe),
}

impl AnyPipe {
    fn as_pipe(&self) -> &dyn Pipe {
        match self {
            AnyPipe::SharedMemory(pipe) => pipe,
            AnyPipe::ChunkFile(pipe) => pipe,
        }
    }

    fn as_pipe_mut(&mut self) -> &mut dyn Pipe {
        match self {
            AnyPipe::SharedMemory(pipe) => pipe,
            AnyPipe::ChunkFile(pipe) => pipe,
        }
    }
}

impl Pipe for AnyPipe {
    fn kind(&self) -> PipeKind {
        self.as_pipe().kind()
    }

    fn role(&self) -> Role {
        self.as_pipe().role()
    }

    fn source(&mut self) -> &mut dyn ReadableChannel {
        self.as_pipe_mut().source()
    }

    fn sink(&mut self) -> &mut dyn WritableChannel {
        self.as_pipe_mut().sink()
    }

    fn clean_up_on_close(&mut self) {
        self.as_pipe_mut().clean_up_on_close()
    }

    fn close(&mut self) -> Result<()> {
        self.as_pipe_mut().close()
    }

    fn is_closed(&self) -> bool {
        self.as_pipe().is_closed()
    }
}
