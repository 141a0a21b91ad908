//! # fspipe - Inter-process pipes over a shared filesystem
//!
//! fspipe connects unrelated processes that share nothing but directories.
//! It provides a byte-stream pipe with two interchangeable transports and a
//! rendezvous protocol that lets a server hand out pipes to clients without
//! any socket or pre-existing channel.
//!
//! ## Features
//!
//! - **Shared-memory pipes**: a mapped file split into two lock-free rings
//! - **Chunk-file pipes**: numbered files in two directories, for filesystems
//!   where mapping is unavailable or unreliable
//! - **Rendezvous**: request/response entries in a connect directory, with
//!   pipe-type negotiation through `accept-types`
//! - **Polling only**: every wait is a bounded-interval check of shared state,
//!   observing deadlines and cancellation
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  <token>.req   ┌──────────────┐
//! │  PipeClient  │ ─────────────▶ │  PipeServer  │
//! │   (Guest)    │ ◀───────────── │   (Host)     │
//! └──────┬───────┘  <token>.resp  └──────┬───────┘
//!        │                               │
//!        ▼                               ▼
//! ┌─────────────────────────────────────────────────┐
//! │  <pipe dir>/<token>/                            │
//! │    pipe.shm  [ring: guest→host][ring: host→guest]│
//! │    or  a/chunk_0 a/chunk_1 ...  b/chunk_0 ...   │
//! └─────────────────────────────────────────────────┘
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod memory;
pub mod ringbuf;
pub mod sync;

// Transports
pub mod channel;
pub mod pipe;

// Connection establishment
pub mod rendezvous;

// Main API re-exports
pub use channel::{ChannelState, ReadableChannel, WritableChannel};
pub use config::PipeConfig;
pub use error::{PipeError, Result};
pub use memory::{BackingType, RegionConfig, SharedMemoryRegion};
pub use pipe::{AnyPipe, ChunkFilePipe, Pipe, PipeKind, Role, SharedMemoryPipe};
pub use rendezvous::{
    ClientConfig, Connection, ConnectionRequest, PipeClient, PipeServer, ServerConfig,
};
pub use ringbuf::RingBuffer;
pub use sync::{CancelToken, Poller};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
