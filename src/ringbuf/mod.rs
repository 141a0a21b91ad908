//! Byte ring buffers whose whole state lives in shared memory

pub mod layout;
pub mod shared;

#[cfg(test)]
mod tests;

// Re-export main types for convenience
pub use layout::{RingHeader, RingSnapshot, RING_HEADER_SIZE};
pub use shared::RingBuffer;
