//! In-region layout of a ring buffer
//!
//! ```text
//! offset 0   initialized  u32   written once, by the initializing process
//! offset 4   closed       u32   written by whichever endpoint closes first
//! offset 8   head         u32   next read offset, written only by the consumer
//! offset 12  tail         u32   next write offset, written only by the producer
//! offset 16  data         [u8; capacity]
//! ```

use std::{
    mem::{align_of, size_of},
    sync::atomic::AtomicU32,
};

/// Shared ring state embedded at the start of the ring's byte region
#[repr(C)]
pub struct RingHeader {
    pub initialized: AtomicU32,
    pub closed: AtomicU32,
    pub head: AtomicU32,
    pub tail: AtomicU32,
}

/// Bytes occupied by [`RingHeader`]
pub const RING_HEADER_SIZE: usize = size_of::<RingHeader>();

/// Required alignment of a ring's region offset
pub const RING_ALIGN: usize = align_of::<RingHeader>();

/// Smallest usable ring: header plus one data byte and the reserved slot
pub const MIN_RING_REGION: usize = RING_HEADER_SIZE + 2;

/// Data capacity of a ring laid out in `region_len` bytes
pub const fn capacity_for(region_len: usize) -> usize {
    region_len.saturating_sub(RING_HEADER_SIZE)
}

/// Point-in-time copy of the shared header, for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSnapshot {
    pub initialized: bool,
    pub closed: bool,
    pub head: usize,
    pub tail: usize,
    pub capacity: usize,
}

impl RingSnapshot {
    /// Occupied byte count implied by the snapshot
    pub fn len(&self) -> usize {
        if self.capacity == 0 {
            return 0;
        }
        let (head, tail) = (self.head % self.capacity, self.tail % self.capacity);
        (tail + self.capacity - head) % self.capacity
    }

    /// Whether the snapshot shows no buffered bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        assert_eq!(RING_HEADER_SIZE, 16);
        assert_eq!(RING_ALIGN, 4);
        assert_eq!(capacity_for(2048), 2032);
        assert_eq!(capacity_for(8), 0);
    }

    #[test]
    fn test_snapshot_len_wraps() {
        let snapshot = RingSnapshot {
            initialized: true,
            closed: false,
            head: 6,
            tail: 2,
            capacity: 8,
        };
        assert_eq!(snapshot.len(), 4);
    }
}
