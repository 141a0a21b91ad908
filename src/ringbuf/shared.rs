//! Single-producer single-consumer byte ring living inside a mapped region

use std::{
    ptr::{self, NonNull},
    sync::{atomic::Ordering, Arc},
};

use crate::{
    error::{PipeError, Result},
    memory::{BackingType, RegionConfig, SharedMemoryRegion},
};

use super::layout::{capacity_for, RingHeader, RingSnapshot, MIN_RING_REGION, RING_ALIGN, RING_HEADER_SIZE};

/// Fixed-capacity circular byte queue whose state lives in the region it governs
///
/// One slot is always kept free so that `head == tail` means empty and
/// `tail + 1 == head` means full. `head` is written only by the consumer and
/// `tail` only by the producer, so the two endpoints never store to the same
/// field; index publication uses release stores and the other side's index is
/// read with acquire loads.
///
/// Cloning yields another handle on the same ring and keeps the mapping alive.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    /// Keeps the mapping alive while any handle exists
    region: Arc<SharedMemoryRegion>,
    /// Shared header at the start of the ring's slice
    header: NonNull<RingHeader>,
    /// First data byte
    data: NonNull<u8>,
    /// Data capacity in bytes, including the reserved slot
    capacity: usize,
}

impl RingBuffer {
    /// View `len` bytes at `offset` of `region` as a ring
    ///
    /// Does not touch the shared state; call [`RingBuffer::init`] from exactly
    /// one process before use.
    pub fn new(region: Arc<SharedMemoryRegion>, offset: usize, len: usize) -> Result<Self> {
        if offset % RING_ALIGN != 0 {
            return Err(PipeError::invalid_parameter(
                "offset",
                format!("Ring offset {} not aligned to {}", offset, RING_ALIGN),
            ));
        }

        if len < MIN_RING_REGION {
            return Err(PipeError::invalid_parameter(
                "len",
                format!("Ring region must be at least {} bytes", MIN_RING_REGION),
            ));
        }

        let end = offset
            .checked_add(len)
            .ok_or_else(|| PipeError::invalid_parameter("len", "Ring region overflows"))?;
        if end > region.size() {
            return Err(PipeError::invalid_parameter(
                "len",
                format!("Ring region {}..{} exceeds mapping of {} bytes", offset, end, region.size()),
            ));
        }

        let capacity = capacity_for(len);
        if capacity > u32::MAX as usize {
            return Err(PipeError::invalid_parameter(
                "len",
                "Ring capacity must fit in 32 bits",
            ));
        }

        let base = NonNull::new(region.base_ptr())
            .ok_or_else(|| PipeError::platform(format!("Region {} is not mapped", region.name())))?;

        // Bounds and alignment were checked above.
        let (header, data) = unsafe {
            let start = base.as_ptr().add(offset);
            (
                NonNull::new_unchecked(start as *mut RingHeader),
                NonNull::new_unchecked(start.add(RING_HEADER_SIZE)),
            )
        };

        Ok(Self {
            region,
            header,
            data,
            capacity,
        })
    }

    /// Allocate a process-local ring with the given data capacity, already initialized
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let config = RegionConfig::new("local-ring", RING_HEADER_SIZE + capacity)
            .with_backing_type(BackingType::Anonymous);
        let region = Arc::new(SharedMemoryRegion::new(config)?);
        let ring = Self::new(region, 0, RING_HEADER_SIZE + capacity)?;
        ring.init();
        Ok(ring)
    }

    fn header(&self) -> &RingHeader {
        // The header is inside the mapping, which `region` keeps alive.
        unsafe { self.header.as_ref() }
    }

    /// Reset the shared state and publish it as initialized
    ///
    /// `initialized` is stored last with release ordering, so a peer that
    /// observes it also observes the zeroed indices and flags.
    pub fn init(&self) {
        let header = self.header();
        header.head.store(0, Ordering::Relaxed);
        header.tail.store(0, Ordering::Relaxed);
        header.closed.store(0, Ordering::Relaxed);
        header.initialized.store(1, Ordering::Release);
    }

    /// Whether some process has initialized this ring
    pub fn is_initialized(&self) -> bool {
        self.header().initialized.load(Ordering::Acquire) != 0
    }

    /// Whether either endpoint has closed this ring
    pub fn is_closed(&self) -> bool {
        self.header().closed.load(Ordering::Acquire) != 0
    }

    /// Mark the ring closed
    ///
    /// Idempotent. Returns `true` if the ring was already closed, meaning the
    /// other endpoint got there first.
    pub fn close(&self) -> bool {
        self.header().closed.swap(1, Ordering::AcqRel) != 0
    }

    /// Data capacity in bytes; at most `capacity - 1` bytes can be buffered
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn load_head(&self, ordering: Ordering) -> usize {
        self.header().head.load(ordering) as usize % self.capacity
    }

    fn load_tail(&self, ordering: Ordering) -> usize {
        self.header().tail.load(ordering) as usize % self.capacity
    }

    fn occupied(&self, head: usize, tail: usize) -> usize {
        (tail + self.capacity - head) % self.capacity
    }

    /// Number of buffered bytes
    pub fn len(&self) -> usize {
        let head = self.load_head(Ordering::Acquire);
        let tail = self.load_tail(Ordering::Acquire);
        self.occupied(head, tail)
    }

    /// Bytes that can be written before the ring is full
    pub fn free(&self) -> usize {
        self.capacity - 1 - self.len()
    }

    /// Check if the ring holds no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if only the reserved slot is left
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity - 1
    }

    /// Append one byte; `false` without side effects if full
    pub fn offer(&self, byte: u8) -> bool {
        let tail = self.load_tail(Ordering::Relaxed);
        let head = self.load_head(Ordering::Acquire);
        let next = (tail + 1) % self.capacity;
        if next == head {
            return false;
        }

        unsafe { ptr::write(self.data.as_ptr().add(tail), byte) };
        self.header().tail.store(next as u32, Ordering::Release);
        true
    }

    /// Byte at `head` without consuming it
    pub fn peek(&self) -> Option<u8> {
        let head = self.load_head(Ordering::Relaxed);
        let tail = self.load_tail(Ordering::Acquire);
        if head == tail {
            return None;
        }
        Some(unsafe { ptr::read(self.data.as_ptr().add(head)) })
    }

    /// Consume the byte at `head`
    pub fn poll(&self) -> Option<u8> {
        let head = self.load_head(Ordering::Relaxed);
        let tail = self.load_tail(Ordering::Acquire);
        if head == tail {
            return None;
        }

        let byte = unsafe { ptr::read(self.data.as_ptr().add(head)) };
        self.header()
            .head
            .store(((head + 1) % self.capacity) as u32, Ordering::Release);
        Some(byte)
    }

    /// Copy as many bytes of `src` as fit, publishing them with one tail store
    pub fn write_from(&self, src: &[u8]) -> usize {
        let tail = self.load_tail(Ordering::Relaxed);
        let head = self.load_head(Ordering::Acquire);
        let free = self.capacity - 1 - self.occupied(head, tail);
        let count = free.min(src.len());
        if count == 0 {
            return 0;
        }

        let first = count.min(self.capacity - tail);
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.data.as_ptr().add(tail), first);
            ptr::copy_nonoverlapping(src.as_ptr().add(first), self.data.as_ptr(), count - first);
        }

        self.header()
            .tail
            .store(((tail + count) % self.capacity) as u32, Ordering::Release);
        count
    }

    /// Drain up to `dst.len()` buffered bytes, releasing them with one head store
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        let head = self.load_head(Ordering::Relaxed);
        let tail = self.load_tail(Ordering::Acquire);
        let count = self.occupied(head, tail).min(dst.len());
        if count == 0 {
            return 0;
        }

        let first = count.min(self.capacity - head);
        unsafe {
            ptr::copy_nonoverlapping(self.data.as_ptr().add(head), dst.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.data.as_ptr(), dst.as_mut_ptr().add(first), count - first);
        }

        self.header()
            .head
            .store(((head + count) % self.capacity) as u32, Ordering::Release);
        count
    }

    /// Copy of the shared header
    pub fn snapshot(&self) -> RingSnapshot {
        let header = self.header();
        RingSnapshot {
            initialized: header.initialized.load(Ordering::Acquire) != 0,
            closed: header.closed.load(Ordering::Acquire) != 0,
            head: header.head.load(Ordering::Acquire) as usize,
            tail: header.tail.load(Ordering::Acquire) as usize,
            capacity: self.capacity,
        }
    }

    /// Region this ring lives in
    pub fn region(&self) -> &Arc<SharedMemoryRegion> {
        &self.region
    }
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}
