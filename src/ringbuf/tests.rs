#[cfg(test)]
mod tests {
    use crate::memory::{BackingType, RegionConfig, SharedMemoryRegion};
    use crate::ringbuf::{RingBuffer, RING_HEADER_SIZE};
    use std::sync::Arc;

    #[test]
    fn test_ring_buffer_basic() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        assert!(ring.is_initialized());
        assert!(ring.is_empty());

        assert!(ring.offer(1));
        assert!(ring.offer(2));
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.peek(), Some(1));
        assert_eq!(ring.len(), 2);

        assert_eq!(ring.poll(), Some(1));
        assert_eq!(ring.poll(), Some(2));
        assert_eq!(ring.poll(), None);
        assert_eq!(ring.peek(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_buffer_reserves_one_slot() {
        let ring = RingBuffer::with_capacity(4).unwrap();

        assert!(ring.offer(1));
        assert!(ring.offer(2));
        assert!(ring.offer(3));
        assert!(ring.is_full());
        assert_eq!(ring.free(), 0);

        // Full offer fails without touching state
        assert!(!ring.offer(4));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.poll(), Some(1));
        assert!(!ring.is_full());
    }

    #[test]
    fn test_ring_buffer_wrap_around() {
        let ring = RingBuffer::with_capacity(4).unwrap();

        for i in 0..3 {
            assert!(ring.offer(i));
        }
        for i in 0..2 {
            assert_eq!(ring.poll(), Some(i));
        }

        // Should wrap around
        assert!(ring.offer(3));
        assert!(ring.offer(4));

        assert_eq!(ring.poll(), Some(2));
        assert_eq!(ring.poll(), Some(3));
        assert_eq!(ring.poll(), Some(4));
        assert!(ring.is_empty());
    }

    #[test]
    fn test_bulk_copy_wraps() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        assert_eq!(ring.write_from(b"abcde"), 5);

        let mut out = [0u8; 3];
        assert_eq!(ring.read_into(&mut out), 3);
        assert_eq!(&out, b"abc");

        // 7 usable slots, 2 occupied
        assert_eq!(ring.write_from(b"fghijklm"), 5);
        assert!(ring.is_full());

        let mut out = [0u8; 16];
        let n = ring.read_into(&mut out);
        assert_eq!(&out[..n], b"defghij");
    }

    #[test]
    fn test_occupancy_invariant_under_interleaving() {
        let capacity = 5;
        let ring = RingBuffer::with_capacity(capacity).unwrap();
        let mut model = std::collections::VecDeque::new();
        let mut seed = 0x2545_f491u32;

        for step in 0..2000u32 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;

            if seed % 3 == 0 {
                assert_eq!(ring.poll(), model.pop_front());
            } else {
                let byte = step as u8;
                let accepted = ring.offer(byte);
                assert_eq!(accepted, model.len() < capacity - 1);
                if accepted {
                    model.push_back(byte);
                }
            }

            assert!(ring.len() <= capacity - 1);
            assert_eq!(ring.len(), model.len());
            assert_eq!(ring.is_empty(), model.is_empty());
            assert_eq!(ring.is_full(), model.len() == capacity - 1);
        }
    }

    #[test]
    fn test_close_reports_previous_state() {
        let ring = RingBuffer::with_capacity(4).unwrap();
        assert!(!ring.is_closed());
        assert!(!ring.close());
        assert!(ring.is_closed());
        assert!(ring.close());
    }

    #[test]
    fn test_init_resets_shared_state() {
        let ring = RingBuffer::with_capacity(8).unwrap();
        ring.write_from(b"xyz");
        ring.close();

        ring.init();
        assert!(ring.is_empty());
        assert!(!ring.is_closed());
        assert!(ring.is_initialized());
    }

    #[test]
    fn test_two_handles_share_state() {
        let config = RegionConfig::new("pair", 256).with_backing_type(BackingType::Anonymous);
        let region = Arc::new(SharedMemoryRegion::new(config).unwrap());

        let first = RingBuffer::new(Arc::clone(&region), 0, 128).unwrap();
        let second = RingBuffer::new(Arc::clone(&region), 128, 128).unwrap();
        assert!(!first.is_initialized());
        first.init();
        second.init();
        assert_eq!(first.capacity(), 128 - RING_HEADER_SIZE);

        let view = RingBuffer::new(region, 0, 128).unwrap();
        first.offer(42);
        assert_eq!(view.poll(), Some(42));
        assert!(second.is_empty());
    }

    #[test]
    fn test_invalid_geometry() {
        let config = RegionConfig::new("small", 64).with_backing_type(BackingType::Anonymous);
        let region = Arc::new(SharedMemoryRegion::new(config).unwrap());

        assert!(RingBuffer::new(Arc::clone(&region), 2, 32).is_err());
        assert!(RingBuffer::new(Arc::clone(&region), 0, RING_HEADER_SIZE + 1).is_err());
        assert!(RingBuffer::new(Arc::clone(&region), 32, 64).is_err());
    }
}
