//! Channel behaviour tests
//! Streams over rings and chunk directories, end of stream and close handling

use std::{
    fs, thread,
    time::{Duration, Instant},
};

use fspipe::{
    channel::{ChunkFileReader, ChunkFileWriter, RingReader, RingWriter},
    CancelToken, ChannelState, PipeConfig, PipeError, ReadableChannel, RingBuffer, WritableChannel,
};
use tempfile::TempDir;

fn fast_config() -> PipeConfig {
    PipeConfig::new().with_poll_interval(Duration::from_millis(2))
}

fn read_to_end(reader: &mut dyn ReadableChannel) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 37];
    while let Some(n) = reader.read(&mut buf).unwrap() {
        out.extend_from_slice(&buf[..n]);
    }
    out
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[cfg(test)]
mod channel_tests {
    use super::*;

    /// Test: A stream written in uneven pieces through a small ring arrives intact
    #[test]
    fn ring_stream_survives_uneven_writes() {
        let ring = RingBuffer::with_capacity(64).unwrap();
        let config = fast_config();
        let mut writer = RingWriter::new(ring.clone(), &config);
        let mut reader = RingReader::new(ring, &config);
        let payload = pattern(10_000);

        let expected = payload.clone();
        let producer = thread::spawn(move || {
            let sizes = [1usize, 7, 63, 200, 3];
            let mut rest = &payload[..];
            let mut i = 0;
            while !rest.is_empty() {
                let take = sizes[i % sizes.len()].min(rest.len());
                writer.write_all(&rest[..take]).unwrap();
                rest = &rest[take..];
                i += 1;
            }
            writer.close().unwrap();
        });

        let received = read_to_end(&mut reader);
        producer.join().unwrap();
        assert_eq!(received, expected);
        assert_eq!(reader.state(), ChannelState::ClosedByPeer);
    }

    /// Test: Buffered bytes are delivered before end of stream
    #[test]
    fn ring_drains_before_eof() {
        let ring = RingBuffer::with_capacity(32).unwrap();
        let config = fast_config();
        let mut writer = RingWriter::new(ring.clone(), &config);
        let mut reader = RingReader::new(ring, &config);

        writer.write_all(b"last words").unwrap();
        writer.close().unwrap();

        assert_eq!(read_to_end(&mut reader), b"last words");
        assert_eq!(reader.read(&mut [0u8; 4]).unwrap(), None);
    }

    /// Test: Writing after the reader closed reports the peer
    #[test]
    fn ring_write_after_reader_close_fails() {
        let ring = RingBuffer::with_capacity(32).unwrap();
        let config = fast_config();
        let mut writer = RingWriter::new(ring.clone(), &config);
        let mut reader = RingReader::new(ring, &config);

        reader.close().unwrap();
        reader.close().unwrap();
        assert_eq!(reader.state(), ChannelState::Closed);

        let err = writer.write(b"x").unwrap_err();
        assert!(matches!(err, PipeError::PeerClosed { .. }));
        assert!(err.is_closed());
    }

    /// Test: Chunk stream written in pieces arrives intact and in order
    #[test]
    fn chunk_stream_survives_uneven_writes() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config().with_max_chunk_size(100);
        let dir = temp_dir.path().join("stream");
        let mut writer = ChunkFileWriter::open(&dir, &config).unwrap();
        let mut reader = ChunkFileReader::open(&dir, &config).unwrap();
        let payload = pattern(2_500);

        let expected = payload.clone();
        let producer = thread::spawn(move || {
            for piece in payload.chunks(333) {
                writer.write_all(piece).unwrap();
            }
            writer.close().unwrap();
        });

        let received = read_to_end(&mut reader);
        producer.join().unwrap();
        assert_eq!(received, expected);
    }

    /// Test: Oversized writes are split at the chunk limit
    #[test]
    fn chunk_write_respects_max_chunk_size() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config().with_max_chunk_size(4);
        let mut writer = ChunkFileWriter::open(temp_dir.path(), &config).unwrap();

        assert_eq!(writer.write(b"abcdefgh").unwrap(), 4);
        writer.write_all(b"efgh").unwrap();

        assert_eq!(writer.layout().list_chunks().unwrap(), vec![0, 1]);
        assert_eq!(fs::read(writer.layout().chunk_path(1)).unwrap(), b"efgh");
    }

    /// Test: A reader that starts late recovers every chunk in order
    #[test]
    fn chunk_late_reader_recovers_history() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config();
        let mut writer = ChunkFileWriter::open(temp_dir.path(), &config).unwrap();

        for i in 0..10u8 {
            writer.write_all(&[i; 3]).unwrap();
        }
        writer.close().unwrap();
        assert_eq!(writer.layout().list_chunks().unwrap(), (0..10).collect::<Vec<_>>());

        let mut reader = ChunkFileReader::open(temp_dir.path(), &config).unwrap();
        let expected: Vec<u8> = (0..10u8).flat_map(|i| [i; 3]).collect();
        assert_eq!(read_to_end(&mut reader), expected);
        assert_eq!(reader.next_seq(), 10);
    }

    /// Test: Chunks survive a reader and a new writer appends after them
    #[test]
    fn chunk_writer_resumes_after_existing_chunks() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config();
        {
            let mut writer = ChunkFileWriter::open(temp_dir.path(), &config).unwrap();
            writer.write_all(b"one").unwrap();
            writer.write_all(b"two").unwrap();
        }

        let writer = ChunkFileWriter::open(temp_dir.path(), &config).unwrap();
        assert_eq!(writer.next_seq(), 2);
    }

    /// Test: Close marker decides which endpoint closed second
    #[test]
    fn chunk_close_reports_order() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config();
        let mut writer = ChunkFileWriter::open(temp_dir.path(), &config).unwrap();
        let mut reader = ChunkFileReader::open(temp_dir.path(), &config).unwrap();

        assert!(!writer.close_shared().unwrap());
        assert!(!writer.close_shared().unwrap());
        assert_eq!(reader.state(), ChannelState::ClosedByPeer);
        assert!(reader.close_shared().unwrap());
        assert!(matches!(
            writer.write(b"late"),
            Err(PipeError::ChannelClosed { .. })
        ));
    }

    /// Test: Cleanup removes the directory only after both endpoints closed
    #[test]
    fn chunk_cleanup_after_both_close() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("cleanup");
        let config = fast_config().with_clean_up_on_close(true);
        let mut writer = ChunkFileWriter::open(&dir, &config).unwrap();
        let mut reader = ChunkFileReader::open(&dir, &config).unwrap();

        writer.write_all(b"data").unwrap();
        writer.close().unwrap();
        assert!(dir.exists());
        reader.close().unwrap();
        assert!(!dir.exists());
    }

    /// Test: Cancelling the token unblocks a pending chunk read
    #[test]
    fn chunk_read_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let config = fast_config().with_cancel(cancel.clone());
        let mut reader = ChunkFileReader::open(temp_dir.path(), &config).unwrap();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let start = Instant::now();
        let err = reader.read(&mut [0u8; 8]).unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, PipeError::Interrupted { .. }));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(reader.state(), ChannelState::Open);
    }
}
