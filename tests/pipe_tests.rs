//! Pipe integration tests
//! Host and guest endpoints of both pipe implementations, including cleanup

use std::{fs, thread, time::Duration};

use fspipe::{
    channel::ChunkLayout,
    config::DEFAULT_CHUNK_BASE,
    pipe::{
        chunk::{FIRST_DIR, SECOND_DIR},
        shm::BACKING_FILE,
    },
    ChannelState, Pipe, PipeConfig, PipeKind, ReadableChannel, Role, SharedMemoryPipe,
};
use tempfile::TempDir;

fn fast_config() -> PipeConfig {
    PipeConfig::new().with_poll_interval(Duration::from_millis(2))
}

fn read_line(source: &mut dyn ReadableChannel) -> String {
    let mut line = Vec::new();
    while let Some(byte) = source.read_byte().unwrap() {
        line.push(byte);
        if byte == b'\n' {
            break;
        }
    }
    String::from_utf8(line).unwrap()
}

/// Run a question/answer exchange between a host and a guest thread
fn exchange(kind: PipeKind, dir: &std::path::Path, config: &PipeConfig) {
    let host_dir = dir.to_path_buf();
    let host_config = config.clone();
    let host = thread::spawn(move || {
        let mut pipe = kind.open(&host_dir, Role::Host, &host_config).unwrap();
        assert_eq!(read_line(pipe.source()), "How are you?\n");
        pipe.sink().write_all(b"Fine, thanks.\n").unwrap();
        assert_eq!(pipe.source().read(&mut [0u8; 8]).unwrap(), None);
        pipe.close().unwrap();
    });

    let mut pipe = kind.open(dir, Role::Guest, config).unwrap();
    assert_eq!(pipe.role(), Role::Guest);
    assert_eq!(pipe.kind(), kind);
    pipe.sink().write_all(b"How are you?\n").unwrap();
    assert_eq!(read_line(pipe.source()), "Fine, thanks.\n");
    pipe.close().unwrap();
    assert!(pipe.is_closed());

    host.join().unwrap();
}

#[cfg(test)]
mod pipe_tests {
    use super::*;

    /// Test: Shared-memory exchange with cleanup deletes the backing file
    #[test]
    fn shm_exchange_with_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config().with_clean_up_on_close(true);

        exchange(PipeKind::SharedMemory, temp_dir.path(), &config);
        assert!(!temp_dir.path().join(BACKING_FILE).exists());
    }

    /// Test: Shared-memory exchange without cleanup keeps the backing file
    #[test]
    fn shm_exchange_keeps_file_without_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config();

        exchange(PipeKind::SharedMemory, temp_dir.path(), &config);

        let [first, second] = SharedMemoryPipe::inspect(&temp_dir.path().join(BACKING_FILE)).unwrap();
        assert!(first.initialized && second.initialized);
        assert!(first.closed && second.closed);
        assert!(first.is_empty() && second.is_empty());
    }

    /// Test: Chunk-file exchange with cleanup deletes the pipe directory
    #[test]
    fn chunk_exchange_with_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("pipe");
        let config = fast_config().with_clean_up_on_close(true);

        exchange(PipeKind::ChunkFile, &dir, &config);
        assert!(!dir.exists());
    }

    /// Test: Chunk-file exchange without cleanup leaves both histories on disk
    #[test]
    fn chunk_exchange_keeps_history() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("pipe");
        let config = fast_config();

        exchange(PipeKind::ChunkFile, &dir, &config);

        for sub in [FIRST_DIR, SECOND_DIR] {
            let layout = ChunkLayout::new(dir.join(sub), DEFAULT_CHUNK_BASE);
            assert!(!layout.list_chunks().unwrap().is_empty());
            assert!(layout.is_marked_closed());
        }
    }

    /// Test: Bytes written before the peer opens are delivered once it does
    #[test]
    fn writes_before_peer_opens_are_delivered() {
        for kind in PipeKind::ALL {
            let temp_dir = TempDir::new().unwrap();
            let config = fast_config();

            let mut host = kind.open(temp_dir.path(), Role::Host, &config).unwrap();
            host.sink().write_all(b"early\n").unwrap();

            let mut guest = kind.open(temp_dir.path(), Role::Guest, &config).unwrap();
            assert_eq!(read_line(guest.source()), "early\n", "{}", kind);
        }
    }

    /// Test: Closing one endpoint is visible to the other's channels
    #[test]
    fn peer_close_is_observed() {
        for kind in PipeKind::ALL {
            let temp_dir = TempDir::new().unwrap();
            let config = fast_config();

            let mut host = kind.open(temp_dir.path(), Role::Host, &config).unwrap();
            let mut guest = kind.open(temp_dir.path(), Role::Guest, &config).unwrap();
            host.close().unwrap();
            host.close().unwrap();

            assert_eq!(guest.source().state(), ChannelState::ClosedByPeer, "{}", kind);
            assert_eq!(guest.source().read(&mut [0u8; 4]).unwrap(), None);
            assert!(guest.sink().write(b"late").unwrap_err().is_closed());
        }
    }

    /// Test: Cleanup requested after opening still applies
    #[test]
    fn cleanup_can_be_enabled_after_open() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("pipe");
        let config = fast_config();

        let mut host = PipeKind::ChunkFile.open(&dir, Role::Host, &config).unwrap();
        let mut guest = PipeKind::ChunkFile.open(&dir, Role::Guest, &config).unwrap();
        host.clean_up_on_close();
        guest.clean_up_on_close();

        guest.close().unwrap();
        assert!(dir.exists());
        host.close().unwrap();
        assert!(!dir.exists());
    }

    /// Test: Dropping an endpoint closes it
    #[test]
    fn drop_closes_endpoint() {
        let temp_dir = TempDir::new().unwrap();
        let config = fast_config().with_clean_up_on_close(true);
        let path = temp_dir.path().join(BACKING_FILE);

        let host = SharedMemoryPipe::open(temp_dir.path(), Role::Host, &config).unwrap();
        let guest = SharedMemoryPipe::open(temp_dir.path(), Role::Guest, &config).unwrap();
        drop(host);
        assert!(path.exists());
        drop(guest);
        assert!(!path.exists());
        assert!(fs::read_dir(temp_dir.path()).unwrap().next().is_none());
    }
}
