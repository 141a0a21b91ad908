//! Default configuration constants and per-pipe settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{PipeError, Result},
    ringbuf::layout::MIN_RING_REGION,
    sync::{CancelToken, Poller},
};

/// Default sleep between checks of shared state
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default size of a shared-memory pipe backing file (both directions)
pub const DEFAULT_SHM_SIZE: usize = 4096;

/// Default base name of chunk files (`<base>_<n>`)
pub const DEFAULT_CHUNK_BASE: &str = "chunk";

/// Default upper bound on bytes per chunk file
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 64 * 1024;

/// Reserved zero-length file signalling that one endpoint closed
pub const CLOSE_MARKER: &str = "closed.marker";

/// Request parameter naming the pipe types a client accepts
pub const ACCEPT_TYPES: &str = "accept-types";

/// Accept-types value meaning any supported pipe type
pub const ANY_PIPE_TYPE: &str = "*";

/// Age after which a server discards a response no client collected
pub const DEFAULT_RESPONSE_TTL: Duration = Duration::from_secs(60);

/// Settings shared by every pipe implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipeConfig {
    /// Sleep between checks while waiting for data, space or initialization
    pub poll_interval: Duration,
    /// Total size of a shared-memory backing file
    pub shm_size: usize,
    /// Base name of chunk files
    pub chunk_base_name: String,
    /// Maximum payload per chunk file
    pub max_chunk_size: usize,
    /// Delete backing resources once both endpoints have closed
    pub clean_up_on_close: bool,
    /// Cancellation observed by every blocking wait
    #[serde(skip)]
    pub cancel: Option<CancelToken>,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            shm_size: DEFAULT_SHM_SIZE,
            chunk_base_name: DEFAULT_CHUNK_BASE.to_string(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            clean_up_on_close: false,
            cancel: None,
        }
    }
}

impl PipeConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the shared-memory backing file size
    pub fn with_shm_size(mut self, size: usize) -> Self {
        self.shm_size = size;
        self
    }

    /// Set the chunk file base name
    pub fn with_chunk_base_name(mut self, base: impl Into<String>) -> Self {
        self.chunk_base_name = base.into();
        self
    }

    /// Set the maximum chunk payload
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    /// Request cleanup of backing resources on close
    pub fn with_clean_up_on_close(mut self, clean_up: bool) -> Self {
        self.clean_up_on_close = clean_up;
        self
    }

    /// Observe the given cancellation token in every wait
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Unbounded poller for channel waits
    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_interval).with_cancel(self.cancel.clone())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(PipeError::invalid_parameter(
                "poll_interval",
                "Poll interval must be greater than 0",
            ));
        }

        if self.shm_size < 2 * MIN_RING_REGION {
            return Err(PipeError::invalid_parameter(
                "shm_size",
                format!("Shared memory size must be at least {} bytes", 2 * MIN_RING_REGION),
            ));
        }

        if self.chunk_base_name.is_empty()
            || self.chunk_base_name.starts_with('.')
            || self.chunk_base_name.contains('/')
        {
            return Err(PipeError::invalid_parameter(
                "chunk_base_name",
                "Chunk base name must be a plain, non-hidden file name",
            ));
        }

        if self.max_chunk_size == 0 {
            return Err(PipeError::invalid_parameter(
                "max_chunk_size",
                "Chunk size must be greater than 0",
            ));
        }

        Ok(())
    }
}
