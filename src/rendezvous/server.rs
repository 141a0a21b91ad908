//! Accepting side of the rendezvous protocol

use std::{
    fs,
    io::ErrorKind,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    channel::chunk::remove_tree,
    config::{PipeConfig, DEFAULT_RESPONSE_TTL},
    error::{PipeError, Result},
    pipe::{AnyPipe, Pipe, PipeKind, Role},
    sync::Poller,
};

use super::{
    protocol::ConnectDir,
    request::{ConnectionRequest, Response},
    token::Token,
};

/// Configuration of a [`PipeServer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Directory clients submit requests to
    pub connect_dir: PathBuf,
    /// Directory holding one subdirectory per accepted pipe
    pub pipe_dir: PathBuf,
    /// Implementations offered, most preferred first
    pub supported: Vec<PipeKind>,
    /// Settings for allocated pipes and the accept poll loop
    pub pipe: PipeConfig,
    /// Responses left uncollected this long are removed
    pub response_ttl: Duration,
}

impl ServerConfig {
    /// Configuration offering every implementation with default pipe settings
    pub fn new(connect_dir: impl Into<PathBuf>, pipe_dir: impl Into<PathBuf>) -> Self {
        Self {
            connect_dir: connect_dir.into(),
            pipe_dir: pipe_dir.into(),
            supported: PipeKind::ALL.to_vec(),
            pipe: PipeConfig::default(),
            response_ttl: DEFAULT_RESPONSE_TTL,
        }
    }

    /// Restrict and order the offered implementations
    pub fn with_supported(mut self, supported: &[PipeKind]) -> Self {
        self.supported = supported.to_vec();
        self
    }

    /// Set the pipe settings
    pub fn with_pipe_config(mut self, pipe: PipeConfig) -> Self {
        self.pipe = pipe;
        self
    }

    /// Set how long an uncollected response survives
    pub fn with_response_ttl(mut self, ttl: Duration) -> Self {
        self.response_ttl = ttl;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.response_ttl.is_zero() {
            return Err(PipeError::invalid_parameter(
                "response_ttl",
                "Response time-to-live must be greater than 0",
            ));
        }

        if self.supported.is_empty() {
            return Err(PipeError::invalid_parameter(
                "supported",
                "Server must support at least one pipe type",
            ));
        }

        if self.connect_dir == self.pipe_dir {
            return Err(PipeError::invalid_parameter(
                "pipe_dir",
                "Pipe directory must differ from the connect directory",
            ));
        }

        self.pipe.validate()
    }
}

/// Server end of an accepted rendezvous
///
/// Dereferences to the allocated pipe, which the server side holds as
/// [`Role::Host`].
#[derive(Debug)]
pub struct Connection {
    token: Token,
    request: ConnectionRequest,
    pipe: AnyPipe,
}

impl Connection {
    /// Token correlating this connection's request and response
    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Request the client submitted
    pub fn request(&self) -> &ConnectionRequest {
        &self.request
    }

    /// Give up the wrapper and keep the pipe
    pub fn into_pipe(self) -> AnyPipe {
        self.pipe
    }
}

impl Deref for Connection {
    type Target = AnyPipe;

    fn deref(&self) -> &AnyPipe {
        &self.pipe
    }
}

impl DerefMut for Connection {
    fn deref_mut(&mut self) -> &mut AnyPipe {
        &mut self.pipe
    }
}

/// Accepts connection requests from a connect directory
#[derive(Debug)]
pub struct PipeServer {
    config: ServerConfig,
    connect: ConnectDir,
    pipe_root: PathBuf,
    last_sweep: Option<Instant>,
}

impl PipeServer {
    /// Create a server, creating both directories if needed
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let connect = ConnectDir::open(&config.connect_dir)?;
        fs::create_dir_all(&config.pipe_dir)
            .map_err(|e| PipeError::from_io(e, "Failed to create pipe directory"))?;
        // Responses carry absolute paths so clients need only the connect directory.
        let pipe_root = fs::canonicalize(&config.pipe_dir)
            .map_err(|e| PipeError::from_io(e, "Failed to resolve pipe directory"))?;

        debug!(
            "Pipe server on {} offering {:?}",
            connect.path().display(),
            config.supported
        );

        Ok(Self {
            config,
            connect,
            pipe_root,
            last_sweep: None,
        })
    }

    /// Server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Wait up to `timeout` (zero waits forever) for a request and serve it
    ///
    /// Requests that cannot be served are answered with a rejection and
    /// skipped; only resource failures abort the call.
    pub fn accept(&mut self, timeout: Duration) -> Result<Connection> {
        let poller = Poller::new(self.config.pipe.poll_interval)
            .with_timeout(timeout)
            .with_cancel(self.config.pipe.cancel.clone());

        poller.wait_for("waiting for connection request", || self.try_accept())
    }

    /// Endless iterator of accepted connections
    pub fn incoming(&mut self) -> Incoming<'_> {
        Incoming { server: self }
    }

    /// One pass over pending requests, oldest first
    fn try_accept(&mut self) -> Result<Option<Connection>> {
        self.sweep_stale_responses();

        for token in self.connect.pending_requests()? {
            if !self.connect.claim(&token)? {
                continue;
            }
            debug!("Claimed request {}", token);

            let outcome = self
                .connect
                .read_claimed(&token)
                .and_then(|request| self.establish(&token, request));

            match outcome {
                Ok(connection) => return Ok(Some(connection)),
                Err(e) => {
                    self.reject(&token, &e);
                    if is_request_error(&e) {
                        continue;
                    }
                    return Err(e);
                }
            }
        }
        Ok(None)
    }

    fn establish(&self, token: &Token, request: ConnectionRequest) -> Result<Connection> {
        let kind = request.negotiate(&self.config.supported)?;
        let pipe_dir = self.allocate_pipe_dir(token)?;

        let pipe = match kind.open(&pipe_dir, Role::Host, &self.config.pipe) {
            Ok(pipe) => pipe,
            Err(e) => {
                remove_tree(&pipe_dir);
                return Err(e);
            }
        };
        let response = Response::Accepted {
            pipe_dir: pipe_dir.clone(),
            kind,
        };
        if let Err(e) = self.connect.respond(token, &response) {
            drop(pipe);
            remove_tree(&pipe_dir);
            return Err(e);
        }
        self.connect.finish(token);

        info!(
            "Accepted connection {} as {} at {}",
            token,
            pipe.kind(),
            pipe_dir.display()
        );

        Ok(Connection {
            token: token.clone(),
            request,
            pipe,
        })
    }

    /// Discard responses whose client gave up, at most once per time-to-live
    fn sweep_stale_responses(&mut self) {
        let ttl = self.config.response_ttl;
        if self.last_sweep.is_some_and(|at| at.elapsed() < ttl) {
            return;
        }
        self.last_sweep = Some(Instant::now());

        match self.connect.remove_stale_responses(ttl) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} uncollected responses", removed),
            Err(e) => warn!("Failed to sweep {}: {}", self.connect.path().display(), e),
        }
    }

    /// Create a fresh subdirectory for one pipe
    fn allocate_pipe_dir(&self, token: &Token) -> Result<PathBuf> {
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                token.to_string()
            } else {
                format!("{}-{}", token, attempt)
            };
            let dir = self.pipe_root.join(name);

            match fs::create_dir(&dir) {
                Ok(()) => return Ok(dir),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(PipeError::from_io(e, "Failed to allocate pipe directory")),
            }
        }
    }

    /// Answer a request that will not be served, best effort
    fn reject(&self, token: &Token, error: &PipeError) {
        warn!("Rejecting request {}: {}", token, error);
        let response = Response::Rejected {
            reason: error.to_string(),
        };
        if let Err(e) = self.connect.respond(token, &response) {
            warn!("Failed to publish rejection for {}: {}", token, e);
        }
        self.connect.finish(token);
    }

    /// Root of the allocated pipe directories
    pub fn pipe_root(&self) -> &Path {
        &self.pipe_root
    }
}

/// Whether a failure is the request's fault rather than the server's
fn is_request_error(error: &PipeError) -> bool {
    matches!(
        error,
        PipeError::NoCompatiblePipe { .. }
            | PipeError::UnsupportedPipeType { .. }
            | PipeError::Protocol { .. }
            | PipeError::Serialization { .. }
    )
}

/// Iterator returned by [`PipeServer::incoming`]
#[derive(Debug)]
pub struct Incoming<'a> {
    server: &'a mut PipeServer,
}

impl Iterator for Incoming<'_> {
    type Item = Result<Connection>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.server.accept(Duration::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig::new("/tmp/connect", "/tmp/pipes");
        assert!(config.validate().is_ok());
        assert_eq!(config.supported, PipeKind::ALL.to_vec());

        assert!(config.clone().with_supported(&[]).validate().is_err());
        assert!(ServerConfig::new("/tmp/same", "/tmp/same").validate().is_err());
        assert!(config.with_response_ttl(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_accept_times_out_without_requests() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::new(temp_dir.path().join("connect"), temp_dir.path().join("pipes"))
            .with_pipe_config(PipeConfig::new().with_poll_interval(Duration::from_millis(5)));
        let mut server = PipeServer::new(config).unwrap();

        let err = server.accept(Duration::from_millis(30)).unwrap_err();
        assert!(err.is_timeout());
        assert!(server.pipe_root().is_absolute());
    }

    #[test]
    fn test_allocate_pipe_dir_avoids_collisions() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig::new(temp_dir.path().join("connect"), temp_dir.path().join("pipes"));
        let server = PipeServer::new(config).unwrap();
        let token = Token::generate();

        let first = server.allocate_pipe_dir(&token).unwrap();
        let second = server.allocate_pipe_dir(&token).unwrap();
        assert_ne!(first, second);
        assert!(first.is_dir() && second.is_dir());
    }
}
