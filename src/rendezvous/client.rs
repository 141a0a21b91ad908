//! Connecting side of the rendezvous protocol

use std::{path::PathBuf, time::Duration};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    config::PipeConfig,
    error::{PipeError, Result},
    pipe::{AnyPipe, PipeKind, Role},
    sync::Poller,
};

use super::{
    protocol::ConnectDir,
    request::{ConnectionRequest, Response},
    token::Token,
};

/// Configuration of a [`PipeClient`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Directory the server watches
    pub connect_dir: PathBuf,
    /// Settings for opened pipes and the connect poll loop
    pub pipe: PipeConfig,
}

impl ClientConfig {
    /// Configuration with default pipe settings
    pub fn new(connect_dir: impl Into<PathBuf>) -> Self {
        Self {
            connect_dir: connect_dir.into(),
            pipe: PipeConfig::default(),
        }
    }

    /// Set the pipe settings
    pub fn with_pipe_config(mut self, pipe: PipeConfig) -> Self {
        self.pipe = pipe;
        self
    }
}

/// Submits connection requests and opens the pipes servers allocate
#[derive(Debug, Clone)]
pub struct PipeClient {
    config: ClientConfig,
    connect: ConnectDir,
}

impl PipeClient {
    /// Create a client on the configured connect directory
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.pipe.validate()?;
        let connect = ConnectDir::open(&config.connect_dir)?;
        Ok(Self { config, connect })
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Request a pipe and wait up to `timeout` (zero waits forever) for it
    ///
    /// On timeout or cancellation the request is withdrawn before the error
    /// is returned. The returned pipe holds [`Role::Guest`].
    pub fn connect(&self, request: ConnectionRequest, timeout: Duration) -> Result<AnyPipe> {
        let request = request.or_any_type();
        let token = Token::generate();
        self.connect.submit(&token, &request)?;
        debug!("Submitted request {} to {}", token, self.connect.path().display());

        let poller = Poller::new(self.config.pipe.poll_interval)
            .with_timeout(timeout)
            .with_cancel(self.config.pipe.cancel.clone());

        let response = match poller.wait_for("waiting for connection response", || {
            self.connect.take_response(&token)
        }) {
            Ok(response) => response,
            Err(e) => {
                self.abandon(&token);
                return Err(e);
            }
        };

        match response {
            Response::Accepted { pipe_dir, kind } => {
                debug!("Request {} accepted: {} at {}", token, kind, pipe_dir.display());
                kind.open(&pipe_dir, Role::Guest, &self.config.pipe)
            }
            Response::Rejected { reason } => Err(PipeError::rejected(reason)),
        }
    }

    /// Request a pipe of one of `kinds`
    pub fn connect_with_types(&self, kinds: &[PipeKind], timeout: Duration) -> Result<AnyPipe> {
        self.connect(ConnectionRequest::connect().with_accept_types(kinds), timeout)
    }

    fn abandon(&self, token: &Token) {
        match self.connect.withdraw(token) {
            Ok(true) => debug!("Withdrew request {}", token),
            Ok(false) => warn!("Request {} was claimed but never answered", token),
            Err(e) => warn!("Failed to withdraw request {}: {}", token, e),
        }
    }
}
