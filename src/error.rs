//! Error types and handling for fspipe

use std::time::Duration;

/// Result type alias for fspipe operations
pub type Result<T> = std::result::Result<T, PipeError>;

/// Error kinds surfaced by channels, pipes and the rendezvous protocol
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    /// I/O related errors (file operations, mmap, directory listing)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Operation on a channel or pipe that was closed locally
    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: String },

    /// Write attempted after the peer closed its end of the direction
    #[error("Channel closed by peer: {channel}")]
    PeerClosed { channel: String },

    /// A rendezvous operation exceeded its deadline
    #[error("Timed out after {timeout:?}: {operation}")]
    Timeout { operation: String, timeout: Duration },

    /// A poll loop observed cancellation
    #[error("Interrupted while {operation}")]
    Interrupted { operation: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Pipe implementation name not known to this build
    #[error("Unsupported pipe type: {name}")]
    UnsupportedPipeType { name: String },

    /// No overlap between the client's accept-types and the server's supported set
    #[error("No compatible pipe type among: {offered}")]
    NoCompatiblePipe { offered: String },

    /// The server refused the connection request
    #[error("Connection rejected: {reason}")]
    Rejected { reason: String },

    /// Malformed or unexpected rendezvous entry
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl PipeError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a closed-locally error
    pub fn channel_closed(channel: impl Into<String>) -> Self {
        Self::ChannelClosed {
            channel: channel.into(),
        }
    }

    /// Create a closed-by-peer error
    pub fn peer_closed(channel: impl Into<String>) -> Self {
        Self::PeerClosed {
            channel: channel.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create an interrupted error
    pub fn interrupted(operation: impl Into<String>) -> Self {
        Self::Interrupted {
            operation: operation.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported pipe type error
    pub fn unsupported_pipe_type(name: impl Into<String>) -> Self {
        Self::UnsupportedPipeType { name: name.into() }
    }

    /// Create a no-compatible-pipe error
    pub fn no_compatible_pipe(offered: impl Into<String>) -> Self {
        Self::NoCompatiblePipe {
            offered: offered.into(),
        }
    }

    /// Create a rejection error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// Whether this error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this error reports a closed channel, locally or by the peer
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ChannelClosed { .. } | Self::PeerClosed { .. })
    }
}

// Convert from common error types
impl From<std::io::Error> for PipeError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for PipeError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}

impl From<nix::errno::Errno> for PipeError {
    fn from(err: nix::errno::Errno) -> Self {
        Self::platform(err.desc())
    }
}

impl From<PipeError> for std::io::Error {
    fn from(err: PipeError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            PipeError::Io { source: Some(source), .. } => source.kind(),
            PipeError::Io { .. } | PipeError::Platform { .. } => ErrorKind::Other,
            PipeError::ChannelClosed { .. } => ErrorKind::NotConnected,
            PipeError::PeerClosed { .. } => ErrorKind::BrokenPipe,
            PipeError::Timeout { .. } => ErrorKind::TimedOut,
            PipeError::Interrupted { .. } => ErrorKind::Interrupted,
            PipeError::InvalidParameter { .. } => ErrorKind::InvalidInput,
            PipeError::UnsupportedPipeType { .. }
            | PipeError::NoCompatiblePipe { .. }
            | PipeError::Rejected { .. } => ErrorKind::ConnectionRefused,
            PipeError::Protocol { .. } | PipeError::Serialization { .. } => ErrorKind::InvalidData,
        };
        std::io::Error::new(kind, err)
    }
}
