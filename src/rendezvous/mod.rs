//! Filesystem rendezvous between a pipe server and its clients
//!
//! A client drops a request entry into the connect directory and polls for a
//! response carrying the same token. The server polls for requests, claims
//! the oldest, allocates a fresh subdirectory of the pipe directory, opens
//! the negotiated pipe there as [`Role::Host`](crate::pipe::Role::Host) and
//! publishes the response. The client then opens the same pipe as
//! [`Role::Guest`](crate::pipe::Role::Guest).
//!
//! A server that dies between allocating a pipe and responding leaves an
//! orphaned pipe directory; the client still fails at its own timeout.

pub mod client;
pub mod protocol;
pub mod request;
pub mod server;
pub mod token;

pub use client::{ClientConfig, PipeClient};
pub use protocol::ConnectDir;
pub use request::{Command, ConnectionRequest, Response};
pub use server::{Connection, Incoming, PipeServer, ServerConfig};
pub use token::Token;
