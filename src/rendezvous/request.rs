//! Connection requests, responses and pipe-type negotiation

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    config::{ACCEPT_TYPES, ANY_PIPE_TYPE},
    error::{PipeError, Result},
    pipe::PipeKind,
};

/// Request command tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Connect,
}

impl Command {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect => "connect",
        }
    }
}

/// What a client asks the server for
///
/// Parameters keep their insertion order. Built once by the client and
/// never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    command: Command,
    parameters: Vec<(String, String)>,
}

impl ConnectionRequest {
    /// A `connect` request without parameters
    pub fn connect() -> Self {
        Self {
            command: Command::Connect,
            parameters: Vec::new(),
        }
    }

    /// A `connect` request carrying the given parameters, in order
    pub fn from_parameters<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        parameters
            .into_iter()
            .fold(Self::connect(), |request, (name, value)| request.with_parameter(name, value))
    }

    /// Set a parameter, replacing an earlier value of the same name
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name, value)),
        }
        self
    }

    /// Restrict the pipe implementations the server may choose
    pub fn with_accept_types(self, kinds: &[PipeKind]) -> Self {
        let names: Vec<&str> = kinds.iter().map(PipeKind::name).collect();
        self.with_parameter(ACCEPT_TYPES, names.join(","))
    }

    /// Fill in the wildcard accept-types filter if none was given
    pub fn or_any_type(self) -> Self {
        if self.parameter(ACCEPT_TYPES).is_some() {
            self
        } else {
            self.with_parameter(ACCEPT_TYPES, ANY_PIPE_TYPE)
        }
    }

    /// Command tag
    pub fn command(&self) -> Command {
        self.command
    }

    /// Value of a parameter
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// All parameters in insertion order
    pub fn parameters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parameters
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Pick the first of `supported` (server preference order) the request accepts
    ///
    /// A missing filter or one containing `*` accepts anything. Names this
    /// build doesn't know are ignored.
    pub fn negotiate(&self, supported: &[PipeKind]) -> Result<PipeKind> {
        let filter = self.parameter(ACCEPT_TYPES).unwrap_or(ANY_PIPE_TYPE);
        let accepted: Vec<&str> = filter
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();

        supported
            .iter()
            .copied()
            .find(|kind| accepted.iter().any(|name| *name == ANY_PIPE_TYPE || *name == kind.name()))
            .ok_or_else(|| PipeError::no_compatible_pipe(filter))
    }
}

/// Server's answer to one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// A pipe was allocated at `pipe_dir`
    Accepted { pipe_dir: PathBuf, kind: PipeKind },
    /// The request could not be served
    Rejected { reason: String },
}
