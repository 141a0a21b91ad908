//! On-disk entries of the connect directory
//!
//! ```text
//! <token>.req       request submitted by a client
//! <token>.claimed   request taken by a server (renamed from .req)
//! <token>.resp      server's response, consumed and removed by the client
//! .<token>.*.tmp    staging names, never read by the other side
//! ```
//!
//! Entries are written to a staging name and renamed into place, so the
//! reader of an entry never sees it half written. Requests and responses
//! live in separate namespaces tied together only by the token.
//!
//! A client that gives up after its request was claimed never consumes the
//! response; servers sweep such responses once they are older than their
//! configured time-to-live.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{PipeError, Result};

use super::{
    request::{ConnectionRequest, Response},
    token::Token,
};

const REQUEST_EXT: &str = "req";
const CLAIMED_EXT: &str = "claimed";
const RESPONSE_EXT: &str = "resp";

/// Handle on a connect directory
#[derive(Debug, Clone)]
pub struct ConnectDir {
    dir: PathBuf,
}

impl ConnectDir {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| PipeError::from_io(e, "Failed to create connect directory"))?;
        Ok(Self { dir })
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, token: &Token, ext: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", token, ext))
    }

    fn staging_path(&self, token: &Token, ext: &str) -> PathBuf {
        self.dir.join(format!(".{}.{}.tmp", token, ext))
    }

    /// Path of a submitted request
    pub fn request_path(&self, token: &Token) -> PathBuf {
        self.entry_path(token, REQUEST_EXT)
    }

    /// Path of a request after a server claimed it
    pub fn claimed_path(&self, token: &Token) -> PathBuf {
        self.entry_path(token, CLAIMED_EXT)
    }

    /// Path of a response
    pub fn response_path(&self, token: &Token) -> PathBuf {
        self.entry_path(token, RESPONSE_EXT)
    }

    fn publish<T: Serialize>(&self, token: &Token, ext: &str, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        let staging = self.staging_path(token, ext);
        fs::write(&staging, bytes)
            .map_err(|e| PipeError::from_io(e, "Failed to write rendezvous entry"))?;
        fs::rename(&staging, self.entry_path(token, ext))
            .map_err(|e| PipeError::from_io(e, "Failed to publish rendezvous entry"))
    }

    fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipeError::from_io(e, "Failed to read rendezvous entry")),
        }
    }

    /// Submit a request
    pub fn submit(&self, token: &Token, request: &ConnectionRequest) -> Result<()> {
        self.publish(token, REQUEST_EXT, request)
    }

    /// Tokens of unclaimed requests, oldest first
    pub fn pending_requests(&self) -> Result<Vec<Token>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| PipeError::from_io(e, "Failed to list connect directory"))?;

        let mut pending: Vec<(SystemTime, Token)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PipeError::from_io(e, "Failed to list connect directory"))?;
            let name = entry.file_name();
            let Some(token) = name
                .to_str()
                .and_then(|n| n.strip_suffix(REQUEST_EXT))
                .and_then(|n| n.strip_suffix('.'))
                .and_then(Token::parse)
            else {
                continue;
            };

            // The entry may vanish between listing and stat.
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PipeError::from_io(e, "Failed to stat request entry")),
            };
            pending.push((modified, token));
        }

        pending.sort();
        Ok(pending.into_iter().map(|(_, token)| token).collect())
    }

    /// Claim a request by renaming it; `Ok(false)` if someone else got it first
    pub fn claim(&self, token: &Token) -> Result<bool> {
        match fs::rename(self.request_path(token), self.claimed_path(token)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipeError::from_io(e, "Failed to claim request")),
        }
    }

    /// Read a claimed request
    pub fn read_claimed(&self, token: &Token) -> Result<ConnectionRequest> {
        Self::read_entry(&self.claimed_path(token))?
            .ok_or_else(|| PipeError::protocol(format!("Claimed request {} disappeared", token)))
    }

    /// Publish a response for `token`
    pub fn respond(&self, token: &Token, response: &Response) -> Result<()> {
        self.publish(token, RESPONSE_EXT, response)
    }

    /// Consume the response for `token`, if published
    pub fn take_response(&self, token: &Token) -> Result<Option<Response>> {
        let path = self.response_path(token);
        let response = Self::read_entry(&path)?;
        if response.is_some() {
            remove_entry(&path);
        }
        Ok(response)
    }

    /// Drop a claimed request once it has been answered
    pub fn finish(&self, token: &Token) {
        remove_entry(&self.claimed_path(token));
    }

    /// Withdraw a request; `true` if it was still unclaimed
    pub fn withdraw(&self, token: &Token) -> Result<bool> {
        match fs::remove_file(self.request_path(token)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Already claimed: a response may be published, or may still come.
                remove_entry(&self.response_path(token));
                Ok(false)
            }
            Err(e) => Err(PipeError::from_io(e, "Failed to withdraw request")),
        }
    }

    /// Remove responses older than `max_age`; returns how many went
    pub fn remove_stale_responses(&self, max_age: Duration) -> Result<usize> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| PipeError::from_io(e, "Failed to list connect directory"))?;
        let now = SystemTime::now();

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| PipeError::from_io(e, "Failed to list connect directory"))?;
            let path = entry.path();
            // Staging names end in .tmp and never match.
            if path.extension().and_then(|ext| ext.to_str()) != Some(RESPONSE_EXT) {
                continue;
            }

            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(PipeError::from_io(e, "Failed to stat response entry")),
            };
            // A timestamp in the future counts as fresh.
            let age = now.duration_since(modified).unwrap_or_default();
            if age >= max_age {
                debug!("Removing uncollected response {}", path.display());
                remove_entry(&path);
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn remove_entry(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::PipeKind;
    use tempfile::TempDir;

    #[test]
    fn test_request_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let connect = ConnectDir::open(temp_dir.path()).unwrap();
        let token = Token::generate();
        let request = ConnectionRequest::connect().with_accept_types(&[PipeKind::ChunkFile]);

        connect.submit(&token, &request).unwrap();
        assert_eq!(connect.pending_requests().unwrap(), vec![token.clone()]);

        assert!(connect.claim(&token).unwrap());
        assert!(!connect.claim(&token).unwrap());
        assert!(connect.pending_requests().unwrap().is_empty());
        assert_eq!(connect.read_claimed(&token).unwrap(), request);

        let response = Response::Rejected {
            reason: "busy".to_string(),
        };
        connect.respond(&token, &response).unwrap();
        connect.finish(&token);

        assert_eq!(connect.take_response(&token).unwrap(), Some(response));
        assert_eq!(connect.take_response(&token).unwrap(), None);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_withdraw_unclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let connect = ConnectDir::open(temp_dir.path()).unwrap();
        let token = Token::generate();

        connect.submit(&token, &ConnectionRequest::connect()).unwrap();
        assert!(connect.withdraw(&token).unwrap());
        assert!(!connect.withdraw(&token).unwrap());
        assert!(!connect.claim(&token).unwrap());
    }

    #[test]
    fn test_foreign_files_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let connect = ConnectDir::open(temp_dir.path()).unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"hi").unwrap();
        fs::write(temp_dir.path().join(".abc.req.tmp"), b"partial").unwrap();

        assert!(connect.pending_requests().unwrap().is_empty());
    }

    #[test]
    fn test_remove_stale_responses() {
        let temp_dir = TempDir::new().unwrap();
        let connect = ConnectDir::open(temp_dir.path()).unwrap();
        let answered = Token::generate();
        let pending = Token::generate();

        connect.submit(&pending, &ConnectionRequest::connect()).unwrap();
        let response = Response::Rejected {
            reason: "gone".to_string(),
        };
        connect.respond(&answered, &response).unwrap();

        assert_eq!(connect.remove_stale_responses(Duration::from_secs(3600)).unwrap(), 0);
        assert!(connect.response_path(&answered).exists());

        assert_eq!(connect.remove_stale_responses(Duration::ZERO).unwrap(), 1);
        assert!(!connect.response_path(&answered).exists());
        assert_eq!(connect.pending_requests().unwrap(), vec![pending]);
    }
}
