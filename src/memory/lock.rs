//! Advisory file lock deciding who initializes a shared region

use std::fs::File;

use log::debug;
use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

use crate::error::{PipeError, Result};

/// Exclusive `flock` held while a process initializes shared state
///
/// The lock is released on drop. It only arbitrates initialization; it is
/// never held for the lifetime of a pipe.
#[derive(Debug)]
pub struct InitLock {
    _guard: Flock<File>,
}

impl InitLock {
    /// Try to take the exclusive lock without blocking
    ///
    /// Returns `Ok(None)` when another process currently holds it.
    pub fn try_acquire(file: &File) -> Result<Option<Self>> {
        let handle = file
            .try_clone()
            .map_err(|e| PipeError::from_io(e, "Failed to duplicate backing file handle"))?;

        match Flock::lock(handle, FlockArg::LockExclusiveNonblock) {
            Ok(guard) => {
                debug!("Acquired initialization lock");
                Ok(Some(Self { _guard: guard }))
            }
            Err((_, Errno::EWOULDBLOCK)) => {
                debug!("Initialization lock held by peer");
                Ok(None)
            }
            Err((_, errno)) => Err(errno.into()),
        }
    }
}
