//! Polling primitives for cross-process synchronization
//!
//! Peers share no OS-level synchronization object, only files. Waiting is
//! therefore bounded-interval polling of shared state:
//! - [`Poller`] retries a check with a fixed sleep, a deadline and cancellation
//! - [`CancelToken`] lets another thread abort a pending wait

pub mod cancel;
pub mod poller;

pub use cancel::CancelToken;
pub use poller::Poller;
