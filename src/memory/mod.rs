//! Mapped memory regions and initialization locking

pub mod config;
pub mod lock;
pub mod regions;

pub use config::{BackingType, RegionConfig};
pub use lock::InitLock;
pub use regions::SharedMemoryRegion;
