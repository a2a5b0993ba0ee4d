//! Hostprobe Common - shared types and traits
//!
//! This crate provides the data model, the outcome classifier, and the
//! prober trait seam used across the hostprobe workspace.

pub mod classify;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use classify::{classify, CONNECT_RETRY_COOLDOWN};
pub use error::{HostprobeError, HostprobeResult};
pub use traits::Prober;
pub use types::{
    Attempt, Classification, Code, Endpoint, Reinsert, ResultRecord, Stage, WorkerState,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
