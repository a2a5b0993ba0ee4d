//! Hostprobe Engine - concurrent probing under pause/run/stop supervision

mod burst;
mod controller;
mod engine;
mod pool;
mod worker;

pub use burst::BurstMonitor;
pub use controller::{Controller, ControllerHandle};
pub use engine::{Engine, EngineConfig, DEFAULT_RESIDUAL, DEFAULT_WORKERS};
pub use pool::AddressPool;
