//! Hostprobe Prober - plaintext HTTP probing over fresh TCP connections

mod probe;

pub use probe::{TcpProber, DEFAULT_TIMEOUT};
