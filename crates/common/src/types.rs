//! Core data types for the hostprobe engine.
//!
//! Everything that crosses a crate boundary lives here: the endpoint and
//! record types carried through channels, the structured attempt outcome the
//! prober produces, and the classification the worker acts on.
//!
//! Fields are `pub` for direct access in the worker loop; builder-style
//! helpers consume `self` to avoid extra clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Probe stage at which an outcome was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// The TCP handshake itself.
    Tcp,
    /// The HTTP exchange after a successful handshake.
    Http,
}

impl Stage {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Tcp => "TCP",
            Stage::Http => "HTTP",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic outcome codes recorded in output rows.
///
/// The spellings of `as_str` are the record contract shared with the
/// downstream analysis tooling and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Code {
    Timeout,
    Refused,
    Unreachable,
    Rst,
    Eof,
    Success,
    TooManyFiles,
    Unexpected,
}

impl Code {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Code::Timeout => "Timeout",
            Code::Refused => "Refused",
            Code::Unreachable => "UNREACHABLE",
            Code::Rst => "RST",
            Code::Eof => "EOF",
            Code::Success => "Success",
            Code::TooManyFiles => "TOOMANYFILES",
            Code::Unexpected => "Unexpected",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single destination endpoint (IP + port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
}

impl Endpoint {
    #[inline]
    #[must_use]
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Socket address handed to the connect call.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SocketAddr formatting brackets IPv6 addresses for us
        self.addr().fmt(f)
    }
}

/// Raw outcome of one connect-and-exchange attempt against a single endpoint.
///
/// One variant per socket condition the classifier distinguishes. Variants
/// are built from `io::ErrorKind` and errno values, never from error-message
/// wording. The unclassified variants keep the underlying error for triage.
#[derive(Debug)]
pub enum Attempt {
    /// The TCP connect did not complete within the attempt timeout.
    ConnectTimeout,
    /// The endpoint actively refused the connection.
    ConnectRefused,
    /// The network or host is unreachable from this vantage point.
    Unreachable,
    /// Any other connect-stage failure.
    ConnectFailed(io::Error),
    /// Nothing further arrived within the attempt deadline after the handshake.
    ExchangeTimeout,
    /// The peer reset the connection during the HTTP exchange.
    Reset,
    /// The stream ended before a single response byte arrived.
    StreamEof,
    /// The response was read through to a clean end of stream.
    ResponseComplete,
    /// Any other exchange-stage failure.
    ExchangeFailed(io::Error),
    /// The process hit its open-file-descriptor ceiling.
    OutOfFiles { stage: Stage, source: io::Error },
}

/// What the pool should do with an endpoint once an attempt finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reinsert {
    /// Hand the endpoint straight back to the pool.
    Now,
    /// Withhold the endpoint until the cooldown elapses.
    After(Duration),
    /// Permanently retire the endpoint.
    Retire,
}

/// Classifier verdict for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub stage: Stage,
    pub code: Code,
    /// Conclusive outcomes end the job's retry loop and become records.
    pub conclusive: bool,
    pub reinsert: Reinsert,
    /// Fatal outcomes abort the whole process.
    pub fatal: bool,
}

/// Per-worker run state, mutated only by controller broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    Stopped,
    Paused,
    Running,
}

/// One conclusive measurement, serialized as a single output row.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    /// Wall-clock time of the first connect attempt for this job.
    pub start_time: DateTime<Utc>,
    /// The Host header value under test.
    pub host: String,
    pub stage: Stage,
    pub code: Code,
    /// Endpoint the conclusive attempt actually used.
    pub endpoint: Endpoint,
    /// Elapsed from the first connect attempt to the conclusive classification.
    pub duration: Duration,
}
