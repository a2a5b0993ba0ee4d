//! TCP connect + plaintext HTTP exchange prober

use async_trait::async_trait;
use std::io::{self, ErrorKind};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::trace;

use hostprobe_common::{Attempt, Endpoint, Prober, Stage};

/// Default per-attempt timeout, applied to the connect and then again to the
/// whole HTTP exchange.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const READ_CHUNK: usize = 4096;

/// Plaintext HTTP prober.
///
/// Sends one fixed GET carrying the probed hostname as Host header and reads
/// the response through to end of stream. No TLS handshake is ever performed,
/// port 443 included; the deliberately plaintext attempt toward a TLS port is
/// part of the measurement technique.
pub struct TcpProber {
    timeout: Duration,
}

impl TcpProber {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the HTTP exchange on a freshly connected stream. One deadline
    /// covers the request write and every read, like a socket-level deadline.
    /// The stream is dropped, and therefore closed, on every return path.
    async fn exchange(&self, mut stream: TcpStream, host: &str) -> Attempt {
        let deadline = Instant::now() + self.timeout;
        let request = build_request(host);

        match timeout_at(deadline, stream.write_all(request.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return exchange_attempt(e),
            Err(_) => return Attempt::ExchangeTimeout,
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let mut received = 0usize;
        loop {
            match timeout_at(deadline, stream.read(&mut buf)).await {
                Ok(Ok(0)) => {
                    trace!(host, received, "stream closed");
                    // A clean close without a single response byte is the
                    // anomalous-termination signal; any payload followed by a
                    // clean close is a complete response.
                    return if received == 0 {
                        Attempt::StreamEof
                    } else {
                        Attempt::ResponseComplete
                    };
                }
                Ok(Ok(n)) => {
                    received += n;
                    trace!(host, bytes = n, "response data");
                }
                Ok(Err(e)) => return exchange_attempt(e),
                Err(_) => return Attempt::ExchangeTimeout,
            }
        }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, endpoint: Endpoint, host: &str) -> Attempt {
        let stream = match timeout(self.timeout, TcpStream::connect(endpoint.addr())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return connect_attempt(e),
            Err(_) => return Attempt::ConnectTimeout,
        };
        self.exchange(stream, host).await
    }
}

fn build_request(host: &str) -> String {
    format!("GET / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

/// Fold a connect-stage error into its attempt variant.
fn connect_attempt(err: io::Error) -> Attempt {
    if is_fd_exhaustion(&err) {
        return Attempt::OutOfFiles {
            stage: Stage::Tcp,
            source: err,
        };
    }
    match err.kind() {
        ErrorKind::ConnectionRefused => Attempt::ConnectRefused,
        ErrorKind::TimedOut => Attempt::ConnectTimeout,
        ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => Attempt::Unreachable,
        _ => Attempt::ConnectFailed(err),
    }
}

/// Fold an exchange-stage error into its attempt variant.
fn exchange_attempt(err: io::Error) -> Attempt {
    if is_fd_exhaustion(&err) {
        return Attempt::OutOfFiles {
            stage: Stage::Http,
            source: err,
        };
    }
    match err.kind() {
        ErrorKind::ConnectionReset => Attempt::Reset,
        ErrorKind::TimedOut | ErrorKind::WouldBlock => Attempt::ExchangeTimeout,
        ErrorKind::UnexpectedEof => Attempt::StreamEof,
        _ => Attempt::ExchangeFailed(err),
    }
}

fn is_fd_exhaustion(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE)
    )
}
