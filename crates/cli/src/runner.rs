// runner.rs
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::info;

use hostprobe_common::{Endpoint, HostprobeError, HostprobeResult};
use hostprobe_engine::{Engine, EngineConfig};
use hostprobe_prober::TcpProber;

use crate::args::Opts;
use crate::input::feed_jobs;
use crate::output::write_results;

const JOB_CHANNEL_CAPACITY: usize = 100;
const RESULT_CHANNEL_CAPACITY: usize = 100;

pub async fn run(opts: Opts) -> Result<()> {
    let ips = parse_ips(&opts.dest_ips)?;
    let ports = parse_ports(&opts.dest_ports)?;

    // Seed set is the full port × IP product, each pair exactly once.
    let mut endpoints = Vec::with_capacity(ips.len() * ports.len());
    for port in &ports {
        for ip in &ips {
            endpoints.push(Endpoint::new(*ip, *port));
        }
    }

    info!(
        ips = ips.len(),
        ports = ports.len(),
        endpoints = endpoints.len(),
        workers = opts.workers,
        timeout_ms = opts.timeout,
        residual_ms = opts.residual,
        "starting probe run"
    );

    // Output must be open before any work starts; failing here is fatal.
    let out: Box<dyn AsyncWrite + Send + Unpin> = match &opts.out {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to open output file {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let profiler = match &opts.cpuprofile {
        Some(_) => Some(
            pprof::ProfilerGuardBuilder::default()
                .frequency(100)
                .build()
                .context("failed to start CPU profiler")?,
        ),
        None => None,
    };

    let (job_tx, job_rx) = mpsc::channel(JOB_CHANNEL_CAPACITY);
    let (result_tx, result_rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);

    let feeder = tokio::spawn(feed_jobs(opts.files.clone(), job_tx));
    let sink = tokio::spawn(write_results(result_rx, out, opts.flush));

    let prober = Arc::new(TcpProber::new().with_timeout(Duration::from_millis(opts.timeout)));
    let config = EngineConfig {
        workers: opts.workers,
        endpoints,
        residual: Duration::from_millis(opts.residual),
    };
    Engine::new(config, prober).run(job_rx, result_tx).await?;

    feeder.await.context("job feeder panicked")??;
    sink.await.context("result sink panicked")??;

    if let (Some(path), Some(guard)) = (&opts.cpuprofile, profiler) {
        let report = guard
            .report()
            .build()
            .context("failed to build CPU profile")?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to open profile file {}", path.display()))?;
        report
            .flamegraph(file)
            .context("failed to write flamegraph")?;
        info!(profile = %path.display(), "CPU flamegraph written");
    }

    Ok(())
}

/// Expand a comma-separated list of literal IP addresses.
fn parse_ips(arg: &str) -> HostprobeResult<Vec<IpAddr>> {
    let mut ips = Vec::new();
    for part in arg.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let ip: IpAddr = part
            .parse()
            .map_err(|_| HostprobeError::InvalidAddress(part.to_string()))?;
        ips.push(ip);
    }

    if ips.is_empty() {
        return Err(HostprobeError::Config(
            "no destination IPs specified".into(),
        ));
    }
    Ok(ips)
}

/// Expand a comma-separated list of ports.
fn parse_ports(arg: &str) -> HostprobeResult<Vec<u16>> {
    let mut ports = Vec::new();
    for part in arg.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let port: u16 = part
            .parse()
            .map_err(|_| HostprobeError::InvalidPort(part.to_string()))?;
        ports.push(port);
    }

    if ports.is_empty() {
        return Err(HostprobeError::Config(
            "no destination ports specified".into(),
        ));
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_parse_ips_single() {
        let ips = parse_ips("8.8.8.8").unwrap();
        assert_eq!(ips, vec![IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))]);
    }

    #[test]
    fn test_parse_ips_multiple() {
        let ips = parse_ips("8.8.8.8,1.1.1.1").unwrap();
        assert_eq!(ips.len(), 2);
        assert!(ips.contains(&IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1))));
    }

    #[test]
    fn test_parse_ips_whitespace() {
        let ips = parse_ips(" 8.8.8.8 , 1.1.1.1 ").unwrap();
        assert_eq!(ips.len(), 2);
    }

    #[test]
    fn test_parse_ips_v6() {
        let ips = parse_ips("2001:db8::1").unwrap();
        assert_eq!(ips, vec!["2001:db8::1".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_parse_ips_invalid() {
        assert!(parse_ips("not-an-ip").is_err());
        assert!(parse_ips("8.8.8").is_err());
        assert!(parse_ips("").is_err());
        assert!(parse_ips(",,,").is_err());
    }

    #[test]
    fn test_parse_ports_single() {
        let ports = parse_ports("80").unwrap();
        assert_eq!(ports, vec![80]);
    }

    #[test]
    fn test_parse_ports_multiple() {
        let ports = parse_ports("80,8080,443").unwrap();
        assert_eq!(ports, vec![80, 8080, 443]);
    }

    #[test]
    fn test_parse_ports_whitespace() {
        let ports = parse_ports(" 80 , 443 ").unwrap();
        assert_eq!(ports, vec![80, 443]);
    }

    #[test]
    fn test_parse_ports_invalid() {
        assert!(parse_ports("abc").is_err());
        assert!(parse_ports("70000").is_err());
        assert!(parse_ports("").is_err());
    }
}
