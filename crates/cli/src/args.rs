use clap::Parser;
use std::path::PathBuf;

/// Test whether Host values are censored by sending plaintext HTTP requests
/// toward a fixed pool of destination endpoints. With no FILE, or when FILE
/// is -, hostnames are read from standard input.
#[derive(Parser, Debug)]
#[command(name = "hostprobe")]
#[command(version)]
#[command(about = "Active Host-header censorship prober", long_about = None)]
pub struct Opts {
    /// Comma-separated destination IP addresses to which requests are sent.
    /// Example: 1.1.1.1,2.2.2.2
    #[arg(long = "dip", default_value = "127.0.0.1")]
    pub dest_ips: String,

    /// Comma-separated destination ports. Example: 80,8080
    #[arg(short = 'p', long = "ports", default_value = "80")]
    pub dest_ports: String,

    /// Number of workers running in parallel
    #[arg(long, default_value_t = 20_000)]
    pub workers: usize,

    /// Per-attempt timeout in milliseconds, applied to the connect and again
    /// to the HTTP exchange
    #[arg(long, default_value_t = 3_000)]
    pub timeout: u64,

    /// Residual censorship duration in milliseconds; an endpoint that reset
    /// a connection is withheld for this long
    #[arg(long, default_value_t = 180_000)]
    pub residual: u64,

    /// Output CSV file (default stdout)
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Log to file (default stderr)
    #[arg(long)]
    pub log: Option<PathBuf>,

    /// Flush after every output row; pass --flush=false for long runs
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub flush: bool,

    /// Write a CPU flamegraph to this file on exit
    #[arg(long)]
    pub cpuprofile: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Hostname list files, one Host value per line
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
}
