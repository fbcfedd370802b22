// Command line configuration

use clap::{Parser, ValueEnum};
use jdwp_wire::eventloop::MAX_PACKET_SIZE;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Sit between a debugger and a JVM and log every JDWP conversation.
///
/// Point the debugger at `--listen` instead of the VM; the spy connects to
/// `--target` and relays both directions byte for byte.
#[derive(Debug, Clone, Parser)]
#[command(name = "jdwp-spy", version, about)]
pub struct SpyConfig {
    /// Address the debugger connects to
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub listen: SocketAddr,

    /// JDWP address of the debuggee VM (host:port)
    #[arg(long, default_value = "localhost:5005")]
    pub target: Target,

    /// Output format for recorded conversations
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Include hex dumps of packet payloads
    #[arg(long)]
    pub payload: bool,

    /// Connect timeout towards the VM, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Largest frame either side may send
    #[arg(long, default_value_t = MAX_PACKET_SIZE)]
    pub max_packet_size: usize,

    /// Serve a single debugger session, then exit
    #[arg(long)]
    pub once: bool,
}

impl SpyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human readable line per record
    Text,
    /// One JSON object per line
    Json,
}

/// `host:port` of the VM. Unlike `SocketAddr` the host may be a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("expected host:port, got '{}'", s))?;

        // [::1]:5005
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(format!("missing host in '{}'", s));
        }

        let port = port
            .parse()
            .map_err(|e| format!("bad port in '{}': {}", s, e))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
