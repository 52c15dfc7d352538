use clap::{Parser, Subcommand};
use eyre::Result;
use std::path::PathBuf;

use crate::config::{EngineConfig, PingMethod};
use crate::logging::default_log_file_path;

#[derive(Parser, Debug)]
#[command(name = "netsweep")]
#[command(about = "Concurrent IPv4 host discovery, TCP port scanning and service detection")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Per-probe timeout in milliseconds
    #[arg(short, long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum probes in flight at once
    #[arg(short, long, global = true)]
    pub concurrency: Option<usize>,

    /// Skip the banner grab on open ports
    #[arg(long, global = true)]
    pub no_banners: bool,

    /// Reverse-resolve host names of reachable hosts
    #[arg(long, global = true)]
    pub resolve: bool,

    /// Decide liveness with TCP connects instead of the system ping
    #[arg(long, global = true)]
    pub tcp_ping: bool,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Append logs to a file instead of stderr; without a value the
    /// platform log directory is used
    #[arg(long, global = true)]
    pub log_file: Option<Option<PathBuf>>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find reachable hosts
    Discover {
        /// Address, CIDR block or range; comma-separated for several
        target: String,
    },
    /// Scan TCP ports on one host
    Ports {
        /// IPv4 address of the host
        host: String,

        /// Ports: "common", "web", "mail", "db", "1-1024" or "22,80,443"
        #[arg(short, long)]
        ports: Option<String>,
    },
    /// Discover hosts, then scan ports on every reachable one
    Sweep {
        /// Address, CIDR block or range; comma-separated for several
        target: String,

        /// Ports: "common", "web", "mail", "db", "1-1024" or "22,80,443"
        #[arg(short, long)]
        ports: Option<String>,
    },
}

impl Cli {
    /// Where logs go: `None` for stderr.
    pub fn log_path(&self) -> Result<Option<PathBuf>> {
        match &self.log_file {
            Some(Some(path)) => Ok(Some(path.clone())),
            Some(None) => Ok(Some(default_log_file_path()?)),
            None => Ok(None),
        }
    }

    /// Overrides `config` with whatever was given on the command line.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(timeout) = self.timeout {
            config.timeout_ms = timeout;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if self.no_banners {
            config.banner_grab = false;
        }
        if self.resolve {
            config.resolve_hostnames = true;
        }
        if self.tcp_ping {
            config.ping_method = PingMethod::Tcp;
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
