use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::ports::PortSet;

pub const MAX_HOSTS: usize = 1000;
pub const MAX_PORTS: usize = 1000;

/// Liveness of one address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostResult {
    pub address: String,
    pub is_reachable: bool,
    pub latency_ms: Option<u64>,
    pub observed_at: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
}

impl HostResult {
    pub fn reachable(address: Ipv4Addr, latency: Duration) -> Self {
        Self {
            address: address.to_string(),
            is_reachable: true,
            latency_ms: Some(latency.as_millis() as u64),
            observed_at: Some(Utc::now()),
            hostname: None,
        }
    }

    pub fn unreachable(address: Ipv4Addr) -> Self {
        Self {
            address: address.to_string(),
            is_reachable: false,
            latency_ms: None,
            observed_at: None,
            hostname: None,
        }
    }

    pub fn ip(&self) -> Option<Ipv4Addr> {
        self.address.parse().ok()
    }
}

impl fmt::Display for HostResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// State of one TCP port on one host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResult {
    pub port: u16,
    pub is_open: bool,
    pub service_name: Option<String>,
    /// At most [`crate::scan::port::BANNER_LIMIT`] bytes.
    pub banner: Option<String>,
    pub latency_ms: Option<u64>,
    pub version: Option<String>,
}

/// Reported after every completed probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub percentage: u8,
    pub completed: usize,
    pub total: usize,
    pub item: String,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}% ({}/{}) {}", self.percentage, self.completed, self.total, self.item)
    }
}

pub type ProgressFn<'a> = &'a (dyn Fn(Progress) + Send + Sync);

/// A reachable host together with its scanned ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostReport {
    pub host: HostResult,
    pub ports: Vec<PortResult>,
}

impl HostReport {
    pub fn open_ports(&self) -> impl Iterator<Item = &PortResult> {
        self.ports.iter().filter(|p| p.is_open)
    }
}

/// One scan invocation: what to scan and how hard to push.
///
/// This is where the host and port ceilings are enforced; the parsers and the
/// engine only report counts.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub addresses: Vec<Ipv4Addr>,
    pub ports: PortSet,
    pub timeout: Duration,
    pub concurrency: usize,
    pub banner_grab: bool,
}

impl ScanJob {
    pub fn new(
        addresses: Vec<Ipv4Addr>,
        ports: PortSet,
        timeout: Duration,
        concurrency: usize,
    ) -> Result<Self, ScanError> {
        Self::with_limits(addresses, ports, timeout, concurrency, MAX_HOSTS, MAX_PORTS)
    }

    pub fn with_limits(
        addresses: Vec<Ipv4Addr>,
        ports: PortSet,
        timeout: Duration,
        concurrency: usize,
        max_hosts: usize,
        max_ports: usize,
    ) -> Result<Self, ScanError> {
        check_hosts(addresses.len() as u64, max_hosts)?;
        check_ports(ports.len(), max_ports)?;

        Ok(Self {
            addresses,
            ports,
            timeout,
            concurrency: concurrency.max(1),
            banner_grab: true,
        })
    }

    pub fn without_banners(mut self) -> Self {
        self.banner_grab = false;
        self
    }
}

pub fn check_hosts(count: u64, limit: usize) -> Result<(), ScanError> {
    if count > limit as u64 {
        return Err(ScanError::CardinalityExceeded {
            what: "hosts",
            count,
            limit,
        });
    }
    Ok(())
}

pub fn check_ports(count: usize, limit: usize) -> Result<(), ScanError> {
    if count > limit {
        return Err(ScanError::CardinalityExceeded {
            what: "ports",
            count: count as u64,
            limit,
        });
    }
    Ok(())
}
