//! Target address ranges.
//!
//! A target is written as a single IPv4 address (`192.168.1.5`), a CIDR block
//! (`192.168.1.0/24`) or an inclusive dash range (`10.0.0.1-10.0.0.20`).
//! CIDR blocks never include their network and broadcast addresses.

use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::types::check_hosts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    Single,
    Cidr,
    Range,
}

/// A contiguous block of IPv4 addresses to scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInterval {
    start: Ipv4Addr,
    end: Ipv4Addr,
    total_hosts: u64,
    kind: TargetKind,
}

impl AddressInterval {
    pub fn parse(input: &str) -> Result<Self, ScanError> {
        let text = input.trim();
        log::debug!("[target] parse: input={}", text);

        if text.is_empty() {
            return Err(ScanError::invalid(input, "empty target"));
        }

        if let Some((ip_str, prefix_str)) = text.split_once('/') {
            return Self::parse_cidr(text, ip_str, prefix_str);
        }

        if let Some((start_str, end_str)) = text.split_once('-') {
            return Self::parse_range(text, start_str, end_str);
        }

        let addr = parse_quad(text, text)?;
        Ok(Self::single(addr))
    }

    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            start: addr,
            end: addr,
            total_hosts: 1,
            kind: TargetKind::Single,
        }
    }

    fn parse_cidr(input: &str, ip_str: &str, prefix_str: &str) -> Result<Self, ScanError> {
        let addr = parse_quad(input, ip_str)?;
        let prefix_str = prefix_str.trim();
        if prefix_str.is_empty() || !prefix_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ScanError::invalid(input, format!("invalid prefix '{prefix_str}'")));
        }
        let prefix = prefix_str
            .parse::<u8>()
            .map_err(|e| ScanError::invalid(input, format!("invalid prefix '{prefix_str}': {e}")))?;

        let block = Ipv4Network::new(addr, prefix)
            .map_err(|e| ScanError::invalid(input, format!("invalid prefix /{prefix}: {e}")))?;

        let network = u32::from(block.network());
        let broadcast = u32::from(block.broadcast());
        let total_hosts = u64::from(broadcast - network).saturating_sub(1);

        log::trace!("[target] cidr: network={} broadcast={} usable={}",
            block.network(), block.broadcast(), total_hosts);

        Ok(Self {
            start: Ipv4Addr::from(network.saturating_add(1)),
            end: Ipv4Addr::from(broadcast.saturating_sub(1)),
            total_hosts,
            kind: TargetKind::Cidr,
        })
    }

    fn parse_range(input: &str, start_str: &str, end_str: &str) -> Result<Self, ScanError> {
        let start = parse_quad(input, start_str)?;
        let end = parse_quad(input, end_str)?;

        if u32::from(start) > u32::from(end) {
            return Err(ScanError::invalid(input, format!("range start {start} is after end {end}")));
        }

        Ok(Self {
            start,
            end,
            total_hosts: u64::from(u32::from(end) - u32::from(start)) + 1,
            kind: TargetKind::Range,
        })
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Number of addresses [`enumerate`](Self::enumerate) will produce.
    pub fn total_hosts(&self) -> u64 {
        self.total_hosts
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.total_hosts == 0
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        !self.is_empty() && (u32::from(self.start)..=u32::from(self.end)).contains(&u32::from(addr))
    }

    /// Every address of the interval in ascending order.
    pub fn enumerate(&self) -> Vec<Ipv4Addr> {
        if self.is_empty() {
            return Vec::new();
        }
        (u32::from(self.start)..=u32::from(self.end))
            .map(Ipv4Addr::from)
            .collect()
    }

    pub fn enumerate_strings(&self) -> Vec<String> {
        self.enumerate().iter().map(Ipv4Addr::to_string).collect()
    }
}

impl FromStr for AddressInterval {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Single => write!(f, "{}", self.start),
            _ => write!(f, "{}-{} ({} hosts)", self.start, self.end, self.total_hosts),
        }
    }
}

/// Expands several targets, each possibly comma separated,
/// into one address list. Duplicates keep their first position.
pub fn collect_addresses<S: AsRef<str>>(targets: &[S]) -> Result<Vec<Ipv4Addr>, ScanError> {
    collect_addresses_within(targets, usize::MAX)
}

/// Like [`collect_addresses`], but fails once the de-duplicated list holds
/// more than `max_hosts` addresses. A single interval larger than the ceiling
/// is refused before it is enumerated.
pub fn collect_addresses_within<S: AsRef<str>>(
    targets: &[S],
    max_hosts: usize,
) -> Result<Vec<Ipv4Addr>, ScanError> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();

    for target in targets {
        for part in target.as_ref().split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let interval = AddressInterval::parse(part)?;
            check_hosts(interval.total_hosts(), max_hosts)?;

            addresses.extend(interval.enumerate().into_iter().filter(|a| seen.insert(*a)));
            check_hosts(addresses.len() as u64, max_hosts)?;
        }
    }

    Ok(addresses)
}

fn parse_quad(input: &str, quad: &str) -> Result<Ipv4Addr, ScanError> {
    quad.trim()
        .parse::<Ipv4Addr>()
        .map_err(|e| ScanError::invalid(input, format!("'{}' is not an IPv4 address: {e}", quad.trim())))
}
