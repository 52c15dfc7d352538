//! Port specifications.
//!
//! `PortSet::parse` accepts a single port (`443`), an inclusive range
//! (`1-1024`), a comma list (`22,80,443`) or a named group (`common`, `web`,
//! `mail`, `db`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScanError;

pub const COMMON_PORTS: [u16; 17] = [
    21, 22, 23, 25, 53, 80, 135, 139, 443, 445, 993, 995, 1723, 3306, 3389, 5900, 8080,
];

const WEB_PORTS: [u16; 7] = [80, 443, 8000, 8008, 8080, 8443, 8888];
const MAIL_PORTS: [u16; 7] = [25, 110, 143, 465, 587, 993, 995];
const DB_PORTS: [u16; 7] = [1433, 1521, 3306, 5432, 6379, 9200, 27017];

/// Sorted, de-duplicated list of TCP ports in `1..=65535`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet(Vec<u16>);

impl PortSet {
    pub fn parse(input: &str) -> Result<Self, ScanError> {
        let text = input.trim().to_ascii_lowercase();
        log::debug!("[ports] parse: input={}", text);

        if let Some(group) = named_group(&text) {
            return Ok(Self::from_ports(group.iter().copied()));
        }

        if text.contains(',') {
            return Self::parse_list(input, &text);
        }

        if let Some((low, high)) = text.split_once('-') {
            return Self::parse_range(input, low, high);
        }

        let port = parse_port(&text).ok_or_else(|| {
            ScanError::invalid(input, "expected a port number between 1 and 65535")
        })?;
        Ok(Self(vec![port]))
    }

    /// The default set substituted for `common`.
    pub fn common() -> Self {
        Self::from_ports(COMMON_PORTS)
    }

    /// Builds a set from arbitrary ports, dropping 0 and duplicates.
    pub fn from_ports<I: IntoIterator<Item = u16>>(ports: I) -> Self {
        let mut ports: Vec<u16> = ports.into_iter().filter(|p| *p != 0).collect();
        ports.sort_unstable();
        ports.dedup();
        Self(ports)
    }

    fn parse_range(input: &str, low: &str, high: &str) -> Result<Self, ScanError> {
        let low = parse_port(low)
            .ok_or_else(|| ScanError::invalid(input, format!("invalid range start '{}'", low.trim())))?;
        let high = parse_port(high)
            .ok_or_else(|| ScanError::invalid(input, format!("invalid range end '{}'", high.trim())))?;

        if low > high {
            return Err(ScanError::invalid(input, format!("range start {low} is after end {high}")));
        }

        Ok(Self((low..=high).collect()))
    }

    fn parse_list(input: &str, text: &str) -> Result<Self, ScanError> {
        let mut dropped = 0usize;
        let ports: Vec<u16> = text
            .split(',')
            .filter_map(|token| {
                let port = parse_port(token);
                if port.is_none() {
                    dropped += 1;
                }
                port
            })
            .collect();

        if dropped > 0 {
            log::debug!("[ports] parse_list: input={} dropped_tokens={}", text, dropped);
        }

        if ports.is_empty() {
            return Err(ScanError::NoValidPorts {
                input: input.trim().to_string(),
            });
        }

        Ok(Self::from_ports(ports))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, port: u16) -> bool {
        self.0.binary_search(&port).is_ok()
    }
}

impl FromStr for PortSet {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl IntoIterator for PortSet {
    type Item = u16;
    type IntoIter = std::vec::IntoIter<u16>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl From<PortSet> for Vec<u16> {
    fn from(set: PortSet) -> Self {
        set.0
    }
}

impl fmt::Display for PortSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 10 {
            let listed: Vec<String> = self.0.iter().map(u16::to_string).collect();
            write!(f, "{}", listed.join(","))
        } else {
            write!(f, "{} ports", self.0.len())
        }
    }
}

fn named_group(name: &str) -> Option<&'static [u16]> {
    match name {
        "common" => Some(&COMMON_PORTS),
        "web" => Some(&WEB_PORTS),
        "mail" => Some(&MAIL_PORTS),
        "db" => Some(&DB_PORTS),
        _ => None,
    }
}

fn parse_port(token: &str) -> Option<u16> {
    let token = token.trim();
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match token.parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Some(port as u16),
        _ => None,
    }
}
