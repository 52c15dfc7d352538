use async_trait::async_trait;
use eyre::{Result, WrapErr};
use regex::Regex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;

use crate::types::HostResult;

/// Extra time granted on top of the probe timeout before the probe is
/// abandoned. Covers process start-up and scheduling.
const PROBE_GRACE: Duration = Duration::from_millis(500);

/// Ports tried by [`TcpChecker`]; commonly open or actively refused.
const TCP_PING_PORTS: [u16; 6] = [80, 443, 22, 445, 135, 3389];

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("valid ping time pattern")
});

static TTL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ttl=([0-9]+)").expect("valid ping ttl pattern"));

/// Decides whether an address answers and how fast.
///
/// Implementations return the measured round-trip time, or an error with a
/// reason when the host did not answer. The error is only logged.
#[async_trait]
pub trait HostReachabilityChecker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, addr: Ipv4Addr, timeout: Duration) -> Result<Duration>;
}

/// Probes a single address. Never fails: every failure becomes an
/// unreachable record.
pub async fn probe_host(
    checker: &dyn HostReachabilityChecker,
    addr: Ipv4Addr,
    probe_timeout: Duration,
) -> HostResult {
    log::trace!("[scan::ping] probe_host: addr={} checker={} timeout={}ms",
        addr, checker.name(), probe_timeout.as_millis());

    match timeout(probe_timeout + PROBE_GRACE, checker.check(addr, probe_timeout)).await {
        Ok(Ok(latency)) => {
            log::debug!("[scan::ping] host_up: addr={} latency={}ms", addr, latency.as_millis());
            HostResult::reachable(addr, latency)
        }
        Ok(Err(e)) => {
            log::debug!("[scan::ping] host_down: addr={} reason={}", addr, e);
            HostResult::unreachable(addr)
        }
        Err(_) => {
            log::debug!("[scan::ping] host_probe_abandoned: addr={} timeout={}ms",
                addr, (probe_timeout + PROBE_GRACE).as_millis());
            HostResult::unreachable(addr)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingReply {
    pub latency: Duration,
    pub ttl: Option<u8>,
}

/// Runs the operating system's `ping` utility once per address.
#[derive(Debug, Clone, Default)]
pub struct PingChecker;

impl PingChecker {
    pub fn new() -> Self {
        Self
    }

    fn ping_args(addr: Ipv4Addr, wait: Duration) -> Vec<String> {
        let wait_ms = wait.as_millis().max(1);
        if cfg!(target_os = "windows") {
            vec!["-n".into(), "1".into(), "-w".into(), wait_ms.to_string(), addr.to_string()]
        } else if cfg!(target_os = "macos") {
            vec!["-c".into(), "1".into(), "-W".into(), wait_ms.to_string(), addr.to_string()]
        } else {
            // Linux iputils takes whole seconds.
            let wait_secs = wait_ms.div_ceil(1000);
            vec!["-c".into(), "1".into(), "-W".into(), wait_secs.to_string(), addr.to_string()]
        }
    }

    async fn do_ping(&self, addr: Ipv4Addr, wait: Duration) -> Result<Duration> {
        let args = Self::ping_args(addr, wait);
        log::trace!("[scan::ping] do_ping: addr={} args={:?}", addr, args);

        let ping_start = Instant::now();
        let output = Command::new("ping")
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .wrap_err("Failed to execute ping command")?;
        let command_duration = ping_start.elapsed();

        if !output.status.success() {
            eyre::bail!("ping exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let latency = reply_latency(&stdout, command_duration)?;
        log::trace!("[scan::ping] ping_output_parsed: addr={} latency={}ms", addr, latency.as_millis());
        Ok(latency)
    }
}

/// Latency of the echo reply in `output`.
///
/// A reply line carrying a TTL but no timing falls back to `command_duration`.
/// Output without any reply line is an error even when `ping` exited 0, which
/// Windows does for "Destination host unreachable".
fn reply_latency(output: &str, command_duration: Duration) -> Result<Duration> {
    match parse_ping_output(output) {
        Ok(reply) => Ok(reply.latency),
        Err(_) if output.lines().any(|line| TTL_RE.is_match(line)) => {
            log::debug!("[scan::ping] no_timing_in_reply: fallback={}ms", command_duration.as_millis());
            Ok(command_duration)
        }
        Err(e) => Err(e.wrap_err("ping printed no echo reply")),
    }
}

#[async_trait]
impl HostReachabilityChecker for PingChecker {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn check(&self, addr: Ipv4Addr, timeout: Duration) -> Result<Duration> {
        self.do_ping(addr, timeout).await
    }
}

/// Extracts the round-trip time and TTL from the first reply line.
///
/// Understands `time=15.2 ms` (Linux, macOS), `time=15ms` and `time<1ms`
/// (Windows).
pub fn parse_ping_output(output: &str) -> Result<PingReply> {
    for line in output.lines() {
        let Some(caps) = TIME_RE.captures(line) else {
            continue;
        };

        let latency_ms: f64 = caps[1]
            .parse()
            .wrap_err_with(|| format!("invalid latency '{}'", &caps[1]))?;
        let ttl = TTL_RE
            .captures(line)
            .and_then(|c| c[1].parse::<u8>().ok());

        return Ok(PingReply {
            latency: Duration::from_millis(latency_ms.round() as u64),
            ttl,
        });
    }

    eyre::bail!("Could not find timing information in ping output");
}

/// Treats an address as alive when any common port either accepts or
/// actively refuses a TCP connection. Needs neither privileges nor a
/// `ping` binary.
#[derive(Debug, Clone)]
pub struct TcpChecker {
    ports: Vec<u16>,
}

impl Default for TcpChecker {
    fn default() -> Self {
        Self {
            ports: TCP_PING_PORTS.to_vec(),
        }
    }
}

impl TcpChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(ports: Vec<u16>) -> Self {
        Self { ports }
    }
}

#[async_trait]
impl HostReachabilityChecker for TcpChecker {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn check(&self, addr: Ipv4Addr, probe_timeout: Duration) -> Result<Duration> {
        let per_port = (probe_timeout / self.ports.len().max(1) as u32).max(Duration::from_millis(10));

        for &port in &self.ports {
            let started = Instant::now();
            match timeout(per_port, TcpStream::connect(SocketAddr::from((addr, port)))).await {
                Ok(Ok(_)) => return Ok(started.elapsed()),
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::ConnectionRefused => {
                    return Ok(started.elapsed());
                }
                Ok(Err(e)) => {
                    log::trace!("[scan::ping] tcp_ping_error: addr={} port={} error={}", addr, port, e);
                }
                Err(_) => {
                    log::trace!("[scan::ping] tcp_ping_timeout: addr={} port={}", addr, port);
                }
            }
        }

        eyre::bail!("no TCP response on {} ports", self.ports.len());
    }
}
