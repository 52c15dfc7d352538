use std::net::IpAddr;
use std::time::Duration;

use crate::services::{self, PortCategory};
use crate::types::{HostReport, HostResult, PortResult};

const SEPARATOR_WIDTH: usize = 80;
const MAX_BANNER_DISPLAY: usize = 60;
const SECONDS_PER_MINUTE: u64 = 60;

pub fn print_separator() {
    println!("{}", "─".repeat(SEPARATOR_WIDTH));
}

pub fn print_header(target: &str) {
    println!("🎯 Scanning: {}", target);
    print_separator();
}

pub fn print_hosts(hosts: &[HostResult], elapsed: Duration) {
    let mut up: Vec<&HostResult> = hosts.iter().filter(|h| h.is_reachable).collect();
    up.sort_by_key(|h| h.ip());

    for host in &up {
        println!("{}", format_host(host));
    }

    print_separator();
    println!("{}/{} hosts up ({})", up.len(), hosts.len(), format_duration(elapsed));
}

pub fn print_ports(addr: IpAddr, ports: &[PortResult], elapsed: Duration) {
    let open: Vec<&PortResult> = ports.iter().filter(|p| p.is_open).collect();

    println!("📡 {}", addr);
    if open.is_empty() {
        println!("  No open ports found");
    }
    for port in &open {
        println!("{}", format_port(port));
    }

    print_separator();
    println!("{} open of {} scanned ({})", open.len(), ports.len(), format_duration(elapsed));
}

pub fn print_reports(reports: &[HostReport], scanned_hosts: usize, elapsed: Duration) {
    for report in reports {
        println!("{}", format_host(&report.host));
        let open: Vec<&PortResult> = report.open_ports().collect();
        if open.is_empty() {
            println!("  No open ports found");
        }
        for port in open {
            println!("{}", format_port(port));
        }
        println!();
    }

    print_separator();
    let open_total: usize = reports.iter().map(|r| r.open_ports().count()).sum();
    println!("{}/{} hosts up, {} open ports ({})",
        reports.len(), scanned_hosts, open_total, format_duration(elapsed));
}

fn format_host(host: &HostResult) -> String {
    let latency = host
        .latency_ms
        .map(|ms| format!("{}ms", ms))
        .unwrap_or_else(|| "?".to_string());

    match &host.hostname {
        Some(name) => format!("✅ {} ({}) {}", host.address, name, latency),
        None => format!("✅ {} {}", host.address, latency),
    }
}

fn format_port(port: &PortResult) -> String {
    let service = port.service_name.as_deref().unwrap_or("unknown");
    let mut line = format!("  {:>5}/tcp  {:<14}", port.port, service);

    if let Some(version) = &port.version {
        line.push_str(&format!(" {}", version));
    }

    let category = services::category(port.port);
    if category != PortCategory::WellKnown {
        line.push_str(&format!(" [{}]", category.as_str()));
    }
    if services::is_risky_port(port.port) {
        line.push_str(" ⚠️ risky");
    }

    if let Some(banner) = &port.banner {
        let first_line = banner.lines().next().unwrap_or_default();
        line.push_str(&format!("\n         └─ {}", truncate(first_line, MAX_BANNER_DISPLAY)));
    }

    line
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if total_secs < SECONDS_PER_MINUTE {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}m{}s", total_secs / SECONDS_PER_MINUTE, total_secs % SECONDS_PER_MINUTE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn open_port(port: u16, service: &str) -> PortResult {
        PortResult {
            port,
            is_open: true,
            service_name: Some(service.to_string()),
            banner: None,
            latency_ms: Some(3),
            version: None,
        }
    }

    #[test]
    fn test_format_port_flags_risky_ports() {
        let line = format_port(&open_port(23, "telnet"));
        assert!(line.contains("23/tcp"));
        assert!(line.contains("telnet"));
        assert!(line.contains("risky"));

        let line = format_port(&open_port(443, "https"));
        assert!(!line.contains("risky"));
        assert!(!line.contains('['));
    }

    #[test]
    fn test_format_port_shows_category_version_and_banner() {
        let mut port = open_port(8080, "http-proxy");
        port.version = Some("1.25.3".to_string());
        port.banner = Some("HTTP/1.1 200 OK\r\nServer: nginx/1.25.3".to_string());

        let line = format_port(&port);
        assert!(line.contains("1.25.3"));
        assert!(line.contains("[registered]"));
        assert!(line.contains("└─ HTTP/1.1 200 OK"));
        assert!(!line.contains("Server:"));
    }

    #[test]
    fn test_format_host() {
        let mut host = HostResult::reachable(Ipv4Addr::new(192, 168, 1, 5), Duration::from_millis(7));
        assert_eq!(format_host(&host), "✅ 192.168.1.5 7ms");

        host.hostname = Some("printer.lan".to_string());
        assert_eq!(format_host(&host), "✅ 192.168.1.5 (printer.lan) 7ms");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 4), "abcd…");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m5s");
    }
}
