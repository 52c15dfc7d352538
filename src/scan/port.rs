use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};

use crate::services;
use crate::types::PortResult;

/// Upper bound on banner bytes kept per port.
pub const BANNER_LIMIT: usize = 1024;

const MIN_BANNER_WINDOW: Duration = Duration::from_millis(100);
const HTTP_PROBE: &[u8] = b"GET / HTTP/1.0\r\n\r\n";
const LINE_PROBE: &[u8] = b"\r\n";

/// What to send after connecting when grabbing a banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerProbe {
    /// The service greets first; send nothing.
    Passive,
    /// Send an HTTP request.
    Http,
    /// Listen briefly, then nudge with a bare CRLF.
    Line,
}

pub fn banner_probe(port: u16) -> BannerProbe {
    match port {
        // Greeting-first services and TLS ports, where plaintext would only
        // get the connection reset.
        21 | 22 | 25 | 110 | 143 | 220 | 587 | 3306 | 5900 => BannerProbe::Passive,
        443 | 465 | 636 | 993 | 995 | 8443 => BannerProbe::Passive,
        80 | 8000 | 8008 | 8080 | 8888 => BannerProbe::Http,
        _ => BannerProbe::Line,
    }
}

/// Read window for banners: two thirds of the connect timeout.
pub fn banner_window(connect_timeout: Duration) -> Duration {
    (connect_timeout * 2 / 3).max(MIN_BANNER_WINDOW)
}

/// Connects once to `addr:port` and reports whether the port accepted.
///
/// Never fails: refusals, resets, unreachable networks and timeouts all come
/// back as a closed port. The connection is closed as soon as it is made.
pub async fn probe_port(addr: IpAddr, port: u16, probe_timeout: Duration) -> PortResult {
    let socket_addr = SocketAddr::new(addr, port);
    let service_name = services::lookup(port).map(str::to_string);
    let start_time = Instant::now();

    let (is_open, latency_ms) = match timeout(probe_timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => {
            let response_time = start_time.elapsed();
            drop(stream);
            log::trace!("[scan::port] port_open: addr={} latency={}ms", socket_addr, response_time.as_millis());
            (true, Some(response_time.as_millis() as u64))
        }
        Ok(Err(e)) => {
            log::trace!("[scan::port] port_closed: addr={} error={}", socket_addr, e);
            (false, None)
        }
        Err(_) => {
            log::trace!("[scan::port] port_timed_out: addr={} timeout={}ms", socket_addr, probe_timeout.as_millis());
            (false, None)
        }
    };

    PortResult {
        port,
        is_open,
        service_name,
        banner: None,
        latency_ms,
        version: None,
    }
}

/// Reads whatever the service on `addr:port` volunteers, up to
/// [`BANNER_LIMIT`] bytes.
///
/// Partial data is kept when the peer resets or the read window closes.
/// Returns `None` when nothing printable arrived.
pub async fn grab_banner(addr: IpAddr, port: u16, connect_timeout: Duration) -> Option<String> {
    let socket_addr = SocketAddr::new(addr, port);

    let mut stream = match timeout(connect_timeout, TcpStream::connect(socket_addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            log::debug!("[scan::port] banner_connect_failed: addr={} error={}", socket_addr, e);
            return None;
        }
        Err(_) => {
            log::debug!("[scan::port] banner_connect_timed_out: addr={}", socket_addr);
            return None;
        }
    };

    let window = banner_window(connect_timeout);
    let deadline = Instant::now() + window;
    let probe = banner_probe(port);
    let mut collected = Vec::with_capacity(BANNER_LIMIT);

    match probe {
        BannerProbe::Passive => {
            read_banner(&mut stream, &mut collected, deadline).await;
        }
        BannerProbe::Http => {
            if send_probe(&mut stream, HTTP_PROBE, socket_addr).await {
                read_banner(&mut stream, &mut collected, deadline).await;
            }
        }
        BannerProbe::Line => {
            // Some services greet first; give them half the window.
            let listen_until = Instant::now() + window / 2;
            read_banner(&mut stream, &mut collected, listen_until).await;
            if collected.is_empty() && send_probe(&mut stream, LINE_PROBE, socket_addr).await {
                read_banner(&mut stream, &mut collected, deadline).await;
            }
        }
    }

    log::debug!("[scan::port] grab_banner: addr={} probe={:?} bytes={}", socket_addr, probe, collected.len());
    clean_banner(&collected)
}

async fn send_probe(stream: &mut TcpStream, probe: &[u8], socket_addr: SocketAddr) -> bool {
    match stream.write_all(probe).await {
        Ok(()) => true,
        Err(e) => {
            log::debug!("[scan::port] banner_probe_write_failed: addr={} error={}", socket_addr, e);
            false
        }
    }
}

/// Appends to `collected` until the limit, EOF, an error or `deadline`.
async fn read_banner(stream: &mut TcpStream, collected: &mut Vec<u8>, deadline: Instant) {
    let mut buffer = [0u8; BANNER_LIMIT];

    while collected.len() < BANNER_LIMIT {
        let room = BANNER_LIMIT - collected.len();
        match timeout_at(deadline, stream.read(&mut buffer[..room])).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => collected.extend_from_slice(&buffer[..n]),
            Ok(Err(e)) => {
                log::trace!("[scan::port] banner_read_error: error={} kept={}", e, collected.len());
                break;
            }
            Err(_) => break,
        }
    }
}

fn clean_banner(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_at_boundary(trimmed, BANNER_LIMIT).to_string())
}

fn truncate_at_boundary(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
