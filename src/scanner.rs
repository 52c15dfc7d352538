use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::{EngineConfig, PingMethod};
use crate::ports::PortSet;
use crate::scan::batch::{percentage, run_batched};
use crate::scan::ping::{HostReachabilityChecker, PingChecker, TcpChecker, probe_host};
use crate::scan::port::{grab_banner, probe_port};
use crate::scan::resolve::{DnsReverseResolver, ReverseResolver};
use crate::services;
use crate::types::{HostReport, HostResult, PortResult, Progress, ProgressFn, ScanJob};

/// The scanning engine.
///
/// Every operation yields exactly one record per input item. Per-item network
/// failures are folded into the records and never surface as errors.
#[derive(Clone)]
pub struct Scanner {
    checker: Arc<dyn HostReachabilityChecker>,
    resolver: Option<Arc<dyn ReverseResolver>>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self {
            checker: Arc::new(PingChecker::new()),
            resolver: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let mut scanner = Self::new();
        if config.ping_method == PingMethod::Tcp {
            scanner = scanner.with_checker(Arc::new(TcpChecker::new()));
        }
        if config.resolve_hostnames {
            scanner = scanner.with_resolver(Arc::new(DnsReverseResolver::default()));
        }
        scanner
    }

    pub fn with_checker(mut self, checker: Arc<dyn HostReachabilityChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ReverseResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Checks every address for reachability.
    ///
    /// Results are in batch-completion order, not input order.
    pub async fn discover_hosts(
        &self,
        addresses: &[Ipv4Addr],
        timeout: Duration,
        concurrency: usize,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Vec<HostResult> {
        log::info!("[scanner] discover_hosts: hosts={} checker={} timeout={}ms concurrency={}",
            addresses.len(), self.checker.name(), timeout.as_millis(), concurrency);

        let checker = self.checker.as_ref();
        let (hosts, stats) = run_batched(
            addresses.to_vec(),
            concurrency,
            |addr| probe_host(checker, addr, timeout),
            on_progress,
        )
        .await;

        let reachable = hosts.iter().filter(|h| h.is_reachable).count();
        log::info!("[scanner] discover_hosts_completed: hosts={} reachable={} batches={} duration={}ms",
            hosts.len(), reachable, stats.batches, stats.elapsed.as_millis());

        match &self.resolver {
            Some(resolver) if reachable > 0 => self.resolve_hostnames(resolver.as_ref(), hosts, concurrency).await,
            _ => hosts,
        }
    }

    async fn resolve_hostnames(
        &self,
        resolver: &dyn ReverseResolver,
        hosts: Vec<HostResult>,
        concurrency: usize,
    ) -> Vec<HostResult> {
        let (hosts, stats) = run_batched(
            hosts,
            concurrency,
            |mut host| async move {
                if let Some(ip) = host.ip().filter(|_| host.is_reachable) {
                    host.hostname = resolver.reverse(IpAddr::V4(ip)).await;
                }
                host
            },
            None,
        )
        .await;

        log::debug!("[scanner] resolve_hostnames_completed: named={} duration={}ms",
            hosts.iter().filter(|h| h.hostname.is_some()).count(), stats.elapsed.as_millis());
        hosts
    }

    /// Probes every port of `ports` on `addr`. Results are sorted by port.
    pub async fn scan_ports(
        &self,
        addr: IpAddr,
        ports: &PortSet,
        timeout: Duration,
        concurrency: usize,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Vec<PortResult> {
        log::info!("[scanner] scan_ports: addr={} ports={} timeout={}ms concurrency={}",
            addr, ports.len(), timeout.as_millis(), concurrency);

        let (mut results, stats) = run_batched(
            ports.as_slice().to_vec(),
            concurrency,
            |port| probe_port(addr, port, timeout),
            on_progress,
        )
        .await;
        results.sort_by_key(|r| r.port);

        log::info!("[scanner] scan_ports_completed: addr={} open={} batches={} duration={}ms",
            addr, results.iter().filter(|r| r.is_open).count(), stats.batches, stats.elapsed.as_millis());
        results
    }

    /// Grabs banners from the open entries of `results` and refines their
    /// service names. Closed entries pass through untouched and the order of
    /// `results` is kept.
    pub async fn detect_services(
        &self,
        addr: IpAddr,
        mut results: Vec<PortResult>,
        timeout: Duration,
        concurrency: usize,
    ) -> Vec<PortResult> {
        let open: Vec<u16> = results.iter().filter(|r| r.is_open).map(|r| r.port).collect();
        if open.is_empty() {
            return results;
        }

        log::debug!("[scanner] detect_services: addr={} open={}", addr, open.len());

        let (banners, stats) = run_batched(
            open,
            concurrency,
            |port| async move { (port, grab_banner(addr, port, timeout).await) },
            None,
        )
        .await;
        let mut banners: HashMap<u16, String> = banners
            .into_iter()
            .filter_map(|(port, banner)| banner.map(|b| (port, b)))
            .collect();

        for result in results.iter_mut().filter(|r| r.is_open) {
            let Some(banner) = banners.remove(&result.port) else {
                continue;
            };
            if let Some(guess) = services::identify_banner(&banner, result.port) {
                log::debug!("[scanner] service_identified: addr={} port={} service={} version={:?}",
                    addr, result.port, guess.name, guess.version);
                result.service_name = Some(guess.name);
                result.version = guess.version;
            }
            result.banner = Some(banner);
        }

        log::debug!("[scanner] detect_services_completed: addr={} banners={} duration={}ms",
            addr, results.iter().filter(|r| r.banner.is_some()).count(), stats.elapsed.as_millis());
        results
    }

    /// Discovery, then a port scan and optional banner pass per reachable
    /// host. Reports are sorted by address.
    ///
    /// `on_progress` sees a single counter for the whole job, so percentages
    /// never go backwards between passes.
    pub async fn run_job(&self, job: &ScanJob, on_progress: Option<ProgressFn<'_>>) -> Vec<HostReport> {
        let progress = JobProgress::new(job, on_progress);
        let forward = |p: Progress| progress.advance(1, p.item);

        let hosts = self
            .discover_hosts(&job.addresses, job.timeout, job.concurrency, Some(&forward))
            .await;

        let mut reports = Vec::new();
        for host in hosts {
            let ip = match host.ip() {
                Some(ip) if host.is_reachable => ip,
                Some(_) => {
                    progress.advance(job.ports.len(), host.address);
                    continue;
                }
                None => {
                    log::warn!("[scanner] unparsable_address: address={}", host.address);
                    progress.advance(job.ports.len(), host.address);
                    continue;
                }
            };
            let addr = IpAddr::V4(ip);

            let mut ports = self
                .scan_ports(addr, &job.ports, job.timeout, job.concurrency, Some(&forward))
                .await;
            if job.banner_grab {
                ports = self.detect_services(addr, ports, job.timeout, job.concurrency).await;
            }
            reports.push(HostReport { host, ports });
        }

        reports.sort_by_key(|r| r.host.ip());
        reports
    }
}

/// One progress counter spanning every pass of a job.
///
/// The total is fixed up front: one step per address plus one per port of
/// every address. Ports of hosts that turn out unreachable are credited in a
/// single step once discovery ends.
struct JobProgress<'a> {
    report: Option<ProgressFn<'a>>,
    completed: AtomicUsize,
    total: usize,
}

impl<'a> JobProgress<'a> {
    fn new(job: &ScanJob, report: Option<ProgressFn<'a>>) -> Self {
        let hosts = job.addresses.len();
        Self {
            report,
            completed: AtomicUsize::new(0),
            total: hosts + hosts * job.ports.len(),
        }
    }

    fn advance(&self, steps: usize, item: String) {
        let Some(report) = self.report else {
            return;
        };
        if steps == 0 {
            return;
        }
        let completed = self.completed.fetch_add(steps, Ordering::SeqCst) + steps;
        report(Progress {
            percentage: percentage(completed, self.total),
            completed,
            total: self.total,
            item,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eyre::Result;
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    /// Treats addresses with an even last octet as alive.
    struct EvenChecker;

    #[async_trait]
    impl HostReachabilityChecker for EvenChecker {
        fn name(&self) -> &'static str {
            "even"
        }

        async fn check(&self, addr: Ipv4Addr, _timeout: Duration) -> Result<Duration> {
            if addr.octets()[3] % 2 == 0 {
                Ok(Duration::from_millis(u64::from(addr.octets()[3])))
            } else {
                eyre::bail!("no reply")
            }
        }
    }

    struct FixedResolver;

    #[async_trait]
    impl ReverseResolver for FixedResolver {
        async fn reverse(&self, addr: IpAddr) -> Option<String> {
            Some(format!("host-{}", addr.to_string().replace('.', "-")))
        }
    }

    /// Accepts connections forever and writes `greeting` to each.
    async fn greeter(greeting: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let _ = stream.write_all(greeting).await;
            }
        });
        port
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    fn addresses(count: u8) -> Vec<Ipv4Addr> {
        (1..=count).map(|n| Ipv4Addr::new(10, 0, 0, n)).collect()
    }

    #[tokio::test]
    async fn test_discover_returns_one_result_per_address() {
        let scanner = Scanner::new().with_checker(Arc::new(EvenChecker));
        let input = addresses(25);

        let hosts = scanner.discover_hosts(&input, Duration::from_millis(200), 4, None).await;
        assert_eq!(hosts.len(), input.len());

        let mut seen: Vec<Ipv4Addr> = hosts.iter().filter_map(HostResult::ip).collect();
        seen.sort();
        assert_eq!(seen, input);

        for host in &hosts {
            let even = host.ip().unwrap().octets()[3] % 2 == 0;
            assert_eq!(host.is_reachable, even);
            assert_eq!(host.latency_ms.is_some(), even);
            assert!(host.hostname.is_none());
        }
    }

    #[tokio::test]
    async fn test_discover_reports_progress() {
        let scanner = Scanner::new().with_checker(Arc::new(EvenChecker));
        let seen = Mutex::new(Vec::new());
        let report = |p: Progress| seen.lock().unwrap().push(p);

        scanner
            .discover_hosts(&addresses(10), Duration::from_millis(200), 3, Some(&report))
            .await;

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 10);
        assert!(seen.windows(2).all(|w| w[0].percentage <= w[1].percentage));
        assert_eq!(seen.last().map(|p| p.percentage), Some(100));
    }

    #[tokio::test]
    async fn test_discover_names_only_reachable_hosts() {
        let scanner = Scanner::new()
            .with_checker(Arc::new(EvenChecker))
            .with_resolver(Arc::new(FixedResolver));

        let hosts = scanner.discover_hosts(&addresses(6), Duration::from_millis(200), 2, None).await;
        assert_eq!(hosts.len(), 6);
        for host in hosts {
            if host.is_reachable {
                assert_eq!(host.hostname, Some(format!("host-{}", host.address.replace('.', "-"))));
            } else {
                assert_eq!(host.hostname, None);
            }
        }
    }

    #[tokio::test]
    async fn test_discover_empty_input() {
        let scanner = Scanner::new().with_checker(Arc::new(EvenChecker));
        let hosts = scanner.discover_hosts(&[], Duration::from_millis(100), 10, None).await;
        assert!(hosts.is_empty());
    }

    #[tokio::test]
    async fn test_scan_ports_sorted_with_open_and_closed() {
        let open_a = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open_b = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port_a = open_a.local_addr().unwrap().port();
        let port_b = open_b.local_addr().unwrap().port();
        let closed = closed_port().await;

        let ports = PortSet::from_ports([port_b, closed, port_a]);
        let scanner = Scanner::new();
        let results = scanner
            .scan_ports(LOCALHOST, &ports, Duration::from_millis(500), 2, None)
            .await;

        assert_eq!(results.len(), 3);
        assert!(results.windows(2).all(|w| w[0].port < w[1].port));
        for result in &results {
            let expected_open = result.port == port_a || result.port == port_b;
            assert_eq!(result.is_open, expected_open, "port {}", result.port);
            assert!(result.banner.is_none());
        }
    }

    #[tokio::test]
    async fn test_detect_services_touches_only_open_ports() {
        let ssh_port = greeter(b"SSH-2.0-OpenSSH_9.6 Debian\r\n").await;
        let closed = closed_port().await;

        let open = PortResult {
            port: ssh_port,
            is_open: true,
            service_name: None,
            banner: None,
            latency_ms: Some(1),
            version: None,
        };
        let shut = PortResult {
            port: closed,
            is_open: false,
            service_name: Some("unknown".to_string()),
            banner: None,
            latency_ms: None,
            version: None,
        };

        let scanner = Scanner::new();
        let results = scanner
            .detect_services(LOCALHOST, vec![shut.clone(), open], Duration::from_millis(500), 4)
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], shut);
        assert_eq!(results[1].port, ssh_port);
        assert_eq!(results[1].banner.as_deref(), Some("SSH-2.0-OpenSSH_9.6 Debian"));
        assert_eq!(results[1].service_name.as_deref(), Some("ssh"));
        assert_eq!(results[1].version.as_deref(), Some("OpenSSH_9.6"));
    }

    #[tokio::test]
    async fn test_detect_services_without_open_ports_is_identity() {
        let closed = PortResult {
            port: 9,
            is_open: false,
            service_name: None,
            banner: None,
            latency_ms: None,
            version: None,
        };
        let scanner = Scanner::new();
        let results = scanner
            .detect_services(LOCALHOST, vec![closed.clone()], Duration::from_millis(100), 1)
            .await;
        assert_eq!(results, vec![closed]);
    }

    #[tokio::test]
    async fn test_run_job_reports_reachable_hosts_only() {
        let smtp_port = greeter(b"220 mail.example.com ESMTP Postfix\r\n").await;
        let closed = closed_port().await;

        // Only odd last octets answer, so 127.0.0.2 stays unreachable.
        let job = ScanJob::new(
            vec![Ipv4Addr::new(127, 0, 0, 2), Ipv4Addr::new(127, 0, 0, 1)],
            PortSet::from_ports([smtp_port, closed]),
            Duration::from_millis(500),
            4,
        )
        .unwrap();

        let scanner = Scanner::new().with_checker(Arc::new(OddChecker));
        let reports = scanner.run_job(&job, None).await;

        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.host.address, "127.0.0.1");
        assert_eq!(report.ports.len(), 2);

        let open: Vec<_> = report.open_ports().collect();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].port, smtp_port);
        assert_eq!(open[0].service_name.as_deref(), Some("smtp"));
        assert!(open[0].banner.as_deref().unwrap().starts_with("220 "));
    }

    #[tokio::test]
    async fn test_run_job_progress_is_one_counter() {
        let first = closed_port().await;
        let second = closed_port().await;

        // 127.0.0.1 and 127.0.0.3 answer, 127.0.0.2 does not.
        let job = ScanJob::new(
            vec![Ipv4Addr::new(127, 0, 0, 1), Ipv4Addr::new(127, 0, 0, 2), Ipv4Addr::new(127, 0, 0, 3)],
            PortSet::from_ports([first, second]),
            Duration::from_millis(300),
            2,
        )
        .unwrap()
        .without_banners();

        let seen = Mutex::new(Vec::new());
        let report = |p: Progress| seen.lock().unwrap().push(p);

        let scanner = Scanner::new().with_checker(Arc::new(OddChecker));
        let reports = scanner.run_job(&job, Some(&report)).await;
        assert_eq!(reports.len(), 2);

        let seen = seen.into_inner().unwrap();
        // 3 discovery steps, 1 credit for the silent host, 2 x 2 port steps.
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().all(|p| p.total == 9));
        assert!(seen.windows(2).all(|w| w[0].percentage <= w[1].percentage));
        assert!(seen.windows(2).all(|w| w[0].completed < w[1].completed));
        assert_eq!(seen.last().map(|p| (p.completed, p.percentage)), Some((9, 100)));
        let credits: Vec<_> = seen
            .windows(2)
            .filter(|w| w[1].completed - w[0].completed == 2)
            .map(|w| w[1].item.as_str())
            .collect();
        assert_eq!(credits, vec!["127.0.0.2"]);
    }

    #[tokio::test]
    async fn test_run_job_without_banners() {
        let port = greeter(b"SSH-2.0-dropbear\r\n").await;
        let job = ScanJob::new(
            vec![Ipv4Addr::LOCALHOST],
            PortSet::from_ports([port]),
            Duration::from_millis(500),
            1,
        )
        .unwrap()
        .without_banners();

        let scanner = Scanner::new().with_checker(Arc::new(OddChecker));
        let reports = scanner.run_job(&job, None).await;

        assert_eq!(reports.len(), 1);
        assert!(reports[0].ports[0].is_open);
        assert!(reports[0].ports[0].banner.is_none());
    }

    struct OddChecker;

    #[async_trait]
    impl HostReachabilityChecker for OddChecker {
        fn name(&self) -> &'static str {
            "odd"
        }

        async fn check(&self, addr: Ipv4Addr, _timeout: Duration) -> Result<Duration> {
            if addr.octets()[3] % 2 == 1 {
                Ok(Duration::from_millis(1))
            } else {
                eyre::bail!("no reply")
            }
        }
    }

    #[test]
    fn test_from_config_builds_engine() {
        let config = EngineConfig {
            ping_method: PingMethod::Tcp,
            ..EngineConfig::default()
        };
        let scanner = Scanner::from_config(&config);
        assert_eq!(scanner.checker.name(), "tcp");
        assert!(scanner.resolver.is_none());
        assert_eq!(Scanner::new().checker.name(), "ping");
    }
}
