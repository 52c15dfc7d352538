use eyre::{Result, WrapErr};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use netsweep::cli::{self, Command};
use netsweep::types::check_ports;
use netsweep::{EngineConfig, PortSet, ScanJob, Scanner, collect_addresses_within, pretty, progress_logger};

fn parse_ports(input: Option<&str>) -> Result<PortSet> {
    match input {
        Some(input) => Ok(PortSet::parse(input)?),
        None => Ok(PortSet::common()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();

    let log_path = args.log_path()?;
    if let Err(e) = netsweep::init_logging(args.verbose, log_path.as_deref()) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let mut config = EngineConfig::load_or_default(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    log::debug!("[main] config: {:?}", config);

    let scanner = Scanner::from_config(&config);
    let started = Instant::now();

    match &args.command {
        Command::Discover { target } => {
            let addresses = collect_addresses_within(&[target.as_str()], config.max_hosts)?;

            if !args.json {
                pretty::print_header(target);
            }
            let report = progress_logger("discover");
            let hosts = scanner
                .discover_hosts(&addresses, config.timeout(), config.concurrency, Some(&report))
                .await;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else {
                pretty::print_hosts(&hosts, started.elapsed());
            }
        }
        Command::Ports { host, ports } => {
            let ip: Ipv4Addr = host
                .trim()
                .parse()
                .wrap_err_with(|| format!("Invalid host address '{}'", host))?;
            let addr = IpAddr::V4(ip);
            let ports = parse_ports(ports.as_deref())?;
            check_ports(ports.len(), config.max_ports)?;

            if !args.json {
                pretty::print_header(&format!("{} ({})", addr, ports));
            }
            let report = progress_logger("ports");
            let mut results = scanner
                .scan_ports(addr, &ports, config.timeout(), config.concurrency, Some(&report))
                .await;
            if config.banner_grab {
                results = scanner
                    .detect_services(addr, results, config.timeout(), config.concurrency)
                    .await;
            }

            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                pretty::print_ports(addr, &results, started.elapsed());
            }
        }
        Command::Sweep { target, ports } => {
            let addresses = collect_addresses_within(&[target.as_str()], config.max_hosts)?;
            let ports = parse_ports(ports.as_deref())?;
            let mut job = ScanJob::with_limits(
                addresses,
                ports,
                config.timeout(),
                config.concurrency,
                config.max_hosts,
                config.max_ports,
            )?;
            if !config.banner_grab {
                job = job.without_banners();
            }

            if !args.json {
                pretty::print_header(&format!("{} ({})", target, job.ports));
            }
            let report = progress_logger("sweep");
            let reports = scanner.run_job(&job, Some(&report)).await;

            if args.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                pretty::print_reports(&reports, job.addresses.len(), started.elapsed());
            }
        }
    }

    log::info!("[main] finished: duration={}ms", started.elapsed().as_millis());
    Ok(())
}
