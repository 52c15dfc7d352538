pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod ports;
pub mod pretty;
pub mod scan;
pub mod scanner;
pub mod services;
pub mod target;
pub mod types;

// Re-export key types and functions at the crate root
pub use config::{EngineConfig, PingMethod};
pub use error::ScanError;
pub use logging::{default_log_file_path, init_logging, progress_logger};
pub use ports::PortSet;
pub use scanner::Scanner;
pub use target::{AddressInterval, collect_addresses, collect_addresses_within};
pub use types::{HostReport, HostResult, PortResult, Progress, ScanJob};
