pub mod batch;
pub mod ping;
pub mod port;
pub mod resolve;

pub use batch::{ScheduleStats, run_batched};
pub use ping::{HostReachabilityChecker, PingChecker, TcpChecker, probe_host};
pub use port::{grab_banner, probe_port};
pub use resolve::{DnsReverseResolver, ReverseResolver};
