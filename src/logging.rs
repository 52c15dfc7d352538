use eyre::{Result, eyre};
use log::LevelFilter;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use crate::types::Progress;

/// Initialize logging to stderr, or appended to `log_file` when given.
///
/// `RUST_LOG` picks the level (default INFO); `verbose` forces DEBUG.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string())
            .parse::<LevelFilter>()
            .unwrap_or(LevelFilter::Info)
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(log_level).format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        builder.target(env_logger::Target::Pipe(Box::new(
            fs::OpenOptions::new().create(true).append(true).open(path)?,
        )));
    }

    builder.try_init()?;

    match log_file {
        Some(path) => log::info!("Logging initialized to: {}", path.display()),
        None => log::debug!("Logging initialized to stderr"),
    }
    log::debug!("Log level: {}", log_level);

    Ok(())
}

/// System-specific log file location.
pub fn default_log_file_path() -> Result<PathBuf> {
    let log_dir = if cfg!(target_os = "macos") {
        // macOS: ~/Library/Logs/netsweep/
        dirs::home_dir()
            .ok_or_else(|| eyre!("Could not find home directory"))?
            .join("Library")
            .join("Logs")
            .join("netsweep")
    } else {
        // ~/.local/share/netsweep/logs/ and equivalents
        dirs::data_local_dir()
            .ok_or_else(|| eyre!("Could not find local data directory"))?
            .join("netsweep")
            .join("logs")
    };

    Ok(log_dir.join("netsweep.log"))
}

/// Lets one progress report through per 10% step.
///
/// A report with `completed == 1` starts a new run, so the same throttle can
/// follow several scheduler passes in a row.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_step: AtomicU8,
}

impl ProgressThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_report(&self, progress: &Progress) -> bool {
        if progress.completed <= 1 {
            self.last_step.store(0, Ordering::Relaxed);
        }
        let step = progress.percentage / 10;
        step > self.last_step.fetch_max(step, Ordering::Relaxed)
    }
}

/// Progress callback that logs each 10% step under `phase`.
pub fn progress_logger(phase: &'static str) -> impl Fn(Progress) + Send + Sync {
    let throttle = ProgressThrottle::new();
    move |progress: Progress| {
        if throttle.should_report(&progress) {
            log::info!("[{}] progress: {}", phase, progress);
        }
    }
}
