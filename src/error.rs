use thiserror::Error;

/// Errors surfaced before a scan starts.
///
/// Unreachable hosts, closed ports and timeouts are never errors: they are
/// reported as negative records by the probes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid format '{input}': {reason}")]
    InvalidFormat { input: String, reason: String },
    #[error("no valid ports in '{input}'")]
    NoValidPorts { input: String },
    #[error("too many {what}: {count} exceeds the limit of {limit}")]
    CardinalityExceeded {
        what: &'static str,
        count: u64,
        limit: usize,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    pub(crate) fn invalid(input: &str, reason: impl Into<String>) -> Self {
        ScanError::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
