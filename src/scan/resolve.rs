use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Maps an address back to a host name.
#[async_trait]
pub trait ReverseResolver: Send + Sync {
    async fn reverse(&self, addr: IpAddr) -> Option<String>;
}

/// PTR lookups through a tokio DNS resolver.
pub struct DnsReverseResolver {
    resolver: TokioAsyncResolver,
    lookup_timeout: Duration,
}

impl DnsReverseResolver {
    pub fn new(lookup_timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = lookup_timeout;
        opts.attempts = 1;
        opts.cache_size = 256;

        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
            lookup_timeout,
        }
    }
}

impl Default for DnsReverseResolver {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT)
    }
}

#[async_trait]
impl ReverseResolver for DnsReverseResolver {
    async fn reverse(&self, addr: IpAddr) -> Option<String> {
        match tokio::time::timeout(self.lookup_timeout, self.resolver.reverse_lookup(addr)).await {
            Ok(Ok(response)) => {
                let name = response
                    .iter()
                    .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
                    .find(|name| !name.is_empty());
                log::debug!("[scan::resolve] reverse: addr={} name={:?}", addr, name);
                name
            }
            Ok(Err(e)) => {
                log::debug!("[scan::resolve] reverse_failed: addr={} error={}", addr, e);
                None
            }
            Err(_) => {
                log::debug!("[scan::resolve] reverse_timed_out: addr={} timeout={}ms",
                    addr, self.lookup_timeout.as_millis());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dns_resolver_keeps_timeout() {
        let resolver = DnsReverseResolver::new(Duration::from_millis(300));
        assert_eq!(resolver.lookup_timeout, Duration::from_millis(300));
    }
}
