use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::Resolver;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("DNS A record for {0} has more than one IP address ({1:?}), which is not supported")]
    Ambiguous(Box<str>, Vec<Ipv4Addr>),

    #[error("DNS lookup for {0} failed: {1}")]
    Lookup(Box<str>, Box<str>),
}

/// Looks up the A record currently published for a hostname.
pub trait DnsResolver {
    /// Every A answer for `hostname`. An empty list means no record.
    fn lookup_a(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ResolveError>;

    /// The single published address, `None` when there is no record.
    /// More than one answer is an error.
    fn resolve(&self, hostname: &str) -> Result<Option<Ipv4Addr>, ResolveError> {
        let answers = self.lookup_a(hostname)?;

        match answers.len() {
            0 => Ok(None),
            1 => Ok(Some(answers[0])),
            _ => Err(ResolveError::Ambiguous(hostname.into(), answers)),
        }
    }
}

/// Queries a fixed set of upstream nameservers, bypassing the system
/// resolver and its cache.
pub struct HickoryResolver {
    inner: Resolver,
}

impl HickoryResolver {
    pub fn new(nameservers: &[IpAddr], timeout: Duration) -> std::io::Result<Self> {
        let group = NameServerConfigGroup::from_ips_clear(nameservers, 53, true);
        let config = ResolverConfig::from_parts(None, Vec::new(), group);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        opts.cache_size = 0;

        Ok(Self {
            inner: Resolver::new(config, opts)?,
        })
    }
}

impl DnsResolver for HickoryResolver {
    fn lookup_a(&self, hostname: &str) -> Result<Vec<Ipv4Addr>, ResolveError> {
        match self.inner.ipv4_lookup(hostname) {
            Ok(lookup) => Ok(lookup.iter().map(|a| a.0).collect()),
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(Vec::new()),
                _ => Err(ResolveError::Lookup(hostname.into(), e.to_string().into())),
            },
        }
    }
}

#[cfg(test)]
pub use fake::StaticResolver;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_answer_contract() {
        let resolver = StaticResolver::answering(&[]);
        assert_eq!(resolver.resolve("home.example.com"), Ok(None));

        resolver.set(Ok(vec![Ipv4Addr::new(93, 184, 216, 34)]));
        assert_eq!(
            resolver.resolve("home.example.com"),
            Ok(Some(Ipv4Addr::new(93, 184, 216, 34)))
        );

        resolver.set(Ok(vec![Ipv4Addr::new(93, 184, 216, 34), Ipv4Addr::new(93, 184, 216, 35)]));
        assert!(matches!(
            resolver.resolve("home.example.com"),
            Err(ResolveError::Ambiguous(_, ips)) if ips.len() == 2
        ));

        assert_eq!(resolver.lookups(), 3);
    }
}
