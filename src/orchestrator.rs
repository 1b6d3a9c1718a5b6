use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use thiserror::Error;

use crate::auth::{AuthError, IdentityProvider};
use crate::dns::{DnsResolver, ResolveError};
use crate::events::{Event, EventSink};
use crate::http::Headers;
use crate::services::{DdnsService, DdnsUpdateError, RecordUpdate};
use crate::util::elapsed_between;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("DNS A record for {0} is ambiguous: {1:?}")]
    AmbiguousRecord(Box<str>, Vec<Ipv4Addr>),

    #[error("{0}")]
    Resolve(ResolveError),

    #[error("unable to authenticate the update call: {0}")]
    Auth(#[from] AuthError),
}

impl From<ResolveError> for ReconcileError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Ambiguous(hostname, ips) => ReconcileError::AmbiguousRecord(hostname, ips),
            other => ReconcileError::Resolve(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The published record already points at the address.
    Unchanged,

    /// The record was changed; `previous` is what it pointed at before, as
    /// far as the cache knew.
    Updated { previous: Option<Ipv4Addr> },

    /// The update call failed. The cache still holds the old address, so
    /// the next cycle tries again.
    UpdateFailed(DdnsUpdateError),
}

/// Which record is being kept up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub zone_name: Box<str>,
    pub zone_dns_name: Box<str>,
    pub hostname: Box<str>,
}

/// The last address known to be published, and when that was learnt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCache {
    cached_ip: Option<Ipv4Addr>,
    cache_timestamp: Option<SystemTime>,
    cache_ttl: Duration,
}

impl UpdateCache {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            cached_ip: None,
            cache_timestamp: None,
            cache_ttl,
        }
    }

    pub fn cached_ip(&self) -> Option<Ipv4Addr> {
        self.cached_ip
    }

    pub fn cache_timestamp(&self) -> Option<SystemTime> {
        self.cache_timestamp
    }

    /// A cache that was never filled is always stale.
    pub fn is_stale(&self, now: SystemTime) -> bool {
        match self.cache_timestamp {
            Some(timestamp) => elapsed_between(timestamp, now) >= self.cache_ttl,
            None => true,
        }
    }

    fn store(&mut self, ip: Option<Ipv4Addr>, now: SystemTime) {
        self.cached_ip = ip;
        self.cache_timestamp = Some(now);
    }
}

/// Publishes newly discovered addresses, skipping the update call when the
/// record already matches.
pub struct Reconciler {
    zone: Zone,
    cache: UpdateCache,
    resolver: Box<dyn DnsResolver>,
    identity: Box<dyn IdentityProvider>,
    service: Box<dyn DdnsService>,
}

impl Reconciler {
    pub fn new(
        zone: Zone,
        cache_ttl: Duration,
        resolver: Box<dyn DnsResolver>,
        identity: Box<dyn IdentityProvider>,
        service: Box<dyn DdnsService>,
    ) -> Self {
        Self {
            zone,
            cache: UpdateCache::new(cache_ttl),
            resolver,
            identity,
            service,
        }
    }

    pub fn cache(&self) -> &UpdateCache {
        &self.cache
    }

    fn refresh_cache(&mut self, events: &dyn EventSink, now: SystemTime) -> Result<(), ReconcileError> {
        events.emit(Event::CacheExpired {
            hostname: self.zone.hostname.clone(),
        });

        let published = self.resolver.resolve(&self.zone.hostname)?;

        events.emit(Event::RecordResolved {
            hostname: self.zone.hostname.clone(),
            ip: published,
        });

        self.cache.store(published, now);
        Ok(())
    }

    /// Makes sure the record points at `ip`. Resolver and identity failures
    /// abort the cycle with an error; a failed update call is reported as
    /// [`UpdateOutcome::UpdateFailed`].
    pub fn reconcile(
        &mut self,
        ip: Ipv4Addr,
        events: &dyn EventSink,
        now: SystemTime,
    ) -> Result<UpdateOutcome, ReconcileError> {
        if self.cache.is_stale(now) {
            self.refresh_cache(events, now)?;
        }

        let previous = self.cache.cached_ip;
        if previous == Some(ip) {
            events.emit(Event::IpUnchanged { ip });
            return Ok(UpdateOutcome::Unchanged);
        }

        events.emit(Event::IpChanged { from: previous, to: ip });

        let mut headers = Headers::new();
        self.identity.authenticate(&mut headers, now)?;

        let record = RecordUpdate::new(
            &self.zone.zone_name,
            &self.zone.zone_dns_name,
            &self.zone.hostname,
            ip,
        );

        match self.service.update_record(&headers, &record) {
            Ok(()) => {
                self.cache.store(Some(ip), now);
                events.emit(Event::RecordUpdated {
                    hostname: self.zone.hostname.clone(),
                    ip,
                });
                Ok(UpdateOutcome::Updated { previous })
            }

            Err(e) => {
                events.emit(Event::UpdateFailed {
                    hostname: self.zone.hostname.clone(),
                    error: e.to_string().into(),
                });
                Ok(UpdateOutcome::UpdateFailed(e))
            }
        }
    }
}
