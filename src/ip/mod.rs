mod builtin;
mod extract;
mod http;
mod netmask;
mod selector;

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::events::{Event, EventSink, SkipReason};
use crate::util::elapsed_between;

pub use builtin::builtin_sources;
pub use extract::{Extractor, ExtractorError};
pub use http::{Fetch, FetchError, HttpFetcher};
pub use selector::{RandomStart, SourcePool};

#[cfg(test)]
pub use http::ScriptedFetcher;
#[cfg(test)]
pub use selector::FixedIndex;

/// Each consecutive HTTP 429 multiplies the extra delay by this factor.
pub const BACKOFF_FACTOR: f64 = 1.5;

/// Upper bound on the throttling delay, reached after ~43 consecutive 429s.
const MAX_BACKOFF: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub const DEFAULT_MAX_INACTIVE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// The static description of a public IP provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceDef {
    pub name: Box<str>,
    pub url: Box<str>,
    pub ttl: Duration,
    pub extractor: Extractor,
    pub max_inactive: Duration,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PollError {
    #[error("the source is disabled")]
    DisabledSource,

    #[error("the source TTL has not expired yet")]
    TtlNotExpired,

    #[error("throttled by the source, backing off for {0:?}")]
    Throttled(Duration),

    #[error("{0}")]
    Transport(FetchError),

    #[error("unable to find an IP address in the response")]
    Extraction,

    #[error("{0:?} is not a valid public IPv4 address")]
    InvalidIp(Box<str>),
}

/// One provider together with its scheduling and health bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct IpSource {
    def: SourceDef,
    enabled: bool,
    last_poll: Option<SystemTime>,
    next_poll: SystemTime,
    last_success: Option<SystemTime>,
    http_errors: u32,
    http_429s: u32,
    errors: u32,
    created: SystemTime,
}

fn later(time: SystemTime, by: Duration) -> SystemTime {
    time.checked_add(by).unwrap_or(time + MAX_BACKOFF)
}

/// Accepts only dotted-quad text naming a globally reachable address.
pub fn parse_public_v4(candidate: &str) -> Option<Ipv4Addr> {
    match candidate.trim().parse::<IpAddr>().ok()? {
        IpAddr::V4(v4) if netmask::is_global_v4(v4) => Some(v4),
        _ => None,
    }
}

fn escape_newlines(payload: &str) -> Box<str> {
    payload.lines().collect::<Vec<_>>().join("\\n").into()
}

impl IpSource {
    pub fn new(def: SourceDef, now: SystemTime) -> Self {
        Self {
            def,
            enabled: true,
            last_poll: None,
            next_poll: UNIX_EPOCH,
            last_success: None,
            http_errors: 0,
            http_429s: 0,
            errors: 0,
            created: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn url(&self) -> &str {
        &self.def.url
    }

    pub fn ttl(&self) -> Duration {
        self.def.ttl
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn last_poll_timestamp(&self) -> Option<SystemTime> {
        self.last_poll
    }

    pub fn next_poll_timestamp(&self) -> SystemTime {
        self.next_poll
    }

    pub fn last_successful_poll_timestamp(&self) -> Option<SystemTime> {
        self.last_success
    }

    pub fn consecutive_http_error_count(&self) -> u32 {
        self.http_errors
    }

    pub fn consecutive_http_429_count(&self) -> u32 {
        self.http_429s
    }

    pub fn consecutive_error_count(&self) -> u32 {
        self.errors
    }

    /// Whether the source may be polled at `now`.
    pub fn is_eligible(&self, now: SystemTime) -> bool {
        self.enabled && self.next_poll <= now
    }

    /// Performs one poll attempt. Disabled sources and sources whose TTL has
    /// not elapsed are rejected without touching the network or any field.
    pub fn poll(
        &mut self,
        http: &dyn Fetch,
        events: &dyn EventSink,
        now: SystemTime,
    ) -> Result<Ipv4Addr, PollError> {
        if !self.enabled {
            events.emit(Event::SourceSkipped {
                source: self.def.name.clone(),
                reason: SkipReason::Disabled,
            });
            return Err(PollError::DisabledSource);
        }

        if now < self.next_poll {
            events.emit(Event::SourceSkipped {
                source: self.def.name.clone(),
                reason: SkipReason::TtlNotExpired,
            });
            return Err(PollError::TtlNotExpired);
        }

        self.last_poll = Some(now);
        self.next_poll = later(now, self.def.ttl);

        events.emit(Event::SourcePolled {
            source: self.def.name.clone(),
            url: self.def.url.clone(),
        });

        let body = match http.fetch(&self.def.url) {
            Ok(body) => body,

            Err(FetchError::Status(429)) => {
                self.http_429s = self.http_429s.saturating_add(1);
                self.http_errors = 0;

                let exponent = i32::try_from(self.http_429s).unwrap_or(i32::MAX);
                let backoff = Duration::try_from_secs_f64(BACKOFF_FACTOR.powi(exponent))
                    .unwrap_or(MAX_BACKOFF)
                    .min(MAX_BACKOFF);
                self.next_poll = later(now, self.def.ttl.saturating_add(backoff));

                events.emit(Event::Throttled {
                    source: self.def.name.clone(),
                    backoff,
                });
                self.check_for_inactivity(events, now);
                return Err(PollError::Throttled(backoff));
            }

            Err(e) => {
                self.http_errors = self.http_errors.saturating_add(1);
                self.http_429s = 0;

                events.emit(Event::TransportFailed {
                    source: self.def.name.clone(),
                    error: e.to_string().into(),
                });
                self.check_for_inactivity(events, now);
                return Err(PollError::Transport(e));
            }
        };

        self.http_errors = 0;
        self.http_429s = 0;

        events.emit(Event::ResponsePayload {
            source: self.def.name.clone(),
            payload: escape_newlines(&body),
        });

        let Some(candidate) = self.def.extractor.extract(&body) else {
            self.errors = self.errors.saturating_add(1);
            events.emit(Event::ExtractionFailed {
                source: self.def.name.clone(),
            });
            self.check_for_inactivity(events, now);
            return Err(PollError::Extraction);
        };

        let Some(ip) = parse_public_v4(candidate) else {
            self.errors = self.errors.saturating_add(1);
            events.emit(Event::InvalidIp {
                source: self.def.name.clone(),
                value: candidate.into(),
            });
            self.check_for_inactivity(events, now);
            return Err(PollError::InvalidIp(candidate.into()));
        };

        self.errors = 0;
        self.last_success = Some(now);

        events.emit(Event::IpObtained {
            source: self.def.name.clone(),
            ip,
        });

        Ok(ip)
    }

    /// Takes the source out of rotation for good once it has gone too long
    /// without a successful poll.
    fn check_for_inactivity(&mut self, events: &dyn EventSink, now: SystemTime) {
        let since = self.last_success.unwrap_or(self.created);

        if self.enabled && elapsed_between(since, now) > self.def.max_inactive {
            self.enabled = false;
            events.emit(Event::SourceDisabled {
                source: self.def.name.clone(),
                last_success: self.last_success,
            });
        }
    }
}
