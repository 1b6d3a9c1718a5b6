use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

use log::Level;

use crate::util::unix_seconds;

/// Why a source was passed over without a network call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    TtlNotExpired,
}

/// Everything noteworthy the polling engine and the reconciler do. The core
/// reports through an [`EventSink`] instead of logging directly.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    SourceSkipped {
        source: Box<str>,
        reason: SkipReason,
    },
    SourcePolled {
        source: Box<str>,
        url: Box<str>,
    },
    ResponsePayload {
        source: Box<str>,
        payload: Box<str>,
    },
    Throttled {
        source: Box<str>,
        backoff: Duration,
    },
    TransportFailed {
        source: Box<str>,
        error: Box<str>,
    },
    ExtractionFailed {
        source: Box<str>,
    },
    InvalidIp {
        source: Box<str>,
        value: Box<str>,
    },
    SourceDisabled {
        source: Box<str>,
        last_success: Option<SystemTime>,
    },
    IpObtained {
        source: Box<str>,
        ip: Ipv4Addr,
    },
    NoEligibleSource,
    AllSourcesFailed {
        attempted: usize,
    },

    CacheExpired {
        hostname: Box<str>,
    },
    RecordResolved {
        hostname: Box<str>,
        ip: Option<Ipv4Addr>,
    },
    IpUnchanged {
        ip: Ipv4Addr,
    },
    IpChanged {
        from: Option<Ipv4Addr>,
        to: Ipv4Addr,
    },
    RecordUpdated {
        hostname: Box<str>,
        ip: Ipv4Addr,
    },
    UpdateFailed {
        hostname: Box<str>,
        error: Box<str>,
    },
}

impl Event {
    pub fn level(&self) -> Level {
        match self {
            Event::SourcePolled { .. }
            | Event::ResponsePayload { .. }
            | Event::IpObtained { .. }
            | Event::CacheExpired { .. }
            | Event::RecordResolved { .. }
            | Event::IpUnchanged { .. }
            | Event::IpChanged { .. }
            | Event::RecordUpdated { .. } => Level::Info,

            Event::Throttled { .. }
            | Event::TransportFailed { .. }
            | Event::ExtractionFailed { .. }
            | Event::InvalidIp { .. } => Level::Warn,

            Event::SourceSkipped { .. }
            | Event::SourceDisabled { .. }
            | Event::NoEligibleSource
            | Event::AllSourcesFailed { .. }
            | Event::UpdateFailed { .. } => Level::Error,
        }
    }
}

fn or_none<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::from("none"),
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SourceSkipped { source, reason: SkipReason::Disabled } => {
                write!(f, "tried to obtain the public IP using disabled source {}", source)
            }
            Event::SourceSkipped { source, reason: SkipReason::TtlNotExpired } => write!(
                f,
                "tried to obtain the public IP using source {} with an unexpired TTL",
                source
            ),
            Event::SourcePolled { source, url } => {
                write!(f, "getting public IP address from {}: {}", source, url)
            }
            Event::ResponsePayload { source, payload } => {
                write!(f, "response payload from {}: {}", source, payload)
            }
            Event::Throttled { source, backoff } => write!(
                f,
                "got HTTP 429 from {}, backing off for {:.3} second(s)",
                source,
                backoff.as_secs_f64()
            ),
            Event::TransportFailed { source, error } => {
                write!(f, "request to {} failed: {}", source, error)
            }
            Event::ExtractionFailed { source } => write!(
                f,
                "failed to obtain a public IP address from the response of {}",
                source
            ),
            Event::InvalidIp { source, value } => write!(
                f,
                "{} returned {:?}, which is not a valid public IPv4 address",
                source, value
            ),
            Event::SourceDisabled { source, last_success } => write!(
                f,
                "disabling source {}, last successful poll at {}",
                source,
                or_none(&last_success.map(unix_seconds))
            ),
            Event::IpObtained { source, ip } => {
                write!(f, "obtained IP address {} from {}", ip, source)
            }
            Event::NoEligibleSource => {
                write!(f, "could not find a public IP source with an expired TTL")
            }
            Event::AllSourcesFailed { attempted } => write!(
                f,
                "all {} eligible public IP source(s) failed to return an address",
                attempted
            ),
            Event::CacheExpired { hostname } => {
                write!(f, "local DNS cache for {} has expired", hostname)
            }
            Event::RecordResolved { hostname, ip } => {
                write!(f, "DNS A record of {} resolves to {}", hostname, or_none(ip))
            }
            Event::IpUnchanged { ip } => write!(f, "the public IP has not changed ({})", ip),
            Event::IpChanged { from, to } => {
                write!(f, "the public IP has changed from {} to {}", or_none(from), to)
            }
            Event::RecordUpdated { hostname, ip } => {
                write!(f, "updated the {} DNS A record with IP {}", hostname, ip)
            }
            Event::UpdateFailed { hostname, error } => {
                write!(f, "failed to update the {} DNS A record: {}", hostname, error)
            }
        }
    }
}

pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Forwards every event to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        log::log!(event.level(), "{}", event);
    }
}

#[cfg(test)]
pub use recording::RecordingSink;
