pub mod cloud_function;
pub mod dummy;

use std::net::Ipv4Addr;

use serde_derive::Serialize;
use thiserror::Error;

use crate::http::Headers;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum DdnsUpdateError {
    // the update endpoint answered, but with a non-2xx status
    #[error("update endpoint returned HTTP {0}: {1}")]
    Status(u16, Box<str>),

    #[error("HTTP transport error: {0}")]
    TransportError(Box<str>),
}

/// The body of an update call: which record to point where.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RecordUpdate {
    pub zone_name: Box<str>,
    pub zone_dns_name: Box<str>,
    pub hostname: Box<str>,
    pub ip_address: Box<str>,
}

impl RecordUpdate {
    pub fn new(zone_name: &str, zone_dns_name: &str, hostname: &str, ip: Ipv4Addr) -> Self {
        Self {
            zone_name: zone_name.into(),
            zone_dns_name: zone_dns_name.into(),
            hostname: hostname.into(),
            ip_address: ip.to_string().into(),
        }
    }
}

pub trait DdnsService {
    /// Points the A record described by `record` at its new address.
    /// `headers` carries the credentials supplied by the identity provider.
    /// Returns `Ok` only once the endpoint has confirmed the change.
    fn update_record(&mut self, headers: &Headers, record: &RecordUpdate)
        -> Result<(), DdnsUpdateError>;
}

#[cfg(test)]
pub use recording::RecordingService;

#[cfg(test)]
mod recording {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{DdnsService, DdnsUpdateError, RecordUpdate};
    use crate::http::Headers;

    /// Remembers every call and answers with a configurable result.
    #[derive(Clone, Debug, Default)]
    pub struct RecordingService {
        calls: Rc<RefCell<Vec<(Headers, RecordUpdate)>>>,
        failure: Rc<RefCell<Option<DdnsUpdateError>>>,
    }

    impl RecordingService {
        pub fn fail_with(&self, error: Option<DdnsUpdateError>) {
            *self.failure.borrow_mut() = error;
        }

        pub fn calls(&self) -> Vec<(Headers, RecordUpdate)> {
            self.calls.borrow().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl DdnsService for RecordingService {
        fn update_record(
            &mut self,
            headers: &Headers,
            record: &RecordUpdate,
        ) -> Result<(), DdnsUpdateError> {
            self.calls
                .borrow_mut()
                .push((headers.clone(), record.clone()));

            match &*self.failure.borrow() {
                Some(error) => Err(error.clone()),
                None => Ok(()),
            }
        }
    }
}
