use serde_derive::{Deserialize, Serialize};

use crate::http::Headers;

use super::{DdnsService, DdnsUpdateError, RecordUpdate};

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {}

/// Dry run: reports what would have been sent and claims success.
pub struct Service {
    updates: usize,
}

impl From<Config> for Service {
    fn from(_: Config) -> Self {
        Self { updates: 0 }
    }
}

impl DdnsService for Service {
    fn update_record(
        &mut self,
        headers: &Headers,
        record: &RecordUpdate,
    ) -> Result<(), DdnsUpdateError> {
        self.updates += 1;

        log::info!(
            "dummy: simulating update #{} of {} in zone {} ({}) to {}",
            self.updates,
            record.hostname,
            record.zone_name,
            record.zone_dns_name,
            record.ip_address
        );

        // Never print credentials, only which headers would be sent.
        let names = headers
            .iter()
            .map(|(name, _)| &**name)
            .collect::<Vec<_>>();
        log::debug!("dummy: request headers {}", names.join(", "));

        Ok(())
    }
}
