use std::time::Duration;

use super::{Extractor, ExtractorError, SourceDef, DEFAULT_MAX_INACTIVE};

const DYNDNS_REGEX: &str =
    r"(?im)Current IP Address: (?P<ip>[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})";

fn plain(name: &str, url: &str, ttl: u64) -> SourceDef {
    SourceDef {
        name: name.into(),
        url: url.into(),
        ttl: Duration::from_secs(ttl),
        extractor: Extractor::Trim,
        max_inactive: DEFAULT_MAX_INACTIVE,
    }
}

/// The providers used when the configuration lists none.
pub fn builtin_sources() -> Result<Vec<SourceDef>, ExtractorError> {
    Ok(vec![
        plain("AWS", "https://checkip.amazonaws.com", 60),
        // Policies: https://help.dyn.com/remote-access-api/checkip-tool/
        SourceDef {
            name: "DynDNS".into(),
            url: "http://checkip.dyndns.org".into(),
            ttl: Duration::from_secs(600),
            extractor: Extractor::regex(DYNDNS_REGEX)?,
            max_inactive: DEFAULT_MAX_INACTIVE,
        },
        // Policy: https://www.wtfismyip.com/automation
        plain("WtfIsMyIP", "https://ipv4.wtfismyip.com/text", 60),
        plain("ICanHazIP", "https://ipv4.icanhazip.com", 60),
        plain("My-IP.io", "https://api4.my-ip.io/ip", 60),
    ])
}
