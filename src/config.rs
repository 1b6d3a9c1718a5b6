use std::env;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::{
    Anonymous, AuthError, CachedIdentity, IdentityProvider, MetadataServer, ServiceAccount,
};
use crate::ip::{builtin_sources, Extractor, ExtractorError, SourceDef};
use crate::orchestrator::Zone;
use crate::services::*;
use crate::util::{one_or_more_string, parse_number_into_optional_nonzero};

const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to parse the configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("source {0}: {1}")]
    Extractor(Box<str>, ExtractorError),

    #[error("{0:?} is not a valid nameserver address")]
    Nameserver(Box<str>),

    #[error("no IP sources are configured")]
    NoSources,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct General {
    #[serde(
        default = "default_update_rate",
        deserialize_with = "parse_number_into_optional_nonzero"
    )]
    pub update_rate: Option<NonZeroU32>,
    #[serde(default = "default_timeout")]
    pub timeout: NonZeroU32,
    #[serde(default = "default_user_agent")]
    pub user_agent: Box<str>,
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            update_rate: default_update_rate(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
            pid_file: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Dns {
    pub zone_name: Box<str>,
    pub zone_dns_name: Box<str>,
    pub hostname: Box<str>,
    /// Seconds for which the published address is trusted before the
    /// record is looked up again.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    #[serde(default = "default_nameservers", deserialize_with = "one_or_more_string")]
    pub nameservers: Vec<Box<str>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "service")]
#[serde(rename_all = "kebab-case")]
pub enum UpdateConfig {
    CloudFunction(cloud_function::Config),
    Dummy(dummy::Config),
}

impl UpdateConfig {
    pub fn into_boxed(self) -> Box<dyn DdnsService> {
        match self {
            UpdateConfig::CloudFunction(cf) => Box::new(cloud_function::Service::from(cf)),

            UpdateConfig::Dummy(dm) => Box::new(dummy::Service::from(dm)),
        }
    }

    /// The credentials the update endpoint expects. A key file named in the
    /// config wins over `GOOGLE_APPLICATION_CREDENTIALS`; without either the
    /// metadata server is asked.
    pub fn identity(&self) -> Result<Box<dyn IdentityProvider>, AuthError> {
        let cf = match self {
            UpdateConfig::CloudFunction(cf) => cf,
            UpdateConfig::Dummy(_) => return Ok(Box::new(Anonymous)),
        };

        let key_file = cf
            .credentials
            .clone()
            .or_else(|| env::var_os(CREDENTIALS_ENV).map(PathBuf::from));

        match key_file {
            Some(path) => {
                let account = ServiceAccount::from_file(&path)?;
                log::info!(
                    "using service account {} from {}",
                    account.client_email(),
                    path.display()
                );
                Ok(Box::new(CachedIdentity::new(account, cf.url.clone())))
            }

            None => {
                log::info!("no service account key configured, using the metadata server");
                Ok(Box::new(CachedIdentity::new(MetadataServer, cf.url.clone())))
            }
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExtractConfig {
    #[default]
    Trim,
    Regex(Box<str>),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: Box<str>,
    pub url: Box<str>,
    /// Minimum number of seconds between two polls of this source.
    pub ttl: u64,
    #[serde(default = "default_max_inactive")]
    pub max_inactive: u64,
    #[serde(default)]
    pub extract: ExtractConfig,
}

impl SourceConfig {
    fn to_def(&self) -> Result<SourceDef, ConfigError> {
        let extractor = match &self.extract {
            ExtractConfig::Trim => Extractor::Trim,
            ExtractConfig::Regex(pattern) => Extractor::regex(pattern)
                .map_err(|e| ConfigError::Extractor(self.name.clone(), e))?,
        };

        Ok(SourceDef {
            name: self.name.clone(),
            url: self.url.clone(),
            ttl: Duration::from_secs(self.ttl),
            extractor,
            max_inactive: Duration::from_secs(self.max_inactive),
        })
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub general: General,
    pub dns: Dns,
    pub update: UpdateConfig,
    /// `None` selects the builtin sources.
    #[serde(default, rename = "source")]
    pub sources: Option<Vec<SourceConfig>>,
}

fn non_empty(value: &str, field: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Empty(field))
    } else {
        Ok(())
    }
}

impl Config {
    /// Parses and validates a configuration file's contents.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config = toml::from_str::<Config>(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty(&self.dns.zone_name, "dns.zone_name")?;
        non_empty(&self.dns.zone_dns_name, "dns.zone_dns_name")?;
        non_empty(&self.dns.hostname, "dns.hostname")?;

        if let UpdateConfig::CloudFunction(cf) = &self.update {
            non_empty(&cf.url, "update.url")?;
        }

        if self.nameservers()?.is_empty() {
            return Err(ConfigError::Empty("dns.nameservers"));
        }

        if let Some(sources) = &self.sources {
            for source in sources {
                non_empty(&source.name, "source.name")?;
                non_empty(&source.url, "source.url")?;
            }
        }

        if self.source_defs()?.is_empty() {
            return Err(ConfigError::NoSources);
        }

        Ok(())
    }

    pub fn nameservers(&self) -> Result<Vec<IpAddr>, ConfigError> {
        self.dns
            .nameservers
            .iter()
            .map(|ns| {
                ns.trim()
                    .parse::<IpAddr>()
                    .map_err(|_| ConfigError::Nameserver(ns.clone()))
            })
            .collect()
    }

    pub fn source_defs(&self) -> Result<Vec<SourceDef>, ConfigError> {
        match &self.sources {
            Some(sources) => sources.iter().map(SourceConfig::to_def).collect(),
            None => builtin_sources().map_err(|e| ConfigError::Extractor("builtin".into(), e)),
        }
    }

    pub fn zone(&self) -> Zone {
        Zone {
            zone_name: self.dns.zone_name.clone(),
            zone_dns_name: self.dns.zone_dns_name.clone(),
            hostname: self.dns.hostname.clone(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.dns.cache_ttl)
    }
}

pub fn default_user_agent() -> Box<str> {
    concat!("dyndns-client/", env!("CARGO_PKG_VERSION")).into()
}

fn default_update_rate() -> Option<NonZeroU32> {
    NonZeroU32::new(300)
}

fn default_timeout() -> NonZeroU32 {
    // 5 seconds
    NonZeroU32::MIN.saturating_add(4)
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_nameservers() -> Vec<Box<str>> {
    vec!["1.1.1.1".into(), "8.8.8.8".into()]
}

fn default_max_inactive() -> u64 {
    crate::ip::DEFAULT_MAX_INACTIVE.as_secs()
}
