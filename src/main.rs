mod auth;
mod config;
mod dns;
mod events;
mod http;
mod ip;
mod orchestrator;
mod services;
mod util;

use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use config::{Config, General};
use dns::HickoryResolver;
use events::{EventSink, LogSink};
use ip::{Fetch, HttpFetcher, RandomStart, SourcePool};
use orchestrator::{Reconciler, UpdateOutcome};

const CONFIG_PATHS: &[&str] = &[
    "./config.toml",
    #[cfg(target_family = "unix")]
    "/etc/dyndns-client/config.toml",
];

/// This stores config values specified inside the [general] section of
/// config.toml.
static GENERAL_CONFIG: OnceLock<General> = OnceLock::new();

fn check_curl_version() {
    #[cfg(feature = "curl")]
    {
        let num = curl::Version::get().version_num();
        let major = (num >> 16) & 0xFF;
        let minor = (num >> 8) & 0xFF;

        // As of writing, this is the oldest supported curl in Debian 10.
        // Not going to support anything older than that.
        if !(major > 7 || (major == 7 && minor >= 64)) {
            log::error!("System libcurl is too old! Minimum required: 7.64.0");
            std::process::exit(1);
        }

        if curl::Version::get().ssl_version().is_none() {
            log::error!("libcurl doesn't seem to have SSL support. Exiting.");
            std::process::exit(1);
        }
    }
}

/// An explicitly given path must be readable; the default locations are
/// tried in order.
fn read_config() -> Option<String> {
    if let Some(path) = std::env::args().nth(1) {
        return match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(e) => {
                log::error!("Unable to read config file {}, reason: {}", path, e);
                None
            }
        };
    }

    for path in CONFIG_PATHS {
        match fs::read_to_string(path) {
            Ok(text) => return Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => log::warn!("Unable to read config file {}, reason: {}", path, e),
        }
    }

    None
}

/// The program is single-threaded and nothing reads GENERAL_CONFIG before
/// main installs it, so the cell is normally empty here.
fn install_general_config(general: General) {
    if GENERAL_CONFIG.set(general).is_err() {
        log::warn!("General configuration was already installed, keeping the first one");
    }
}

fn write_pid_file(path: &Path) -> std::io::Result<()> {
    fs::write(path, std::process::id().to_string())
}

/// One pass of the driver: find the current address, then make sure the
/// record matches it. Returns whether the cycle succeeded.
fn run_cycle(
    pool: &mut SourcePool,
    reconciler: &mut Reconciler,
    fetcher: &dyn Fetch,
    events: &dyn EventSink,
) -> bool {
    log::info!("Checking for public IP changes");

    let Some(ip) = pool.find_public_ip(fetcher, events, SystemTime::now()) else {
        return false;
    };

    match reconciler.reconcile(ip, events, SystemTime::now()) {
        Ok(UpdateOutcome::Unchanged) | Ok(UpdateOutcome::Updated { .. }) => true,
        Ok(UpdateOutcome::UpdateFailed(_)) => false,
        Err(e) => {
            log::error!("{}", e);
            false
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    check_curl_version();

    let Some(config_str) = read_config() else {
        log::error!("No configuration found. Quitting.");
        std::process::exit(1);
    };

    let config = match Config::parse(&config_str) {
        Ok(conf) => conf,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let update_rate = config.general.update_rate;
    let timeout = Duration::from_secs(config.general.timeout.get() as u64);

    if let Some(path) = &config.general.pid_file {
        if let Err(e) = write_pid_file(path) {
            log::error!("Unable to write PID file {}, reason: {}", path.display(), e);
            std::process::exit(1);
        }
    }

    install_general_config(config.general.clone());

    // Both were checked by Config::parse already.
    let (defs, nameservers) = match (config.source_defs(), config.nameservers()) {
        (Ok(defs), Ok(ns)) => (defs, ns),
        (Err(e), _) | (_, Err(e)) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let resolver = match HickoryResolver::new(&nameservers, timeout) {
        Ok(r) => r,
        Err(e) => {
            log::error!("Unable to set up the DNS resolver, reason: {}", e);
            std::process::exit(1);
        }
    };

    let identity = match config.update.identity() {
        Ok(id) => id,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let zone = config.zone();
    let cache_ttl = config.cache_ttl();
    let service = config.update.into_boxed();

    let mut reconciler = Reconciler::new(zone, cache_ttl, Box::new(resolver), identity, service);
    let mut pool = SourcePool::new(defs, Box::new(RandomStart), SystemTime::now());

    log::info!(
        "dyndns-client v{} started, {} IP source(s), updating every {} second(s)",
        env!("CARGO_PKG_VERSION"),
        pool.sources().len(),
        update_rate.map(u32::from).unwrap_or(0)
    );

    for source in pool.sources() {
        log::debug!(
            "IP source {} at {}, polled at most every {} second(s)",
            source.name(),
            source.url(),
            source.ttl().as_secs()
        );
    }

    loop {
        if run_cycle(&mut pool, &mut reconciler, &HttpFetcher, &LogSink) {
            log::info!("Successfully checked for public IP changes and made DNS updates if needed");
        } else {
            log::error!("Failed to check for public IP changes and/or perform the DNS update");
        }

        if pool.enabled_count() == 0 {
            log::error!("Every IP source has been disabled. Quitting.");
            std::process::exit(1);
        }

        if let Some(sleep_for) = &update_rate {
            log::info!("Sleeping for {} second(s)", sleep_for);
            std::thread::sleep(Duration::from_secs(sleep_for.get() as u64));
        } else {
            break; // 0 update rate makes this a fire-once program.
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::auth::Anonymous;
    use crate::dns::StaticResolver;
    use crate::events::{Event, RecordingSink};
    use crate::ip::{Extractor, FetchError, FixedIndex, ScriptedFetcher, SourceDef};
    use crate::orchestrator::Zone;
    use crate::services::RecordingService;

    fn setup(published: &[Ipv4Addr]) -> (SourcePool, Reconciler, RecordingService) {
        let defs = ["a", "b"]
            .iter()
            .map(|name| SourceDef {
                name: (*name).into(),
                url: format!("https://{}.example.net/", name).into(),
                ttl: Duration::ZERO,
                extractor: Extractor::Trim,
                max_inactive: ip::DEFAULT_MAX_INACTIVE,
            })
            .collect();
        let pool = SourcePool::new(defs, Box::new(FixedIndex(0)), SystemTime::now());

        let service = RecordingService::default();
        let zone = Zone {
            zone_name: "domain-com".into(),
            zone_dns_name: "domain.com.".into(),
            hostname: "home.domain.com".into(),
        };
        let reconciler = Reconciler::new(
            zone,
            Duration::from_secs(300),
            Box::new(StaticResolver::answering(published)),
            Box::new(Anonymous),
            Box::new(service.clone()),
        );

        (pool, reconciler, service)
    }

    #[test]
    fn cycle_publishes_new_address() {
        let (mut pool, mut reconciler, service) = setup(&[Ipv4Addr::new(93, 184, 216, 34)]);
        let http = ScriptedFetcher::new(vec![
            Err(FetchError::Transport("connection refused".into())),
            Ok(String::from("93.184.216.35\n")),
        ]);
        let sink = RecordingSink::default();

        assert!(run_cycle(&mut pool, &mut reconciler, &http, &sink));
        assert_eq!(service.call_count(), 1);
        assert_eq!(&*service.calls()[0].1.ip_address, "93.184.216.35");

        assert!(run_cycle(&mut pool, &mut reconciler, &http, &sink));
        assert_eq!(service.call_count(), 1);
        assert!(sink.contains(|e| matches!(e, Event::IpUnchanged { .. })));
    }

    #[test]
    fn general_config_is_installed_once() {
        install_general_config(General::default());
        install_general_config(General {
            user_agent: "something-else".into(),
            ..General::default()
        });

        assert_eq!(GENERAL_CONFIG.get(), Some(&General::default()));
    }

    #[test]
    fn cycle_fails_without_address() {
        let (mut pool, mut reconciler, service) = setup(&[]);
        let http = ScriptedFetcher::always(Ok("not an address"));
        let sink = RecordingSink::default();

        assert!(!run_cycle(&mut pool, &mut reconciler, &http, &sink));
        assert_eq!(http.calls(), 2);
        assert_eq!(service.call_count(), 0);
    }
}
