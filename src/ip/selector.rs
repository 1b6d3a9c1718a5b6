use std::net::Ipv4Addr;
use std::time::SystemTime;

use rand::Rng;

use crate::events::{Event, EventSink};

use super::{Fetch, IpSource, SourceDef};

/// Chooses where the round-robin rotation begins.
pub trait StartIndex {
    /// Returns an index in `0..len`. `len` is never zero.
    fn pick(&mut self, len: usize) -> usize;
}

/// Uniformly random start, so restarts don't always hit the same provider
/// first.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomStart;

impl StartIndex for RandomStart {
    fn pick(&mut self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

#[cfg(test)]
#[derive(Clone, Copy, Debug)]
pub struct FixedIndex(pub usize);

#[cfg(test)]
impl StartIndex for FixedIndex {
    fn pick(&mut self, len: usize) -> usize {
        self.0 % len
    }
}

/// The ordered set of IP sources, visited round-robin.
pub struct SourcePool {
    sources: Vec<IpSource>,
    cursor: Option<usize>,
    start: Box<dyn StartIndex>,
}

impl SourcePool {
    pub fn new(defs: Vec<SourceDef>, start: Box<dyn StartIndex>, now: SystemTime) -> Self {
        Self {
            sources: defs.into_iter().map(|def| IpSource::new(def, now)).collect(),
            cursor: None,
            start,
        }
    }

    pub fn sources(&self) -> &[IpSource] {
        &self.sources
    }

    pub fn enabled_count(&self) -> usize {
        self.sources.iter().filter(|s| s.enabled()).count()
    }

    fn next_eligible_index(&mut self, now: SystemTime) -> Option<usize> {
        let len = self.sources.len();
        if len == 0 {
            return None;
        }

        let cursor = match self.cursor {
            Some(cursor) => cursor,
            None => *self.cursor.insert(self.start.pick(len) % len),
        };

        let index = (0..len)
            .map(|offset| (cursor + offset) % len)
            .find(|&index| self.sources[index].is_eligible(now))?;

        self.cursor = Some((index + 1) % len);
        Some(index)
    }

    /// The next enabled source whose TTL has expired, continuing the
    /// rotation from wherever the previous call left off.
    pub fn next_eligible(&mut self, now: SystemTime) -> Option<&mut IpSource> {
        let index = self.next_eligible_index(now)?;
        Some(&mut self.sources[index])
    }

    /// Polls eligible sources in rotation until one yields an address. Each
    /// source is tried at most once per call.
    pub fn find_public_ip(
        &mut self,
        http: &dyn Fetch,
        events: &dyn EventSink,
        now: SystemTime,
    ) -> Option<Ipv4Addr> {
        let mut attempted = vec![false; self.sources.len()];
        let mut tries = 0;

        loop {
            let index = match self.next_eligible_index(now) {
                Some(index) if !attempted[index] => index,
                _ if tries == 0 => {
                    events.emit(Event::NoEligibleSource);
                    return None;
                }
                _ => {
                    events.emit(Event::AllSourcesFailed { attempted: tries });
                    return None;
                }
            };

            attempted[index] = true;
            tries += 1;

            if let Ok(ip) = self.sources[index].poll(http, events, now) {
                return Some(ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::events::RecordingSink;
    use crate::ip::{Extractor, FetchError, ScriptedFetcher};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn def(name: &str, ttl: u64) -> SourceDef {
        SourceDef {
            name: name.into(),
            url: format!("https://{}.example.net/", name.to_lowercase()).into(),
            ttl: Duration::from_secs(ttl),
            extractor: Extractor::Trim,
            max_inactive: Duration::from_secs(3600),
        }
    }

    fn pool(names: &[&str], ttl: u64, start: usize) -> SourcePool {
        let defs = names.iter().map(|name| def(name, ttl)).collect();
        SourcePool::new(defs, Box::new(FixedIndex(start)), at(0))
    }

    #[test]
    fn empty_pool() {
        let mut pool = pool(&[], 60, 0);
        assert!(pool.next_eligible(at(0)).is_none());

        let http = ScriptedFetcher::always(Ok("93.184.216.34"));
        let sink = RecordingSink::default();
        assert_eq!(pool.find_public_ip(&http, &sink, at(0)), None);
        assert_eq!(http.calls(), 0);
        assert!(sink.contains(|e| *e == Event::NoEligibleSource));
    }

    #[test]
    fn visits_every_source_before_repeating() {
        let names = ["A", "B", "C", "D"];

        for start in 0..names.len() {
            let mut pool = pool(&names, 0, start);
            let mut seen = Vec::new();

            for _ in 0..names.len() {
                let source = pool.next_eligible(at(0)).unwrap();
                seen.push(source.name().to_owned());
            }

            let mut sorted = seen.clone();
            sorted.sort();
            assert_eq!(sorted, ["A", "B", "C", "D"], "start index {}", start);
            assert_eq!(seen[0], names[start]);

            let again = pool.next_eligible(at(0)).unwrap();
            assert_eq!(again.name(), names[start]);
        }
    }

    #[test]
    fn skips_ineligible_sources() {
        let mut pool = pool(&["A", "B", "C"], 60, 0);
        let http = ScriptedFetcher::always(Ok("93.184.216.34"));
        let sink = RecordingSink::default();

        // A is polled and now waits for its TTL.
        pool.next_eligible(at(0)).unwrap().poll(&http, &sink, at(0)).unwrap();

        assert_eq!(pool.next_eligible(at(1)).unwrap().name(), "B");
        assert_eq!(pool.next_eligible(at(1)).unwrap().name(), "C");
        assert_eq!(pool.next_eligible(at(1)).unwrap().name(), "B");
    }

    #[test]
    fn nothing_eligible() {
        let mut pool = pool(&["A", "B"], 60, 1);
        let http = ScriptedFetcher::always(Ok("93.184.216.34"));
        let sink = RecordingSink::default();

        assert!(pool.find_public_ip(&http, &sink, at(0)).is_some());
        assert!(pool.find_public_ip(&http, &sink, at(0)).is_some());
        assert!(pool.find_public_ip(&http, &sink, at(1)).is_none());
        assert_eq!(http.calls(), 2);
        assert!(sink.contains(|e| *e == Event::NoEligibleSource));
        assert!(!sink.contains(|e| matches!(e, Event::AllSourcesFailed { .. })));
        assert_eq!(
            http.urls(),
            ["https://b.example.net/", "https://a.example.net/"]
        );
    }

    #[test]
    fn falls_through_failing_sources() {
        let mut pool = pool(&["A", "B", "C"], 60, 0);
        let http = ScriptedFetcher::new(vec![
            Err(FetchError::Status(429)),
            Ok(String::from("10.1.2.3")),
            Ok(String::from("93.184.216.34")),
        ]);
        let sink = RecordingSink::default();

        let ip = pool.find_public_ip(&http, &sink, at(0));
        assert_eq!(ip, Some(Ipv4Addr::new(93, 184, 216, 34)));
        assert_eq!(http.calls(), 3);
        assert_eq!(pool.sources()[0].consecutive_http_429_count(), 1);
        assert_eq!(pool.sources()[1].consecutive_error_count(), 1);
    }

    #[test]
    fn zero_ttl_failures_do_not_spin() {
        let mut pool = pool(&["A", "B"], 0, 0);
        let http = ScriptedFetcher::always(Err(FetchError::Transport("timed out".into())));
        let sink = RecordingSink::default();

        assert_eq!(pool.find_public_ip(&http, &sink, at(0)), None);
        assert_eq!(http.calls(), 2);
        assert!(sink.contains(|e| *e == Event::AllSourcesFailed { attempted: 2 }));
        assert!(!sink.contains(|e| *e == Event::NoEligibleSource));
    }

    #[test]
    fn disabled_sources_leave_rotation() {
        let defs = vec![
            SourceDef {
                max_inactive: Duration::from_secs(10),
                ..def("A", 0)
            },
            def("B", 0),
        ];
        let mut pool = SourcePool::new(defs, Box::new(FixedIndex(0)), at(0));
        let http = ScriptedFetcher::new(vec![
            Err(FetchError::Status(500)),
            Ok(String::from("93.184.216.34")),
        ]);
        let sink = RecordingSink::default();

        assert!(pool.find_public_ip(&http, &sink, at(20)).is_some());
        assert_eq!(pool.enabled_count(), 1);

        for _ in 0..4 {
            assert_eq!(pool.next_eligible(at(30)).unwrap().name(), "B");
        }
    }
}
