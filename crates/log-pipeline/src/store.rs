//! Bounded replay buffer.
//!
//! [`EventStore`] keeps recent [`DisplayEvent`]s in arrival order so a late
//! dashboard can fetch history before attaching to the live stream.
//!
//! # Eviction
//! Runs under the write lock on every [`EventStore::add`]:
//! 1. drop entries older than `max_age` (by effective time) relative to now
//! 2. keep only the newest `max_events` entries
//!
//! A zero bound disables that step.

use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tailhub_core::config::StoreConfig;
use tailhub_core::metrics as m;

use crate::event::DisplayEvent;

/// Single-writer / multi-reader replay buffer.
#[derive(Debug)]
pub struct EventStore {
    events: RwLock<VecDeque<DisplayEvent>>,
    max_age: Duration,
    max_events: usize,
}

impl EventStore {
    pub fn new(max_age: Duration, max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_age,
            max_events,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(Duration::from_secs(config.max_age_secs), config.max_events)
    }

    /// Appends `event` and applies eviction atomically with the append.
    pub fn add(&self, event: DisplayEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.push_back(event);
        self.prune(&mut events, Utc::now());
        metrics::gauge!(m::STORE_EVENTS).set(events.len() as f64);
    }

    /// Entries in arrival order, filtered by source and lower time bound.
    ///
    /// An empty `sources` slice means every source; source names compare
    /// case-insensitively.
    pub fn query(&self, sources: &[String], since: Option<DateTime<Utc>>) -> Vec<DisplayEvent> {
        let allowed: Vec<String> = sources
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .collect();

        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        events
            .iter()
            .filter(|event| since.is_none_or(|since| event.effective_time() >= since))
            .filter(|event| {
                allowed.is_empty() || allowed.iter().any(|s| event.source.eq_ignore_ascii_case(s))
            })
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn prune(&self, events: &mut VecDeque<DisplayEvent>, now: DateTime<Utc>) {
        if !self.max_age.is_zero()
            && let Ok(max_age) = TimeDelta::from_std(self.max_age)
            && let Some(cutoff) = now.checked_sub_signed(max_age)
        {
            events.retain(|event| event.effective_time() >= cutoff);
        }

        if self.max_events > 0 && events.len() > self.max_events {
            let excess = events.len() - self.max_events;
            events.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn event(source: &str, message: &str, ts: Option<DateTime<Utc>>) -> DisplayEvent {
        DisplayEvent {
            timestamp: ts,
            received_at: Utc::now(),
            severity: "info".to_owned(),
            message: message.to_owned(),
            source: source.to_owned(),
            format: "json".to_owned(),
            fields: BTreeMap::new(),
            raw: message.to_owned(),
        }
    }

    fn messages(events: &[DisplayEvent]) -> Vec<&str> {
        events.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn max_events_keeps_most_recent_in_order() {
        let store = EventStore::new(Duration::ZERO, 3);
        for i in 0..5 {
            store.add(event("app", &format!("m{i}"), None));
        }
        let all = store.query(&[], None);
        assert_eq!(messages(&all), vec!["m2", "m3", "m4"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn since_filter_is_inclusive() {
        let store = EventStore::new(Duration::ZERO, 0);
        let now = Utc::now();
        let t1 = now - TimeDelta::minutes(3);
        let t2 = now - TimeDelta::minutes(2);
        let t3 = now - TimeDelta::minutes(1);
        store.add(event("app", "t1", Some(t1)));
        store.add(event("app", "t2", Some(t2)));
        store.add(event("app", "t3", Some(t3)));

        assert_eq!(messages(&store.query(&[], Some(t2))), vec!["t2", "t3"]);
    }

    #[test]
    fn max_age_evicts_old_entries() {
        let store = EventStore::new(Duration::from_secs(60), 0);
        store.add(event("app", "stale", Some(Utc::now() - TimeDelta::hours(1))));
        store.add(event("app", "fresh", Some(Utc::now())));
        assert_eq!(messages(&store.query(&[], None)), vec!["fresh"]);
    }

    #[test]
    fn unknown_timestamp_ages_by_arrival() {
        let store = EventStore::new(Duration::from_secs(60), 0);
        store.add(event("app", "no-ts", None));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn source_filter_ignores_case_and_blanks() {
        let store = EventStore::new(Duration::ZERO, 0);
        store.add(event("app", "a", None));
        store.add(event("nginx", "n", None));
        store.add(event("system", "s", None));

        let picked = store.query(&["NGINX".to_owned(), " ".to_owned(), "app".to_owned()], None);
        assert_eq!(messages(&picked), vec!["a", "n"]);

        let blank_only = store.query(&[String::new()], None);
        assert_eq!(blank_only.len(), 3);
    }

    #[test]
    fn concurrent_readers_and_writer() {
        let store = Arc::new(EventStore::new(Duration::ZERO, 100));
        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 0..500 {
                    store.add(event("app", &format!("m{i}"), None));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        assert!(store.query(&[], None).len() <= 100);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(store.len(), 100);
    }
}
