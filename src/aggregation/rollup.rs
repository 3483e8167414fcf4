//! Pure per-bucket rollup of scanned events into a `StatsRecord`

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::models::{BotCount, CountryCount, Event, EventType, Granularity, PageCount, StatsRecord};

use super::bucket::Bucket;

/// Top-N cap applied when none is configured
pub const DEFAULT_TOP_N: usize = 10;

/// Occurrence counter that remembers first-seen order.
///
/// Ranking is by count descending; equal counts keep the order in which
/// the keys were first seen.
pub struct RankedCounter<K> {
    index: HashMap<K, usize>,
    entries: Vec<(K, i64)>,
}

impl<K: Eq + Hash + Clone> RankedCounter<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, key: K) {
        match self.index.get(&key) {
            Some(&pos) => self.entries[pos].1 += 1,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, 1));
            }
        }
    }

    /// The `n` highest counts. `sort_by` is stable, so ties stay in
    /// first-seen order.
    pub fn top(mut self, n: usize) -> Vec<(K, i64)> {
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries.truncate(n);
        self.entries
    }
}

impl<K: Eq + Hash + Clone> Default for RankedCounter<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the record for one bucket from the events scanned for it.
///
/// `events` must be in scan order (timestamp, then id); events outside the
/// bucket are ignored.
pub fn rollup(
    tracking_id: &str,
    granularity: Granularity,
    bucket: Bucket,
    events: &[Event],
    top_n: usize,
) -> StatsRecord {
    let mut record = StatsRecord::empty(tracking_id, bucket.start, granularity);
    let mut sessions: HashSet<&str> = HashSet::new();
    let mut pages = RankedCounter::new();
    let mut bots = RankedCounter::new();
    let mut countries = RankedCounter::new();

    for event in events
        .iter()
        .filter(|e| e.tracking_id == tracking_id && bucket.contains(e.timestamp))
    {
        record.total_events += 1;
        sessions.insert(event.session_id.as_str());

        match event.event_type() {
            EventType::PageView => {
                record.page_views += 1;
                if let Some(url) = event.url.as_deref().filter(|u| !u.is_empty()) {
                    pages.add(url.to_string());
                }
            }
            EventType::AiBotDetected if event.is_detected_bot() => {
                record.ai_bots_detected += 1;
                if let Some(c) = &event.classification {
                    bots.add((
                        c.matched_name.clone().unwrap_or_default(),
                        c.description.clone().unwrap_or_default(),
                    ));
                }
            }
            _ => {}
        }

        if let Some(country) = event.geo.country.as_deref().filter(|c| !c.is_empty()) {
            countries.add(country.to_string());
        }
    }

    record.unique_sessions = sessions.len() as i64;
    record.top_pages = pages
        .top(top_n)
        .into_iter()
        .map(|(url, views)| PageCount { url, views })
        .collect();
    record.top_bots = bots
        .top(top_n)
        .into_iter()
        .map(|((name, description), count)| BotCount {
            name,
            description,
            count,
        })
        .collect();
    record.top_countries = countries
        .top(top_n)
        .into_iter()
        .map(|(country, count)| CountryCount { country, count })
        .collect();

    record
}
