//! Resume offsets and listening history over a string-keyed settings store.

use std::time::Duration;

use anyhow::Result;
use tracing::{error, warn};

const HISTORY_SUFFIX: &str = "--recent_episode";

pub trait SettingsStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

pub(crate) fn history_key(podcast_url: &str) -> String {
    format!("{podcast_url}{HISTORY_SUFFIX}")
}

pub(crate) fn position_key(podcast_url: &str, guid: &str) -> String {
    format!("{podcast_url}--{guid}")
}

/// Splits a stored key back into its podcast URL, returning `None` for
/// position keys.
pub(crate) fn podcast_of_history_key(key: &str) -> Option<&str> {
    key.strip_suffix(HISTORY_SUFFIX)
}

pub(crate) fn format_offset(offset: Duration) -> String {
    format!("{}.{:03}", offset.as_secs(), offset.subsec_millis())
}

pub(crate) fn parse_offset(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let (secs, frac) = match raw.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (raw, ""),
    };
    let secs = secs.parse::<u64>().ok()?;
    if frac.is_empty() {
        return Some(Duration::from_secs(secs));
    }
    if !frac.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    let millis = frac
        .chars()
        .chain(std::iter::repeat('0'))
        .take(3)
        .collect::<String>()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(secs) + Duration::from_millis(millis))
}

pub struct PlaybackLedger {
    store: Box<dyn SettingsStore>,
}

impl PlaybackLedger {
    pub fn new(store: Box<dyn SettingsStore>) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    pub fn get_position(&self, podcast_url: &str, guid: &str) -> Duration {
        let key = position_key(podcast_url, guid);
        match self.read(&key) {
            Some(raw) => parse_offset(&raw).unwrap_or_else(|| {
                warn!(%key, value = %raw, "ignoring malformed resume offset");
                Duration::ZERO
            }),
            None => Duration::ZERO,
        }
    }

    pub fn set_position(&mut self, podcast_url: &str, guid: &str, offset: Duration) {
        let key = position_key(podcast_url, guid);
        self.write(&key, &format_offset(offset));
    }

    pub fn get_last_episode(&self, podcast_url: &str) -> Option<String> {
        self.read(&history_key(podcast_url))
            .filter(|guid| !guid.is_empty())
    }

    pub fn set_last_episode(&mut self, podcast_url: &str, guid: &str) {
        let key = history_key(podcast_url);
        self.write(&key, guid);
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(err) => {
                error!(%key, "ledger read failed: {err:#}");
                None
            }
        }
    }

    fn write(&mut self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            error!(%key, "ledger write failed: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("disk unavailable"))
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("disk unavailable"))
        }
    }

    #[test]
    fn keys_follow_persisted_layout() {
        assert_eq!(
            history_key("https://feeds.example/show.xml"),
            "https://feeds.example/show.xml--recent_episode"
        );
        assert_eq!(
            position_key("https://feeds.example/show.xml", "ep-42"),
            "https://feeds.example/show.xml--ep-42"
        );
        assert_eq!(
            podcast_of_history_key("https://feeds.example/show.xml--recent_episode"),
            Some("https://feeds.example/show.xml")
        );
        assert_eq!(
            podcast_of_history_key("https://feeds.example/show.xml--ep-42"),
            None
        );
    }

    #[test]
    fn parse_offset_accepts_integer_and_fractional_seconds() {
        assert_eq!(parse_offset("125"), Some(Duration::from_secs(125)));
        assert_eq!(parse_offset("125.250"), Some(Duration::from_millis(125_250)));
        assert_eq!(parse_offset("3.5"), Some(Duration::from_millis(3_500)));
        assert_eq!(parse_offset(" 7.0004 "), Some(Duration::from_secs(7)));
        assert_eq!(parse_offset("-3"), None);
        assert_eq!(parse_offset("abc"), None);
        assert_eq!(parse_offset("1.x"), None);
    }

    #[test]
    fn position_defaults_to_zero_and_upserts() {
        let mut ledger = PlaybackLedger::in_memory();
        assert_eq!(ledger.get_position("feed", "ep"), Duration::ZERO);

        ledger.set_position("feed", "ep", Duration::from_millis(61_500));
        ledger.set_position("feed", "ep", Duration::from_millis(90_125));
        assert_eq!(ledger.get_position("feed", "ep"), Duration::from_millis(90_125));
        assert_eq!(ledger.get_position("feed", "other"), Duration::ZERO);
    }

    #[test]
    fn last_episode_is_scoped_per_podcast() {
        let mut ledger = PlaybackLedger::in_memory();
        assert_eq!(ledger.get_last_episode("feed-a"), None);

        ledger.set_last_episode("feed-a", "ep-1");
        ledger.set_last_episode("feed-b", "ep-9");
        ledger.set_last_episode("feed-a", "ep-2");

        assert_eq!(ledger.get_last_episode("feed-a").as_deref(), Some("ep-2"));
        assert_eq!(ledger.get_last_episode("feed-b").as_deref(), Some("ep-9"));
    }

    #[test]
    fn malformed_offset_reads_as_zero() {
        let mut store = MemoryStore::new();
        store
            .set(&position_key("feed", "ep"), "not-a-number")
            .expect("memory write");
        let ledger = PlaybackLedger::new(Box::new(store));
        assert_eq!(ledger.get_position("feed", "ep"), Duration::ZERO);
    }

    #[test]
    fn store_failures_yield_defaults() {
        let mut ledger = PlaybackLedger::new(Box::new(BrokenStore));
        ledger.set_position("feed", "ep", Duration::from_secs(5));
        ledger.set_last_episode("feed", "ep");
        assert_eq!(ledger.get_position("feed", "ep"), Duration::ZERO);
        assert_eq!(ledger.get_last_episode("feed"), None);
    }
}
