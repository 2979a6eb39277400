use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

/// One remembered line of a conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub text: String,
    pub at: Instant,
    pub is_bot: bool,
    pub nickname: String,
}

/// History key for a private conversation with `user_id`.
pub fn pm_key(user_id: impl std::fmt::Display) -> String {
    user_id.to_string()
}

/// History key for a user's AI conversation inside a channel.
pub fn channel_user_key(
    channel_id: impl std::fmt::Display,
    user_id: impl std::fmt::Display,
) -> String {
    format!("{channel_id}:{user_id}")
}

/// History key for text the bot sent to a channel.
pub fn channel_key(channel_id: impl std::fmt::Display) -> String {
    format!("#{channel_id}")
}

struct Inner {
    retention: Duration,
    max_messages: usize,
    by_key: HashMap<String, VecDeque<HistoryEntry>>,
}

impl Inner {
    /// Drop entries older than the retention window. Entries are appended in
    /// time order, so expired ones sit at the front.
    fn prune(&mut self, key: &str, now: Instant) {
        let retention = self.retention;
        let Some(q) = self.by_key.get_mut(key) else {
            return;
        };
        let before = q.len();
        while q
            .front()
            .is_some_and(|e| now.saturating_duration_since(e.at) > retention)
        {
            q.pop_front();
        }
        if q.len() < before {
            tracing::debug!(key, removed = before - q.len(), "pruned context history");
        }
        if q.is_empty() {
            self.by_key.remove(key);
        }
    }
}

/// Bounded, time-pruned conversation memory used as AI context.
///
/// Shared between the session worker and presentation tasks, so it is the one
/// structure kept behind a mutex.
pub struct ContextHistory {
    inner: Mutex<Inner>,
}

impl ContextHistory {
    pub fn new(retention_minutes: u64, max_messages: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                retention: Duration::from_secs(retention_minutes.saturating_mul(60)),
                max_messages,
                by_key: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, key: &str, text: &str, nickname: &str, is_bot: bool) {
        self.add_at(key, text, nickname, is_bot, Instant::now());
    }

    pub fn add_at(&self, key: &str, text: &str, nickname: &str, is_bot: bool, now: Instant) {
        let mut inner = self.lock();
        if inner.max_messages == 0 {
            return;
        }
        let max = inner.max_messages;
        let q = inner.by_key.entry(key.to_string()).or_default();
        q.push_back(HistoryEntry {
            text: text.to_string(),
            at: now,
            is_bot,
            nickname: nickname.to_string(),
        });
        while q.len() > max {
            q.pop_front();
        }
        inner.prune(key, now);
    }

    /// Live entries for `key`, oldest first.
    pub fn get(&self, key: &str) -> Vec<HistoryEntry> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Vec<HistoryEntry> {
        let mut inner = self.lock();
        inner.prune(key, now);
        inner
            .by_key
            .get(key)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn retention_minutes(&self) -> u64 {
        self.lock().retention.as_secs() / 60
    }

    /// Change the retention window and prune every conversation against it.
    pub fn set_retention(&self, minutes: u64) {
        self.set_retention_at(minutes, Instant::now());
    }

    pub fn set_retention_at(&self, minutes: u64, now: Instant) {
        let mut inner = self.lock();
        inner.retention = Duration::from_secs(minutes.saturating_mul(60));
        let keys: Vec<String> = inner.by_key.keys().cloned().collect();
        for key in keys {
            inner.prune(&key, now);
        }
        tracing::info!(minutes, "context history retention updated");
    }

    /// Forget one conversation, or all of them.
    pub fn clear(&self, key: Option<&str>) {
        let mut inner = self.lock();
        match key {
            Some(k) => {
                inner.by_key.remove(k);
            }
            None => inner.by_key.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_never_exceeds_max() {
        let h = ContextHistory::new(60, 3);
        let t0 = Instant::now();
        for i in 0..10 {
            h.add_at("7", &format!("m{i}"), "alice", false, t0);
        }
        let got = h.get_at("7", t0);
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].text, "m7");
        assert_eq!(got[2].text, "m9");
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let h = ContextHistory::new(1, 10);
        let t0 = Instant::now();
        h.add_at("7", "old", "alice", false, t0);
        h.add_at("7", "new", "bot", true, t0 + Duration::from_secs(50));

        let got = h.get_at("7", t0 + Duration::from_secs(61));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].text, "new");
        assert!(got[0].is_bot);

        assert!(h.get_at("7", t0 + Duration::from_secs(200)).is_empty());
    }

    #[test]
    fn shrinking_retention_prunes_everything_stale() {
        let h = ContextHistory::new(60, 10);
        let t0 = Instant::now();
        h.add_at("1", "a", "x", false, t0);
        h.add_at("2:1", "b", "x", false, t0);
        h.set_retention_at(1, t0 + Duration::from_secs(120));
        assert_eq!(h.retention_minutes(), 1);
        assert!(h.get_at("1", t0 + Duration::from_secs(120)).is_empty());
        assert!(h.get_at("2:1", t0 + Duration::from_secs(120)).is_empty());
    }

    #[test]
    fn keys_are_independent_and_clearable() {
        let h = ContextHistory::new(60, 10);
        h.add(&pm_key(5), "hi", "eve", false);
        h.add(&channel_user_key(2, 5), "yo", "eve", false);
        assert_eq!(h.get("5").len(), 1);
        assert_eq!(h.get("2:5").len(), 1);

        h.clear(Some("5"));
        assert!(h.get("5").is_empty());
        assert_eq!(h.get("2:5").len(), 1);

        h.clear(None);
        assert!(h.get("2:5").is_empty());
    }
}
