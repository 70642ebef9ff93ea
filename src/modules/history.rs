use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};

/// Maximum number of records kept in the history.
pub const HISTORY_CAPACITY: usize = 50;

/// Title used when the originating event carries none.
pub const DEFAULT_TITLE: &str = "Notification";

pub type Payload = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Milliseconds since the Unix epoch, stamped when the record is created.
    pub timestamp: i64,
    pub data: Option<Payload>,
}

impl NotificationRecord {
    pub fn new(
        id: impl Into<String>,
        title: Option<String>,
        body: Option<String>,
        data: Option<Payload>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            body: body.unwrap_or_default(),
            timestamp: now_millis(),
            data,
        }
    }

    pub fn age_label(&self, now_ms: i64) -> String {
        let diff = now_ms.saturating_sub(self.timestamp);
        if diff < 60_000 {
            "just now".to_string()
        } else if diff < 3_600_000 {
            format!("{} min ago", diff / 60_000)
        } else if diff < 86_400_000 {
            format!("{} h ago", diff / 3_600_000)
        } else {
            match Local.timestamp_millis_opt(self.timestamp).single() {
                Some(dt) => dt.format("%d.%m.%y %H:%M").to_string(),
                None => self.timestamp.to_string(),
            }
        }
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Newest-first list of records, never longer than its capacity.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    records: VecDeque<NotificationRecord>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            capacity: HISTORY_CAPACITY,
        }
    }

    pub fn insert(&mut self, record: NotificationRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to the process-wide history. Clones point at the same buffer.
#[derive(Debug, Clone, Default)]
pub struct NotificationHistory {
    inner: Arc<RwLock<HistoryBuffer>>,
}

impl NotificationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: NotificationRecord) {
        // Insert is push + truncate; a poisoned buffer is still consistent.
        let mut buffer = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        buffer.insert(record);
    }

    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> NotificationRecord {
        NotificationRecord::new(id, Some(format!("title {id}")), None, None)
    }

    fn ids(records: &[NotificationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn newest_record_is_first() {
        let mut buffer = HistoryBuffer::new();
        for id in ["1", "2", "3"] {
            buffer.insert(record(id));
        }
        assert_eq!(ids(&buffer.snapshot()), vec!["3", "2", "1"]);
    }

    #[test]
    fn insert_past_capacity_drops_oldest() {
        let mut buffer = HistoryBuffer::new();
        for i in 0..=50 {
            buffer.insert(record(&i.to_string()));
            assert!(buffer.len() <= HISTORY_CAPACITY);
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), 50);
        assert_eq!(snapshot[0].id, "50");
        assert_eq!(snapshot[49].id, "1");
        assert!(!snapshot.iter().any(|r| r.id == "0"));
    }

    #[test]
    fn snapshot_is_a_detached_copy() {
        let history = NotificationHistory::new();
        history.insert(record("a"));
        history.insert(record("b"));

        let mut first = history.snapshot();
        let second = history.snapshot();
        assert_eq!(first, second);

        first.clear();
        first.push(record("z"));
        assert_eq!(ids(&history.snapshot()), vec!["b", "a"]);

        history.insert(record("c"));
        history.clear();
        assert_eq!(ids(&second), vec!["b", "a"]);
    }

    #[test]
    fn clear_empties_and_is_idempotent() {
        let history = NotificationHistory::new();
        history.clear();
        assert!(history.is_empty());
        for id in ["x", "y"] {
            history.insert(record(id));
        }
        history.clear();
        history.clear();
        assert!(history.snapshot().is_empty());
        assert_eq!(history.len(), 0);
    }

    #[test]
    fn clones_share_one_buffer() {
        let history = NotificationHistory::new();
        let writer = history.clone();
        writer.insert(record("shared"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn missing_title_falls_back_to_placeholder() {
        let r = NotificationRecord::new("id", None, None, None);
        assert_eq!(r.title, DEFAULT_TITLE);
        assert_eq!(r.body, "");

        let r = NotificationRecord::new("id", Some(String::new()), Some("b".into()), None);
        assert_eq!(r.title, DEFAULT_TITLE);
        assert_eq!(r.body, "b");
    }

    #[test]
    fn age_labels() {
        let mut r = record("t");
        r.timestamp = 1_000_000_000_000;
        let at = |offset: i64| r.age_label(r.timestamp + offset);

        assert_eq!(at(0), "just now");
        assert_eq!(at(59_999), "just now");
        assert_eq!(at(60_000), "1 min ago");
        assert_eq!(at(59 * 60_000), "59 min ago");
        assert_eq!(at(3_600_000), "1 h ago");
        assert_eq!(at(23 * 3_600_000), "23 h ago");

        let expected = Local
            .timestamp_millis_opt(r.timestamp)
            .unwrap()
            .format("%d.%m.%y %H:%M")
            .to_string();
        assert_eq!(at(86_400_000), expected);
    }
}
