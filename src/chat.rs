//! Per-meeting chat log.
//!
//! Append-only, insertion-ordered, keyed by meeting id. The log outlives any
//! single room: a meeting that empties and is later rejoined still replays
//! its history. Bounded per meeting; the oldest entry is evicted at the cap.

use crate::protocol::{ChatMessage, UserInfo};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub struct ChatLog {
    logs: DashMap<String, VecDeque<ChatMessage>>,
    history_limit: usize,
}

impl ChatLog {
    pub fn new(history_limit: usize) -> Self {
        Self {
            logs: DashMap::new(),
            history_limit,
        }
    }

    /// Stamp, store and return the message. Callers broadcast the returned
    /// value so live delivery and history carry the same timestamp.
    pub fn append(&self, meeting_id: &str, user: UserInfo, text: String) -> ChatMessage {
        let message = ChatMessage {
            user,
            text,
            timestamp: now_millis(),
        };
        let mut log = self.logs.entry(meeting_id.to_string()).or_default();
        if log.len() >= self.history_limit {
            log.pop_front();
        }
        log.push_back(message.clone());
        message
    }

    /// All messages for a meeting in insertion order.
    pub fn history(&self, meeting_id: &str) -> Vec<ChatMessage> {
        self.logs
            .get(meeting_id)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserInfo {
        UserInfo {
            id: format!("u-{name}"),
            name: name.to_string(),
        }
    }

    #[test]
    fn history_preserves_insertion_order() {
        let log = ChatLog::new(100);
        log.append("m1", user("a"), "one".into());
        log.append("m1", user("b"), "two".into());
        log.append("m2", user("a"), "elsewhere".into());

        let history: Vec<String> = log
            .history("m1")
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(history, vec!["one", "two"]);
        assert_eq!(log.history("m2").len(), 1);
        assert!(log.history("missing").is_empty());
    }

    #[test]
    fn timestamps_are_monotone_nondecreasing() {
        let log = ChatLog::new(100);
        let first = log.append("m1", user("a"), "one".into());
        let second = log.append("m1", user("a"), "two".into());
        assert!(second.timestamp >= first.timestamp);
    }

    #[test]
    fn cap_evicts_oldest() {
        let log = ChatLog::new(2);
        log.append("m1", user("a"), "one".into());
        log.append("m1", user("a"), "two".into());
        log.append("m1", user("a"), "three".into());

        let history: Vec<String> = log
            .history("m1")
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(history, vec!["two", "three"]);
    }
}
