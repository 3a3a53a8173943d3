use std::collections::VecDeque;

use crate::types::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Error,
}

/// A transient, self-dismissing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: Level,
    pub text: String,
    pub expires_at: Millis,
}

/// Queue of visible toasts, oldest first.
#[derive(Debug, Default)]
pub struct Toasts {
    items: VecDeque<Toast>,
}

impl Toasts {
    pub fn push(&mut self, level: Level, text: impl Into<String>, now: Millis, ttl_ms: Millis) {
        self.items.push_back(Toast {
            level,
            text: text.into(),
            expires_at: now + ttl_ms,
        });
    }

    /// Drop expired toasts. Returns whether anything was removed.
    pub fn expire(&mut self, now: Millis) -> bool {
        let before = self.items.len();
        self.items.retain(|t| t.expires_at > now);
        self.items.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Toast> {
        self.items.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_expiry(&self) -> Option<Millis> {
        self.items.iter().map(|t| t.expires_at).min()
    }
}

/// Text of the live-append summary toast.
pub fn new_events_text(count: usize) -> String {
    if count == 1 {
        "1 new event".to_owned()
    } else {
        format!("{count} new events")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toasts_expire_after_ttl() {
        let mut toasts = Toasts::default();
        toasts.push(Level::Info, "3 new events", 1_000, 2_200);
        assert!(!toasts.expire(3_199));
        assert!(toasts.expire(3_200));
        assert!(toasts.is_empty());
    }

    #[test]
    fn summary_text_pluralizes() {
        assert_eq!(new_events_text(1), "1 new event");
        assert_eq!(new_events_text(4), "4 new events");
    }
}
