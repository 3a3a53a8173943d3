use std::sync::mpsc::Sender;
use std::time::{Duration, SystemTime};

use crate::query::LogQuery;

use super::interface::{Event, Scope};

struct HeadPollEntry {
    scope: Scope,
    guild_id: String,
    query: LogQuery,
    interval: Duration,
    notify_tx: Sender<Event>,
    // Wall clock, so a suspend longer than the interval makes the poll due
    // on wake.
    last_poll: SystemTime,
}

/// Stream-mode head polling state for the engine.
///
/// Holds at most one registration: the feed currently on screen.
#[derive(Default)]
pub struct HeadPollScheduler {
    entry: Option<HeadPollEntry>,
}

impl HeadPollScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the head poll, replacing any existing one. The first poll
    /// fires one full interval after registration: the full load that
    /// precedes it is done on demand by the session.
    pub fn register(
        &mut self,
        scope: Scope,
        guild_id: String,
        query: LogQuery,
        interval: Duration,
        notify_tx: Sender<Event>,
    ) {
        self.register_at(scope, guild_id, query, interval, notify_tx, SystemTime::now());
    }

    fn register_at(
        &mut self,
        scope: Scope,
        guild_id: String,
        query: LogQuery,
        interval: Duration,
        notify_tx: Sender<Event>,
        now: SystemTime,
    ) {
        self.entry = Some(HeadPollEntry {
            scope,
            guild_id,
            query,
            interval: interval.max(Duration::from_secs(1)),
            notify_tx,
            last_poll: now,
        });
    }

    pub fn stop(&mut self) {
        self.entry = None;
    }

    pub fn is_registered(&self) -> bool {
        self.entry.is_some()
    }

    /// Return the poll to issue if its interval has elapsed, marking it as
    /// polled. A cancelled registration is dropped instead.
    pub fn due(&mut self) -> Option<DueHeadPoll> {
        self.due_at(SystemTime::now())
    }

    fn due_at(&mut self, now: SystemTime) -> Option<DueHeadPoll> {
        if self.entry.as_ref().is_some_and(|e| e.scope.is_cancelled()) {
            tracing::debug!("engine: dropping cancelled head poll");
            self.entry = None;
        }
        let entry = self.entry.as_mut()?;
        let elapsed = now
            .duration_since(entry.last_poll)
            .unwrap_or(Duration::ZERO);
        if elapsed < entry.interval {
            return None;
        }
        entry.last_poll = now;
        Some(DueHeadPoll {
            scope: entry.scope.clone(),
            guild_id: entry.guild_id.clone(),
            query: entry.query.clone(),
            notify_tx: entry.notify_tx.clone(),
        })
    }
}

/// A head poll that is due.
pub struct DueHeadPoll {
    pub scope: Scope,
    pub guild_id: String,
    pub query: LogQuery,
    pub notify_tx: Sender<Event>,
}
