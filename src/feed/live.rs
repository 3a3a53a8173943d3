use std::collections::HashSet;

use crate::types::{LogEvent, Millis};

use super::card::{Card, CardContext};
use super::grouping;
use super::render::{FeedItem, FeedView, RenderMode, Unresolved, collect_unresolved};

/// The last rendered head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub last_top_id: String,
    pub last_top_ts: Millis,
}

impl Cursor {
    fn of(event: &LogEvent) -> Self {
        Self {
            last_top_id: event.id.clone(),
            last_top_ts: event.timestamp,
        }
    }
}

/// Knobs for one append pass.
#[derive(Debug, Clone, Copy)]
pub struct AppendOptions {
    pub order_desc: bool,
    pub long_pause_ms: Millis,
    pub flash_ms: Millis,
}

#[derive(Debug, Default, PartialEq)]
pub struct AppendOutcome {
    pub inserted: usize,
    pub resume_marker: bool,
    pub unresolved: Unresolved,
}

/// Merge state carried between polls.
#[derive(Debug, Default)]
pub struct LiveState {
    cursor: Option<Cursor>,
    seen: HashSet<String>,
    last_insert_at: Option<Millis>,
}

impl LiveState {
    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn last_insert_at(&self) -> Option<Millis> {
        self.last_insert_at
    }

    /// Re-anchor after a full load. `events` is the loaded batch in display order.
    pub fn reset(&mut self, events: &[LogEvent], now: Millis) {
        self.seen = events.iter().map(|e| e.id.clone()).collect();
        self.cursor = events.first().map(Cursor::of);
        self.last_insert_at = Some(now);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Events from `head` not yet rendered, in display order.
    ///
    /// An event is new when its id has not been shown and its timestamp is on
    /// the head side of the cursor (`>=` descending, `<=` ascending).
    pub fn classify_new(&self, head: &[LogEvent], order_desc: bool) -> Vec<LogEvent> {
        let mut fresh: Vec<LogEvent> = Vec::new();
        for event in head {
            if self.seen.contains(&event.id) || fresh.iter().any(|e| e.id == event.id) {
                continue;
            }
            let on_head_side = match self.cursor {
                None => true,
                Some(ref c) if event.id == c.last_top_id => false,
                Some(ref c) if order_desc => event.timestamp >= c.last_top_ts,
                Some(ref c) => event.timestamp <= c.last_top_ts,
            };
            if on_head_side {
                fresh.push(event.clone());
            }
        }
        grouping::sort_events(&mut fresh, order_desc);
        fresh
    }
}

/// Prepend the new events of a polled `head` window to `view`.
///
/// Already-rendered items are never moved or removed. Grouped views are left
/// untouched: they need a full reload.
pub fn append_head(
    view: &mut FeedView,
    live: &mut LiveState,
    head: &[LogEvent],
    ctx: &CardContext<'_>,
    opts: AppendOptions,
) -> AppendOutcome {
    let mut outcome = AppendOutcome::default();
    if view.mode() == RenderMode::Grouped {
        return outcome;
    }
    let fresh = live.classify_new(head, opts.order_desc);
    if fresh.is_empty() {
        return outcome;
    }
    let now = ctx.now;

    let leading_day = match view.items.first() {
        Some(FeedItem::DateSeparator { label }) => Some(label.clone()),
        _ => None,
    };
    let top_card = view.items.iter().position(FeedItem::is_card);
    let resume = top_card.is_some()
        && live
            .last_insert_at
            .is_some_and(|last| now - last > opts.long_pause_ms);

    // Split the new cards into per-day runs, in display order.
    let mut runs: Vec<(String, Vec<FeedItem>)> = Vec::new();
    for event in &fresh {
        let mut card = Card::new(event.clone(), ctx);
        card.flash_until = Some(now + opts.flash_ms);
        collect_unresolved(&card, &mut outcome.unresolved);
        let day = card.day.clone();
        let item = FeedItem::Card(Box::new(card));
        match runs.last_mut() {
            Some((d, cards)) if *d == day => cards.push(item),
            _ => runs.push((day, vec![item])),
        }
    }

    // The run adjacent to the old head shares its separator when the day matches.
    let shares_leading = runs
        .last()
        .is_some_and(|(day, _)| leading_day.as_deref() == Some(day.as_str()));
    let mut below_separator = if shares_leading {
        runs.pop().map(|(_, cards)| cards).unwrap_or_default()
    } else {
        Vec::new()
    };
    if resume {
        below_separator.push(FeedItem::ResumeMarker { at: now });
    }
    let at = top_card.unwrap_or(view.items.len());
    view.items.splice(at..at, below_separator);

    let mut above = Vec::new();
    for (day, cards) in runs {
        above.push(FeedItem::DateSeparator { label: day });
        above.extend(cards);
    }
    view.items.splice(0..0, above);

    outcome.inserted = fresh.len();
    outcome.resume_marker = resume;
    view.window.prepend(fresh.len());
    live.cursor = fresh.first().map(Cursor::of);
    live.seen.extend(fresh.iter().map(|e| e.id.clone()));
    live.last_insert_at = Some(now);
    view.events.splice(0..0, fresh);
    outcome
}
