use std::collections::HashSet;
use std::ops::Range;

use crate::filter::FilterState;
use crate::types::{LogEvent, Millis, SYSTEM_GROUP};

use super::card::{Card, CardContext, LabelSlot};
use super::grouping::{self, Group, GroupOptions};
use super::names::NameKind;
use super::recency::RecencyWindow;

/// Fixed chunk size once a batch is too large to render in one pass.
pub const CHUNK_SIZE: usize = 150;

/// Largest batch rendered synchronously.
pub fn sync_threshold(per_page: u32) -> usize {
    400.max(6 * per_page as usize)
}

/// Ids left showing raw after a render pass, to be fed to the name resolver.
pub type Unresolved = Vec<(NameKind, String)>;

// ---------------------------------------------------------------------------
// Visible window
// ---------------------------------------------------------------------------

/// Which prefix of a loaded batch is materialized as cards.
///
/// Pure and independent of any output device: the driver reports that the
/// sentinel became visible, the window answers with the next slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VirtualWindow {
    total: usize,
    materialized: usize,
    chunked: bool,
}

impl VirtualWindow {
    pub fn new(total: usize, per_page: u32) -> Self {
        let chunked = total > sync_threshold(per_page);
        Self {
            total,
            materialized: if chunked { CHUNK_SIZE.min(total) } else { total },
            chunked,
        }
    }

    pub fn is_chunked(&self) -> bool {
        self.chunked
    }

    pub fn visible(&self) -> Range<usize> {
        0..self.materialized
    }

    pub fn has_more(&self) -> bool {
        self.materialized < self.total
    }

    /// Advance by one chunk. Returns the newly materialized slice.
    pub fn advance(&mut self) -> Option<Range<usize>> {
        if !self.has_more() {
            return None;
        }
        let start = self.materialized;
        self.materialized = (start + CHUNK_SIZE).min(self.total);
        Some(start..self.materialized)
    }

    /// `n` events were prepended at the head and are already materialized.
    pub fn prepend(&mut self, n: usize) {
        self.total += n;
        self.materialized += n;
    }
}

// ---------------------------------------------------------------------------
// Feed items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GroupHeader {
    pub key: String,
    /// `None` for the system bucket.
    pub label: Option<LabelSlot>,
    pub count: usize,
    pub pinned: bool,
    pub collapsed: bool,
}

impl GroupHeader {
    pub fn title(&self) -> &str {
        self.label.as_ref().map_or(SYSTEM_GROUP, |l| l.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    DateSeparator { label: String },
    Card(Box<Card>),
    /// Seam before the previous head after an idle gap.
    ResumeMarker { at: Millis },
    GroupHeader(GroupHeader),
    /// Placeholder after the last materialized chunk.
    Sentinel,
}

impl FeedItem {
    pub fn as_card(&self) -> Option<&Card> {
        match self {
            Self::Card(card) => Some(card),
            _ => None,
        }
    }

    pub fn is_card(&self) -> bool {
        matches!(self, Self::Card(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Full,
    Chunked,
    Grouped,
}

pub(crate) fn collect_unresolved(card: &Card, out: &mut Unresolved) {
    out.extend(card.unresolved().map(|(k, id)| (k, id.to_owned())));
}

/// Append cards for `events`, inserting a separator whenever the day changes.
fn push_cards(
    events: &[LogEvent],
    ctx: &CardContext<'_>,
    last_day: &mut Option<String>,
    items: &mut Vec<FeedItem>,
    unresolved: &mut Unresolved,
) {
    for event in events {
        let card = Card::new(event.clone(), ctx);
        if last_day.as_deref() != Some(card.day.as_str()) {
            items.push(FeedItem::DateSeparator {
                label: card.day.clone(),
            });
            *last_day = Some(card.day.clone());
        }
        collect_unresolved(&card, unresolved);
        items.push(FeedItem::Card(Box::new(card)));
    }
}

// ---------------------------------------------------------------------------
// Feed view
// ---------------------------------------------------------------------------

/// Rendered state of the feed.
#[derive(Debug, Default)]
pub struct FeedView {
    pub(crate) items: Vec<FeedItem>,
    /// Every loaded event in display order, materialized or not.
    pub(crate) events: Vec<LogEvent>,
    pub(crate) window: VirtualWindow,
    mode: RenderMode,
    groups: Vec<Group>,
    collapsed_groups: HashSet<String>,
    tail_day: Option<String>,
}

impl FeedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.items.iter().filter_map(FeedItem::as_card)
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards().find(|c| c.id() == id)
    }

    pub fn rendered_ids(&self) -> Vec<&str> {
        self.cards().map(Card::id).collect()
    }

    pub fn has_sentinel(&self) -> bool {
        matches!(self.items.last(), Some(FeedItem::Sentinel))
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.events.clear();
        self.groups.clear();
        self.window = VirtualWindow::default();
        self.tail_day = None;
        self.mode = RenderMode::Full;
    }

    /// Replace the feed with a freshly fetched batch.
    pub fn load(
        &mut self,
        events: Vec<LogEvent>,
        filter: &FilterState,
        ctx: &CardContext<'_>,
    ) -> Unresolved {
        self.events = events;
        self.rerender(filter, ctx)
    }

    /// Render the loaded batch again, e.g. after a pin or ordering change.
    pub fn rerender(&mut self, filter: &FilterState, ctx: &CardContext<'_>) -> Unresolved {
        grouping::sort_events(&mut self.events, filter.order_desc);
        self.items.clear();
        self.groups.clear();
        self.tail_day = None;
        if filter.group_by_mod {
            self.mode = RenderMode::Grouped;
            self.window = VirtualWindow::default();
            self.groups = grouping::group_events(&self.events, GroupOptions::from_filter(filter));
            return self.render_groups(ctx);
        }

        self.window = VirtualWindow::new(self.events.len(), filter.per_page);
        self.mode = if self.window.is_chunked() {
            RenderMode::Chunked
        } else {
            RenderMode::Full
        };
        let mut unresolved = Vec::new();
        let mut last_day = None;
        push_cards(
            &self.events[self.window.visible()],
            ctx,
            &mut last_day,
            &mut self.items,
            &mut unresolved,
        );
        self.tail_day = last_day;
        if self.window.has_more() {
            self.items.push(FeedItem::Sentinel);
        }
        unresolved
    }

    fn render_groups(&mut self, ctx: &CardContext<'_>) -> Unresolved {
        let mut unresolved = Vec::new();
        for group in &self.groups {
            let collapsed = self.collapsed_groups.contains(&group.key);
            let label = (group.key != SYSTEM_GROUP).then(|| {
                let embedded = group.events.iter().find_map(|e| {
                    if e.executor_id() == Some(group.key.as_str()) {
                        e.embedded_executor_label()
                    } else {
                        e.embedded_user_label()
                    }
                });
                LabelSlot::build(NameKind::Member, &group.key, embedded, ctx.names)
            });
            if let Some(ref slot) = label
                && !slot.resolved
            {
                unresolved.push((NameKind::Member, slot.id.clone()));
            }
            self.items.push(FeedItem::GroupHeader(GroupHeader {
                key: group.key.clone(),
                label,
                count: group.len(),
                pinned: group.pinned,
                collapsed,
            }));
            if !collapsed {
                let mut last_day = None;
                push_cards(&group.events, ctx, &mut last_day, &mut self.items, &mut unresolved);
            }
        }
        unresolved
    }

    /// Lazy continuation: the sentinel scrolled into view.
    pub fn on_sentinel_visible(&mut self, ctx: &CardContext<'_>) -> Unresolved {
        let mut unresolved = Vec::new();
        if self.mode != RenderMode::Chunked || !self.has_sentinel() {
            return unresolved;
        }
        let Some(range) = self.window.advance() else {
            return unresolved;
        };
        self.items.pop();
        let mut last_day = self.tail_day.take();
        push_cards(
            &self.events[range],
            ctx,
            &mut last_day,
            &mut self.items,
            &mut unresolved,
        );
        self.tail_day = last_day;
        if self.window.has_more() {
            self.items.push(FeedItem::Sentinel);
        }
        unresolved
    }

    pub fn toggle_card(&mut self, id: &str) -> bool {
        self.items
            .iter_mut()
            .find_map(|item| match item {
                FeedItem::Card(card) if card.id() == id => Some(card),
                _ => None,
            })
            .map(|card| {
                card.expanded = !card.expanded;
                card.expanded
            })
            .unwrap_or(false)
    }

    /// Collapse or expand one group. Returns ids to resolve for newly shown cards.
    pub fn toggle_group(&mut self, key: &str, ctx: &CardContext<'_>) -> Unresolved {
        if self.mode != RenderMode::Grouped {
            return Vec::new();
        }
        if !self.collapsed_groups.remove(key) {
            self.collapsed_groups.insert(key.to_owned());
        }
        self.items.clear();
        self.render_groups(ctx)
    }

    pub fn is_group_collapsed(&self, key: &str) -> bool {
        self.collapsed_groups.contains(key)
    }

    /// Patch resolved labels into every card and group header showing them.
    pub fn apply_labels(&mut self, kind: NameKind, labels: &[(String, String)]) -> usize {
        let mut patched = 0;
        for item in &mut self.items {
            match item {
                FeedItem::Card(card) => {
                    for (id, label) in labels {
                        patched += card.apply_label(kind, id, label);
                    }
                }
                FeedItem::GroupHeader(GroupHeader {
                    label: Some(slot), ..
                }) => {
                    for (id, label) in labels {
                        patched += usize::from(slot.apply(kind, id, label));
                    }
                }
                _ => {}
            }
        }
        patched
    }

    /// Drop expired highlights. Returns whether anything changed.
    pub fn clear_expired_flash(&mut self, now: Millis) -> bool {
        let mut changed = false;
        for item in &mut self.items {
            if let FeedItem::Card(card) = item
                && card.flash_until.is_some_and(|t| t <= now)
            {
                card.flash_until = None;
                changed = true;
            }
        }
        changed
    }

    pub fn next_flash_expiry(&self) -> Option<Millis> {
        self.cards().filter_map(|c| c.flash_until).min()
    }

    pub fn recompute_recency(&mut self, window: RecencyWindow, now: Millis) {
        for item in &mut self.items {
            if let FeedItem::Card(card) = item {
                card.recency = window.fraction(card.timestamp(), now);
            }
        }
    }
}
