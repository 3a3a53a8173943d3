use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::feed::card::Card;
use crate::feed::notify::Level;
use crate::feed::render::{FeedItem, FeedView, GroupHeader};
use crate::feed::session::FeedSession;
use crate::types::{ActionPlan, Millis, ModAction};
use crate::util;

/// Cells used by the recency bar at the start of each card row.
const BAR_CELLS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Normal,
    Dim,
    Header,
    Flash,
    Marker,
    Info,
    Error,
}

/// What a line selects when the cursor is on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Card(String),
    Group(String),
    Sentinel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub text: String,
    pub tone: Tone,
    pub target: Option<Target>,
}

impl Line {
    fn plain(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
            target: None,
        }
    }

    fn selectable(text: impl Into<String>, tone: Tone, target: Target) -> Self {
        Self {
            text: text.into(),
            tone,
            target: Some(target),
        }
    }
}

// ---------------------------------------------------------------------------
// Text helpers
// ---------------------------------------------------------------------------

/// Cut `s` to at most `width` display cells, ending in `…` when shortened.
pub fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_owned();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in s.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn recency_bar(fraction: f32, cells: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * cells as f32).round() as usize).min(cells);
    let mut bar = "█".repeat(filled);
    bar.push_str(&"·".repeat(cells - filled));
    bar
}

fn separator(label: &str, width: usize) -> String {
    let head = format!("── {label} ");
    let rest = width.saturating_sub(head.width());
    format!("{head}{}", "─".repeat(rest))
}

// ---------------------------------------------------------------------------
// Feed
// ---------------------------------------------------------------------------

fn card_lines(card: &Card, now: Millis, width: usize, out: &mut Vec<Line>) {
    let tone = if card.is_flashing(now) {
        Tone::Flash
    } else {
        Tone::Normal
    };
    let marker = if card.expanded { '▾' } else { '▸' };
    let head = format!(
        "{marker} {} {} {}",
        recency_bar(card.recency, BAR_CELLS),
        util::format_clock(card.timestamp()),
        card.summary()
    );
    out.push(Line::selectable(
        truncate(&head, width),
        tone,
        Target::Card(card.id().to_owned()),
    ));
    if !card.expanded {
        return;
    }

    let indent = |s: String| truncate(&format!("      {s}"), width);
    let detail = card.detail();
    if let Some(diff) = detail.diff {
        out.push(Line::plain(indent(format!("- {}", diff.before)), Tone::Error));
        out.push(Line::plain(indent(format!("+ {}", diff.after)), Tone::Info));
    }
    if let Some(content) = detail.content {
        out.push(Line::plain(indent(content), Tone::Dim));
    }
    for role in &detail.roles_added {
        out.push(Line::plain(indent(format!("+@{role}")), Tone::Info));
    }
    for role in &detail.roles_removed {
        out.push(Line::plain(indent(format!("-@{role}")), Tone::Error));
    }
    if let Some(reason) = detail.reason {
        out.push(Line::plain(indent(format!("reason: {reason}")), Tone::Dim));
    }
    for (key, value) in &detail.facts {
        out.push(Line::plain(indent(format!("{key}: {value}")), Tone::Dim));
    }
    for (i, action) in card.actions.iter().enumerate() {
        out.push(Line::plain(
            indent(format!("[{}] {}", i + 1, action.label())),
            Tone::Header,
        ));
    }
}

fn group_line(header: &GroupHeader, width: usize) -> Line {
    let marker = if header.collapsed { '▸' } else { '▾' };
    let pin = if header.pinned { " ★" } else { "" };
    let text = format!("{marker} {} ({}){pin}", header.title(), header.count);
    Line::selectable(
        truncate(&text, width),
        Tone::Header,
        Target::Group(header.key.clone()),
    )
}

/// Every line of the feed body, top to bottom.
pub fn feed_lines(view: &FeedView, now: Millis, width: usize) -> Vec<Line> {
    let mut out = Vec::with_capacity(view.items().len());
    for item in view.items() {
        match item {
            FeedItem::DateSeparator { label } => {
                out.push(Line::plain(separator(label, width), Tone::Dim));
            }
            FeedItem::Card(card) => card_lines(card, now, width, &mut out),
            FeedItem::ResumeMarker { at } => {
                let label = format!("resumed {}", util::format_clock(*at));
                out.push(Line::plain(separator(&label, width), Tone::Marker));
            }
            FeedItem::GroupHeader(header) => out.push(group_line(header, width)),
            FeedItem::Sentinel => out.push(Line::selectable(
                "… more events below",
                Tone::Dim,
                Target::Sentinel,
            )),
        }
    }
    if out.is_empty() {
        out.push(Line::plain("No events match the current filter.", Tone::Dim));
    }
    out
}

// ---------------------------------------------------------------------------
// Chrome
// ---------------------------------------------------------------------------

/// Top line: guild, mode flags, latency and summary counters.
pub fn status_line(session: &FeedSession, width: usize) -> Line {
    let filter = session.filter();
    let mut parts = vec![format!("guild {}", session.guild_id())];
    parts.push(if filter.stream { "stream" } else { "manual" }.to_owned());
    parts.push(if filter.order_desc { "newest first" } else { "oldest first" }.to_owned());
    if session.is_grouped() {
        parts.push("grouped".to_owned());
    }
    if session.prefs().prefs().always_dry_run {
        parts.push("dry-run".to_owned());
    }
    parts.push(format!("recency {}", session.recency().as_str()));
    if session.is_loading() {
        parts.push("loading…".to_owned());
    }
    if filter.show_latency {
        let latency = session.latency();
        if let Some(full) = latency.full {
            parts.push(format!("load {}", util::format_latency(full)));
        }
        if let Some(head) = latency.head {
            parts.push(format!("poll {}", util::format_latency(head)));
        }
    }
    if let Some(summary) = session.summary() {
        for (name, n) in summary.numeric_pairs() {
            parts.push(format!("{name}={n}"));
        }
    }
    Line::plain(truncate(&parts.join(" | "), width), Tone::Header)
}

pub fn toast_lines(session: &FeedSession, width: usize) -> Vec<Line> {
    session
        .toasts()
        .iter()
        .map(|t| {
            let tone = match t.level {
                Level::Info => Tone::Info,
                Level::Error => Tone::Error,
            };
            Line::plain(truncate(&t.text, width), tone)
        })
        .collect()
}

/// The confirmation surface for a dry-run plan.
pub fn plan_lines(action: &ModAction, plan: &ActionPlan, width: usize) -> Vec<Line> {
    let mut out = vec![
        Line::plain(truncate(&format!("Confirm: {}", action.label()), width), Tone::Header),
        Line::plain(truncate(&format!("  plan: {}", plan.describe()), width), Tone::Normal),
    ];
    for risk in &plan.risks {
        out.push(Line::plain(truncate(&format!("  ! {risk}"), width), Tone::Error));
    }
    out.push(Line::plain("  [y] apply  [n] cancel", Tone::Dim));
    out
}

pub const HELP: &str = "j/k move  space open  g group  o order  s stream  r refresh  \
                        p pin  w window  d dry-run  1-9 quick action  e export  q quit";
