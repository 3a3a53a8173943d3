use std::fmt::Write as _;

use crate::feed::card::{Card, CardContext};
use crate::feed::render::FeedView;
use crate::types::LogEvent;
use crate::util;

/// Snapshot file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

/// Render `events` as a snapshot. Labels come from whatever the name cache
/// already holds; exporting never triggers a lookup.
pub fn export(
    events: &[LogEvent],
    format: ExportFormat,
    ctx: &CardContext<'_>,
) -> Result<String, serde_json::Error> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(events),
        ExportFormat::Csv => Ok(to_csv(&cards(events, ctx))),
        ExportFormat::Html => Ok(to_html(&cards(events, ctx), "Moderation feed")),
    }
}

/// Export one group of a grouped view. `None` when no group has that key.
pub fn export_group(
    view: &FeedView,
    key: &str,
    format: ExportFormat,
    ctx: &CardContext<'_>,
) -> Option<Result<String, serde_json::Error>> {
    let group = view.groups().iter().find(|g| g.key == key)?;
    Some(match format {
        ExportFormat::Html => Ok(to_html(
            &cards(&group.events, ctx),
            &format!("Moderation feed: {key}"),
        )),
        _ => export(&group.events, format, ctx),
    })
}

fn cards(events: &[LogEvent], ctx: &CardContext<'_>) -> Vec<Card> {
    events.iter().map(|e| Card::new(e.clone(), ctx)).collect()
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

const CSV_HEADER: &str = "id,timestamp,type,executor,subject,channel,reason";

fn to_csv(cards: &[Card]) -> String {
    let mut rows = vec![CSV_HEADER.to_owned()];
    for card in cards {
        let label = |slot: &Option<crate::feed::card::LabelSlot>| {
            slot.as_ref().map(|s| s.text.clone()).unwrap_or_default()
        };
        rows.push(
            [
                card.id().to_owned(),
                card.event.datetime().to_rfc3339(),
                card.event.type_name.clone(),
                label(&card.executor),
                label(&card.subject),
                label(&card.channel),
                card.reason
                    .as_ref()
                    .map(|r| r.text().to_owned())
                    .unwrap_or_default(),
            ]
            .iter()
            .map(|v| csv_escape(v))
            .collect::<Vec<_>>()
            .join(","),
        );
    }
    rows.join("\n")
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_owned()
    }
}

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

fn html_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn to_html(cards: &[Card], title: &str) -> String {
    let title = html_escape(title);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head><body>\n<h1>{title}</h1>"
    );
    let mut day: Option<&str> = None;
    for card in cards {
        if day != Some(card.day.as_str()) {
            let _ = writeln!(out, "<h2 class=\"day\">{}</h2>", html_escape(&card.day));
            day = Some(card.day.as_str());
        }
        let _ = write!(
            out,
            "<article id=\"log-{}\"><time>{}</time> {}",
            html_escape(card.id()),
            util::format_clock(card.timestamp()),
            html_escape(&card.summary()),
        );
        if let Some(ref reason) = card.reason {
            let _ = write!(out, "<p class=\"reason\">{}</p>", html_escape(reason.text()));
        }
        out.push_str("</article>\n");
    }
    out.push_str("</body></html>\n");
    out
}
