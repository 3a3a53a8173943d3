use chrono::{DateTime, TimeZone, Utc};

use crate::types::Millis;

/// Current wall-clock time in epoch millis.
///
/// Wall clock rather than a monotonic instant: idle gaps and recency must
/// include time the machine spent asleep.
pub fn now_ms() -> Millis {
    Utc::now().timestamp_millis()
}

pub(crate) fn to_datetime(ts: Millis) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

/// Day label used by date-group separators.
pub fn format_day(ts: Millis, date_format: &str) -> String {
    let fmt = if date_format.is_empty() {
        "%Y-%m-%d"
    } else {
        date_format
    };
    to_datetime(ts).format(fmt).to_string()
}

/// `HH:MM:SS` for card headers and resume markers.
pub fn format_clock(ts: Millis) -> String {
    to_datetime(ts).format("%H:%M:%S").to_string()
}

/// Format an age as relative time (e.g., `"2h"`, `"3d"`, `"1w"`).
pub fn format_relative(ts: Millis, now: Millis) -> String {
    let minutes = (now - ts) / 60_000;
    if minutes < 1 {
        return "now".to_owned();
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h");
    }

    let days = hours / 24;
    if days < 7 {
        return format!("{days}d");
    }
    if days < 30 {
        return format!("{}w", days / 7);
    }
    if days < 365 {
        return format!("{}mo", days / 30);
    }

    format!("{}y", days / 365)
}

/// Format a round-trip duration for the latency readout.
pub fn format_latency(d: std::time::Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Millis = 86_400_000;

    #[test]
    fn day_label_uses_format() {
        assert_eq!(format_day(0, "%Y-%m-%d"), "1970-01-01");
        assert_eq!(format_day(DAY + 5, ""), "1970-01-02");
        assert_eq!(format_day(0, "%d/%m"), "01/01");
    }

    #[test]
    fn clock_is_utc() {
        assert_eq!(format_clock(3_723_000), "01:02:03");
    }

    #[test]
    fn relative_buckets() {
        assert_eq!(format_relative(0, 30_000), "now");
        assert_eq!(format_relative(0, 5 * 60_000), "5m");
        assert_eq!(format_relative(0, 3 * 3_600_000), "3h");
        assert_eq!(format_relative(0, 2 * DAY), "2d");
        assert_eq!(format_relative(0, 14 * DAY), "2w");
        assert_eq!(format_relative(0, 400 * DAY), "1y");
    }

    #[test]
    fn latency_formatting() {
        assert_eq!(format_latency(std::time::Duration::from_millis(87)), "87ms");
        assert_eq!(format_latency(std::time::Duration::from_millis(1_540)), "1.5s");
    }
}
