use std::cmp::Ordering;
use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::filter::FilterState;
use crate::types::{LogEvent, Millis};

/// Events of one responsible actor.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub key: String,
    /// Sorted by the active ordering.
    pub events: Vec<LogEvent>,
    /// Timestamp of the head of `events`.
    pub latest: Millis,
    pub pinned: bool,
}

impl Group {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Inputs of a grouping pass.
#[derive(Debug, Clone, Copy)]
pub struct GroupOptions<'a> {
    pub order_desc: bool,
    pub sort_by_volume: bool,
    pub pinned: &'a BTreeSet<String>,
    pub pin_order: &'a [String],
}

impl<'a> GroupOptions<'a> {
    pub fn from_filter(filter: &'a FilterState) -> Self {
        Self {
            order_desc: filter.order_desc,
            sort_by_volume: filter.group_sort_by_volume,
            pinned: &filter.pinned,
            pin_order: &filter.pin_order,
        }
    }
}

/// Sort `events` by timestamp in the active ordering. Stable, so ties keep
/// fetch order.
pub fn sort_events(events: &mut [LogEvent], order_desc: bool) {
    if order_desc {
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    } else {
        events.sort_by_key(|e| e.timestamp);
    }
}

fn by_latest(a: &Group, b: &Group, order_desc: bool) -> Ordering {
    if order_desc {
        b.latest.cmp(&a.latest)
    } else {
        a.latest.cmp(&b.latest)
    }
}

/// Partition `events` by responsible actor and order the groups.
///
/// Pinned groups come first, in `pin_order` where listed; pinned groups not in
/// the explicit order follow them. Unpinned groups keep the recency (or
/// volume) order.
pub fn group_events(events: &[LogEvent], opts: GroupOptions<'_>) -> Vec<Group> {
    let mut buckets: IndexMap<&str, Vec<LogEvent>> = IndexMap::new();
    for event in events {
        buckets
            .entry(event.group_key())
            .or_default()
            .push(event.clone());
    }

    let mut groups: Vec<Group> = buckets
        .into_iter()
        .map(|(key, mut events)| {
            sort_events(&mut events, opts.order_desc);
            Group {
                key: key.to_owned(),
                latest: events.first().map_or(0, |e| e.timestamp),
                pinned: opts.pinned.contains(key),
                events,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        if opts.sort_by_volume {
            b.len()
                .cmp(&a.len())
                .then_with(|| by_latest(a, b, opts.order_desc))
        } else {
            by_latest(a, b, opts.order_desc)
        }
    });

    let (mut pinned, unpinned): (Vec<Group>, Vec<Group>) =
        groups.into_iter().partition(|g| g.pinned);
    if !opts.pin_order.is_empty() {
        let rank = |g: &Group| {
            opts.pin_order
                .iter()
                .position(|k| *k == g.key)
                .unwrap_or(usize::MAX)
        };
        // Stable: unlisted pins keep their relative order at the end.
        pinned.sort_by_key(rank);
    }
    pinned.extend(unpinned);
    pinned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawLogEvent;

    fn ev(id: &str, executor: Option<&str>, user: Option<&str>, ts: Millis) -> LogEvent {
        let mut data = serde_json::Map::new();
        if let Some(e) = executor {
            data.insert("executorId".into(), e.into());
        }
        if let Some(u) = user {
            data.insert("userId".into(), u.into());
        }
        let raw: RawLogEvent = serde_json::from_value(serde_json::json!({
            "id": id, "timestamp": ts, "type": "mod_ban_add", "data": data
        }))
        .unwrap();
        LogEvent::try_from(raw).unwrap()
    }

    fn ids(group: &Group) -> Vec<&str> {
        group.events.iter().map(|e| e.id.as_str()).collect()
    }

    fn keys(groups: &[Group]) -> Vec<&str> {
        groups.iter().map(|g| g.key.as_str()).collect()
    }

    fn opts<'a>(
        order_desc: bool,
        pinned: &'a BTreeSet<String>,
        pin_order: &'a [String],
    ) -> GroupOptions<'a> {
        GroupOptions {
            order_desc,
            sort_by_volume: false,
            pinned,
            pin_order,
        }
    }

    fn sample() -> Vec<LogEvent> {
        vec![
            ev("1", Some("A"), None, 10),
            ev("2", Some("B"), None, 20),
            ev("3", Some("A"), None, 30),
        ]
    }

    #[test]
    fn grouping_by_moderator_orders_by_latest() {
        let none = BTreeSet::new();
        let groups = group_events(&sample(), opts(true, &none, &[]));
        assert_eq!(keys(&groups), vec!["A", "B"]);
        assert_eq!(ids(&groups[0]), vec!["3", "1"]);
        assert_eq!(groups[0].latest, 30);
        assert_eq!(groups[1].latest, 20);
    }

    #[test]
    fn ascending_order_applies_within_and_between_groups() {
        let none = BTreeSet::new();
        let groups = group_events(&sample(), opts(false, &none, &[]));
        assert_eq!(keys(&groups), vec!["A", "B"]);
        assert_eq!(ids(&groups[0]), vec!["1", "3"]);
        assert_eq!(groups[0].latest, 10);
    }

    #[test]
    fn key_falls_back_to_subject_then_system() {
        let events = vec![ev("1", None, Some("U9"), 5), ev("2", None, None, 6)];
        let none = BTreeSet::new();
        let groups = group_events(&events, opts(true, &none, &[]));
        assert_eq!(keys(&groups), vec!["system", "U9"]);
    }

    #[test]
    fn volume_sort_beats_recency() {
        let events = vec![
            ev("1", Some("A"), None, 10),
            ev("2", Some("A"), None, 11),
            ev("3", Some("B"), None, 50),
            ev("4", Some("C"), None, 40),
        ];
        let none = BTreeSet::new();
        let groups = group_events(
            &events,
            GroupOptions {
                sort_by_volume: true,
                ..opts(true, &none, &[])
            },
        );
        assert_eq!(keys(&groups), vec!["A", "B", "C"]);
    }

    #[test]
    fn explicit_pin_order_wins_over_recency() {
        let pinned: BTreeSet<String> = ["B".to_owned(), "A".to_owned()].into();
        let order = vec!["A".to_owned(), "B".to_owned()];
        let mut events = sample();
        events.push(ev("4", Some("B"), None, 99));
        events.push(ev("5", Some("C"), None, 100));
        let groups = group_events(&events, opts(true, &pinned, &order));
        assert_eq!(keys(&groups), vec!["A", "B", "C"]);
        assert!(groups[0].pinned && groups[1].pinned && !groups[2].pinned);
    }

    #[test]
    fn unlisted_pins_follow_listed_pins() {
        let pinned: BTreeSet<String> = ["A".to_owned(), "B".to_owned(), "C".to_owned()].into();
        let order = vec!["C".to_owned()];
        let events = vec![
            ev("1", Some("A"), None, 30),
            ev("2", Some("B"), None, 20),
            ev("3", Some("C"), None, 10),
            ev("4", Some("D"), None, 40),
        ];
        let groups = group_events(&events, opts(true, &pinned, &order));
        assert_eq!(keys(&groups), vec!["C", "A", "B", "D"]);
    }
}
