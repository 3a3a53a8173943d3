use crate::actions::quick;
use crate::types::{EventKind, EventPayload, LogEvent, Millis, ModAction, is_snowflake};
use crate::util;

use super::names::{NameKind, NameResolver};
use super::recency::RecencyWindow;

/// Inputs shared by every card built in one render pass.
pub struct CardContext<'a> {
    pub names: &'a NameResolver,
    pub date_format: &'a str,
    pub recency: RecencyWindow,
    pub now: Millis,
}

// ---------------------------------------------------------------------------
// Label slots
// ---------------------------------------------------------------------------

/// A label position on a card that shows the raw id until a name is known.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelSlot {
    pub kind: NameKind,
    pub id: String,
    pub text: String,
    pub resolved: bool,
}

impl LabelSlot {
    pub(crate) fn build(
        kind: NameKind,
        id: &str,
        embedded: Option<String>,
        names: &NameResolver,
    ) -> Self {
        if let Some(label) = embedded {
            names.seed(kind, id, label.clone());
            return Self::resolved(kind, id, label);
        }
        match names.label(kind, id) {
            Some(label) => Self::resolved(kind, id, label),
            None => Self {
                kind,
                id: id.to_owned(),
                text: id.to_owned(),
                resolved: false,
            },
        }
    }

    fn resolved(kind: NameKind, id: &str, label: String) -> Self {
        Self {
            kind,
            id: id.to_owned(),
            text: label,
            resolved: true,
        }
    }

    /// Rewrite the text in place if this slot shows `id`.
    pub(crate) fn apply(&mut self, kind: NameKind, id: &str, label: &str) -> bool {
        if self.kind != kind || self.id != id || (self.resolved && self.text == label) {
            return false;
        }
        label.clone_into(&mut self.text);
        self.resolved = true;
        true
    }
}

/// Reason text, which the backend sometimes sends as a bare user id.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Text(String),
    Member(LabelSlot),
}

impl Reason {
    pub fn text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Member(slot) => &slot.text,
        }
    }
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// One rendered event.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub event: LogEvent,
    pub day: String,
    pub executor: Option<LabelSlot>,
    pub subject: Option<LabelSlot>,
    pub channel: Option<LabelSlot>,
    pub reason: Option<Reason>,
    pub expanded: bool,
    /// Newly live-appended cards are highlighted until this time.
    pub flash_until: Option<Millis>,
    /// Freshness in `[0, 1]` for the recency bar.
    pub recency: f32,
    pub actions: Vec<ModAction>,
}

impl Card {
    pub fn new(event: LogEvent, ctx: &CardContext<'_>) -> Self {
        let names = ctx.names;
        let executor = event.executor_id().map(|id| {
            LabelSlot::build(NameKind::Member, id, event.embedded_executor_label(), names)
        });
        let subject = event
            .subject_id()
            .map(|id| LabelSlot::build(NameKind::Member, id, event.embedded_user_label(), names));
        let channel = event.channel_id().map(|id| {
            LabelSlot::build(NameKind::Channel, id, event.embedded_channel_label(), names)
        });
        let reason = event.message.as_deref().map(|msg| {
            if is_snowflake(msg) {
                Reason::Member(LabelSlot::build(NameKind::Member, msg, None, names))
            } else {
                Reason::Text(msg.to_owned())
            }
        });
        Self {
            day: util::format_day(event.timestamp, ctx.date_format),
            recency: ctx.recency.fraction(event.timestamp, ctx.now),
            actions: quick::suggested(&event),
            event,
            executor,
            subject,
            channel,
            reason,
            expanded: false,
            flash_until: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.event.id
    }

    pub fn timestamp(&self) -> Millis {
        self.event.timestamp
    }

    pub fn title(&self) -> &'static str {
        self.event.kind.title()
    }

    fn slots(&self) -> impl Iterator<Item = &LabelSlot> {
        let reason = match self.reason {
            Some(Reason::Member(ref slot)) => Some(slot),
            _ => None,
        };
        self.executor
            .iter()
            .chain(self.subject.iter())
            .chain(self.channel.iter())
            .chain(reason)
    }

    fn slots_mut(&mut self) -> impl Iterator<Item = &mut LabelSlot> {
        let reason = match self.reason {
            Some(Reason::Member(ref mut slot)) => Some(slot),
            _ => None,
        };
        self.executor
            .iter_mut()
            .chain(self.subject.iter_mut())
            .chain(self.channel.iter_mut())
            .chain(reason)
    }

    /// Ids this card still shows raw.
    pub fn unresolved(&self) -> impl Iterator<Item = (NameKind, &str)> {
        self.slots()
            .filter(|s| !s.resolved)
            .map(|s| (s.kind, s.id.as_str()))
    }

    /// Patch every slot showing `id`. Returns the number of slots rewritten.
    pub fn apply_label(&mut self, kind: NameKind, id: &str, label: &str) -> usize {
        self.slots_mut()
            .map(|slot| usize::from(slot.apply(kind, id, label)))
            .sum()
    }

    pub fn is_flashing(&self, now: Millis) -> bool {
        self.flash_until.is_some_and(|t| t > now)
    }

    /// One-line summary: who did what to whom, where.
    pub fn summary(&self) -> String {
        let mut parts = vec![self.title().to_owned()];
        if let Some(ref s) = self.subject {
            parts.push(s.text.clone());
        }
        if let Some(ref c) = self.channel {
            parts.push(format!("in {}", c.text));
        }
        if let Some(ref e) = self.executor {
            parts.push(format!("by {}", e.text));
        }
        parts.join(" · ")
    }

    /// Detail revealed when the card is expanded.
    pub fn detail(&self) -> CardDetail {
        let mut detail = CardDetail {
            reason: self.reason.as_ref().map(|r| r.text().to_owned()),
            ..CardDetail::default()
        };
        let resolved = self.event.resolved.as_ref();
        match &self.event.payload {
            EventPayload::Message(p) => {
                match self.event.kind {
                    EventKind::MessageEdit => {
                        detail.diff = Some(Diff {
                            before: p.before.clone().unwrap_or_default(),
                            after: p.after.clone().unwrap_or_default(),
                        });
                    }
                    _ => detail.content = p.content.clone().or_else(|| p.before.clone()),
                }
                if !p.attachments.is_empty() {
                    detail
                        .facts
                        .push(("attachments", p.attachments.len().to_string()));
                }
                if let Some(count) = p.count {
                    detail.facts.push(("messages", count.to_string()));
                }
            }
            EventPayload::Member(p) => {
                detail.roles_added = role_names(
                    &p.roles_added,
                    resolved.map(|r| r.roles_added.as_slice()).unwrap_or_default(),
                );
                detail.roles_removed = role_names(
                    &p.roles_removed,
                    resolved.map(|r| r.roles_removed.as_slice()).unwrap_or_default(),
                );
                if p.nick_before.is_some() || p.nick_after.is_some() {
                    detail.diff = Some(Diff {
                        before: p.nick_before.clone().unwrap_or_default(),
                        after: p.nick_after.clone().unwrap_or_default(),
                    });
                }
                if let Some(until) = p.until {
                    detail
                        .facts
                        .push(("until", util::to_datetime(until).to_rfc3339()));
                }
            }
            EventPayload::Voice(p) => {
                if let Some(ref from) = p.from_channel_id {
                    detail.facts.push(("from", from.clone()));
                }
                if let Some(ref to) = p.to_channel_id {
                    detail.facts.push(("to", to.clone()));
                }
            }
            EventPayload::Ban(p) => {
                if detail.reason.is_none() {
                    detail.reason = p.reason.clone();
                }
            }
            EventPayload::Channel(p) | EventPayload::Role(p) => {
                if let Some(ref name) = p.name {
                    detail.facts.push(("name", name.clone()));
                }
                if let Some(ref before) = p.name_before {
                    detail.diff = Some(Diff {
                        before: before.clone(),
                        after: p.name.clone().unwrap_or_default(),
                    });
                }
                if let (Some(before), Some(after)) = (p.position_before, p.position_after) {
                    detail.facts.push(("position", format!("{before} → {after}")));
                }
            }
            EventPayload::Other(_) => {}
        }
        detail
    }
}

fn role_names(ids: &[String], resolved: &[crate::types::ResolvedRole]) -> Vec<String> {
    ids.iter()
        .map(|id| {
            resolved
                .iter()
                .find(|r| &r.id == id)
                .map_or_else(|| id.clone(), |r| r.name.clone())
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub before: String,
    pub after: String,
}

/// Expanded-card content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDetail {
    pub diff: Option<Diff>,
    pub content: Option<String>,
    pub roles_added: Vec<String>,
    pub roles_removed: Vec<String>,
    pub reason: Option<String>,
    pub facts: Vec<(&'static str, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::names::NameCache;
    use crate::types::RawLogEvent;

    fn event(json: serde_json::Value) -> LogEvent {
        let raw: RawLogEvent = serde_json::from_value(json).unwrap();
        LogEvent::try_from(raw).unwrap()
    }

    fn ctx(names: &NameResolver) -> CardContext<'_> {
        CardContext {
            names,
            date_format: "%Y-%m-%d",
            recency: RecencyWindow::Hour,
            now: 0,
        }
    }

    #[test]
    fn raw_ids_are_placeholders_until_patched() {
        let names = NameResolver::new(NameCache::new(), 250, 50);
        let mut card = Card::new(
            event(serde_json::json!({
                "id": "1", "timestamp": 0, "type": "mod_message_delete",
                "data": { "executorId": "M1", "userId": "U1", "channelId": "C1" }
            })),
            &ctx(&names),
        );
        let unresolved: Vec<_> = card.unresolved().collect();
        assert_eq!(
            unresolved,
            vec![
                (NameKind::Member, "M1"),
                (NameKind::Member, "U1"),
                (NameKind::Channel, "C1")
            ]
        );
        assert_eq!(card.apply_label(NameKind::Member, "U1", "alice"), 1);
        assert_eq!(card.subject.as_ref().unwrap().text, "alice");
        // Same label again is a no-op.
        assert_eq!(card.apply_label(NameKind::Member, "U1", "alice"), 0);
        // A channel label never lands on a member slot.
        assert_eq!(card.apply_label(NameKind::Channel, "M1", "#oops"), 0);
    }

    #[test]
    fn embedded_labels_are_used_and_seeded() {
        let names = NameResolver::new(NameCache::new(), 250, 50);
        let card = Card::new(
            event(serde_json::json!({
                "id": "1", "timestamp": 0, "type": "mod_ban_add",
                "data": { "executorId": "M1", "userId": "U1" },
                "resolved": { "executor": { "id": "M1", "username": "mod", "nickname": "Boss" } }
            })),
            &ctx(&names),
        );
        assert_eq!(card.executor.as_ref().unwrap().text, "mod (Boss)");
        assert_eq!(names.label(NameKind::Member, "M1").as_deref(), Some("mod (Boss)"));
        assert_eq!(card.unresolved().count(), 1);
        assert_eq!(card.actions.len(), 1);
    }

    #[test]
    fn snowflake_reason_becomes_member_slot() {
        let names = NameResolver::new(NameCache::new(), 250, 50);
        let mut card = Card::new(
            event(serde_json::json!({
                "id": "1", "timestamp": 0, "type": "mod_role_create",
                "message": "123456789012345678"
            })),
            &ctx(&names),
        );
        assert_eq!(card.unresolved().count(), 1);
        card.apply_label(NameKind::Member, "123456789012345678", "alice");
        assert_eq!(card.detail().reason.as_deref(), Some("alice"));
    }

    #[test]
    fn member_update_detail_shows_role_chips_and_nick_diff() {
        let names = NameResolver::new(NameCache::new(), 250, 50);
        let card = Card::new(
            event(serde_json::json!({
                "id": "1", "timestamp": 0, "type": "mod_member_update",
                "data": { "userId": "U1", "rolesAdded": ["R1", "R2"], "nickBefore": "a", "nickAfter": "b" },
                "resolved": { "rolesAdded": [{ "id": "R1", "name": "Helper" }] }
            })),
            &ctx(&names),
        );
        let detail = card.detail();
        assert_eq!(detail.roles_added, vec!["Helper", "R2"]);
        assert!(detail.roles_removed.is_empty());
        assert_eq!(
            detail.diff,
            Some(Diff {
                before: "a".into(),
                after: "b".into()
            })
        );
    }

    #[test]
    fn edit_detail_has_before_after() {
        let names = NameResolver::new(NameCache::new(), 250, 50);
        let card = Card::new(
            event(serde_json::json!({
                "id": "1", "timestamp": 0, "type": "mod_message_edit",
                "data": { "userId": "U1", "before": "helo", "after": "hello" }
            })),
            &ctx(&names),
        );
        let detail = card.detail();
        assert_eq!(detail.diff.unwrap().after, "hello");
        assert!(!card.expanded);
    }
}
