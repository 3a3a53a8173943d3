use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::Family;

/// Epoch milliseconds, as carried on the wire.
pub type Millis = i64;

/// Group key used when an event has neither an executor nor a subject.
pub const SYSTEM_GROUP: &str = "system";

// ---------------------------------------------------------------------------
// Id deserialization
// ---------------------------------------------------------------------------

/// Accept either a JSON string or a JSON number for opaque identifiers.
pub(crate) mod id_de {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Str(String),
        Int(i64),
        UInt(u64),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RawId::deserialize(deserializer)? {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
            RawId::UInt(n) => n.to_string(),
        })
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<RawId> = Option::deserialize(deserializer)?;
        Ok(raw.map(|r| match r {
            RawId::Str(s) => s,
            RawId::Int(n) => n.to_string(),
            RawId::UInt(n) => n.to_string(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageDelete,
    MessageEdit,
    MessageBulkDelete,
    MemberJoin,
    MemberLeave,
    MemberUpdate,
    MemberTimeout,
    VoiceJoin,
    VoiceLeave,
    VoiceMove,
    BanAdd,
    BanRemove,
    ChannelCreate,
    ChannelDelete,
    ChannelUpdate,
    RoleCreate,
    RoleDelete,
    RoleUpdate,
    Unknown,
}

impl EventKind {
    /// Parse a backend type string. Dots and underscores are interchangeable.
    pub fn from_type(raw: &str) -> Self {
        let normalized = raw.replace('.', "_").to_lowercase();
        match normalized.as_str() {
            "mod_message_delete" => Self::MessageDelete,
            "mod_message_edit" | "mod_message_update" => Self::MessageEdit,
            "mod_message_bulk_delete" => Self::MessageBulkDelete,
            "mod_member_join" => Self::MemberJoin,
            "mod_member_leave" | "mod_member_kick" => Self::MemberLeave,
            "mod_member_update" => Self::MemberUpdate,
            "mod_member_timeout" => Self::MemberTimeout,
            "mod_voice_join" => Self::VoiceJoin,
            "mod_voice_leave" => Self::VoiceLeave,
            "mod_voice_move" => Self::VoiceMove,
            "mod_ban_add" => Self::BanAdd,
            "mod_ban_remove" => Self::BanRemove,
            "mod_channel_create" => Self::ChannelCreate,
            "mod_channel_delete" => Self::ChannelDelete,
            "mod_channel_update" => Self::ChannelUpdate,
            "mod_role_create" => Self::RoleCreate,
            "mod_role_delete" => Self::RoleDelete,
            "mod_role_update" => Self::RoleUpdate,
            _ => Self::Unknown,
        }
    }

    pub fn family(self) -> Option<Family> {
        match self {
            Self::MessageDelete | Self::MessageEdit | Self::MessageBulkDelete => {
                Some(Family::Messages)
            }
            Self::MemberJoin | Self::MemberLeave | Self::MemberUpdate | Self::MemberTimeout => {
                Some(Family::Members)
            }
            Self::VoiceJoin | Self::VoiceLeave | Self::VoiceMove => Some(Family::Voice),
            Self::BanAdd | Self::BanRemove => Some(Family::Bans),
            _ => None,
        }
    }

    /// Short human title shown on the card header.
    pub fn title(self) -> &'static str {
        match self {
            Self::MessageDelete => "Message deleted",
            Self::MessageEdit => "Message edited",
            Self::MessageBulkDelete => "Messages bulk-deleted",
            Self::MemberJoin => "Member joined",
            Self::MemberLeave => "Member left",
            Self::MemberUpdate => "Member updated",
            Self::MemberTimeout => "Member timed out",
            Self::VoiceJoin => "Joined voice",
            Self::VoiceLeave => "Left voice",
            Self::VoiceMove => "Moved voice channel",
            Self::BanAdd => "Member banned",
            Self::BanRemove => "Member unbanned",
            Self::ChannelCreate => "Channel created",
            Self::ChannelDelete => "Channel deleted",
            Self::ChannelUpdate => "Channel updated",
            Self::RoleCreate => "Role created",
            Self::RoleDelete => "Role deleted",
            Self::RoleUpdate => "Role updated",
            Self::Unknown => "Event",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-family payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemberPayload {
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles_added: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles_removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nick_after: Option<String>,
    /// Timeout expiry for `mod_member_timeout`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<Millis>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoicePayload {
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub from_channel_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub to_channel_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BanPayload {
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Shared by channel and role events: both carry a target id, a name and an
/// optional position change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StructurePayload {
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub executor_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(deserialize_with = "id_de::deserialize_opt", skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_after: Option<i64>,
}

/// Event-specific `data`, validated against the event family at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Message(MessagePayload),
    Member(MemberPayload),
    Voice(VoicePayload),
    Ban(BanPayload),
    Channel(StructurePayload),
    Role(StructurePayload),
    Other(serde_json::Value),
}

impl EventPayload {
    fn from_data(kind: EventKind, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        let data = if data.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            data
        };
        Ok(match kind {
            EventKind::MessageDelete | EventKind::MessageEdit | EventKind::MessageBulkDelete => {
                Self::Message(serde_json::from_value(data)?)
            }
            EventKind::MemberJoin
            | EventKind::MemberLeave
            | EventKind::MemberUpdate
            | EventKind::MemberTimeout => Self::Member(serde_json::from_value(data)?),
            EventKind::VoiceJoin | EventKind::VoiceLeave | EventKind::VoiceMove => {
                Self::Voice(serde_json::from_value(data)?)
            }
            EventKind::BanAdd | EventKind::BanRemove => Self::Ban(serde_json::from_value(data)?),
            EventKind::ChannelCreate | EventKind::ChannelDelete | EventKind::ChannelUpdate => {
                Self::Channel(serde_json::from_value(data)?)
            }
            EventKind::RoleCreate | EventKind::RoleDelete | EventKind::RoleUpdate => {
                Self::Role(serde_json::from_value(data)?)
            }
            EventKind::Unknown => Self::Other(data),
        })
    }

    pub fn executor_id(&self) -> Option<&str> {
        match self {
            Self::Message(p) => p.executor_id.as_deref(),
            Self::Member(p) => p.executor_id.as_deref(),
            Self::Voice(p) => p.executor_id.as_deref(),
            Self::Ban(p) => p.executor_id.as_deref(),
            Self::Channel(p) | Self::Role(p) => p.executor_id.as_deref(),
            Self::Other(v) => str_field(v, &["executorId", "moderatorId"]),
        }
    }

    pub fn subject_id(&self) -> Option<&str> {
        match self {
            Self::Message(p) => p.user_id.as_deref(),
            Self::Member(p) => p.user_id.as_deref(),
            Self::Voice(p) => p.user_id.as_deref(),
            Self::Ban(p) => p.user_id.as_deref(),
            Self::Channel(_) | Self::Role(_) => None,
            Self::Other(v) => str_field(v, &["userId", "targetId"]),
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::Message(p) => p.channel_id.as_deref(),
            Self::Voice(p) => p.channel_id.as_deref().or(p.to_channel_id.as_deref()),
            Self::Channel(p) => p.channel_id.as_deref(),
            Self::Member(_) | Self::Ban(_) | Self::Role(_) => None,
            Self::Other(v) => str_field(v, &["channelId"]),
        }
    }
}

fn str_field<'a>(value: &'a serde_json::Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(serde_json::Value::as_str))
}

// ---------------------------------------------------------------------------
// Server-resolved display objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUser {
    #[serde(deserialize_with = "id_de::deserialize")]
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl ResolvedUser {
    pub fn label(&self) -> String {
        member_label(&self.username, self.nickname.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChannel {
    #[serde(deserialize_with = "id_de::deserialize")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRole {
    #[serde(deserialize_with = "id_de::deserialize")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resolved {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<ResolvedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executor: Option<ResolvedUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ResolvedChannel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles_added: Vec<ResolvedRole>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles_removed: Vec<ResolvedRole>,
}

/// `username` or `username (nickname)`.
pub fn member_label(username: &str, nickname: Option<&str>) -> String {
    match nickname {
        Some(nick) if !nick.is_empty() && nick != username => format!("{username} ({nick})"),
        _ => username.to_owned(),
    }
}

pub fn channel_label(name: &str) -> String {
    if name.starts_with('#') {
        name.to_owned()
    } else {
        format!("#{name}")
    }
}

// ---------------------------------------------------------------------------
// LogEvent
// ---------------------------------------------------------------------------

/// An event exactly as the backend sends it, before payload validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLogEvent {
    #[serde(deserialize_with = "id_de::deserialize")]
    pub id: String,
    pub timestamp: Millis,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub resolved: Option<Resolved>,
}

/// An immutable moderation log record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    pub id: String,
    pub timestamp: Millis,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip)]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "data")]
    pub payload: EventPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<Resolved>,
}

impl TryFrom<RawLogEvent> for LogEvent {
    type Error = serde_json::Error;

    fn try_from(raw: RawLogEvent) -> Result<Self, Self::Error> {
        let kind = EventKind::from_type(&raw.kind);
        let payload = EventPayload::from_data(kind, raw.data)?;
        Ok(Self {
            id: raw.id,
            timestamp: raw.timestamp,
            type_name: raw.kind,
            kind,
            message: raw.message.filter(|m| !m.trim().is_empty()),
            payload,
            resolved: raw.resolved,
        })
    }
}

impl LogEvent {
    pub fn executor_id(&self) -> Option<&str> {
        self.payload.executor_id()
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.payload.subject_id()
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.payload.channel_id()
    }

    pub fn family(&self) -> Option<Family> {
        self.kind.family()
    }

    /// Responsible actor: the executor, else the subject, else [`SYSTEM_GROUP`].
    pub fn group_key(&self) -> &str {
        self.executor_id()
            .or_else(|| self.subject_id())
            .unwrap_or(SYSTEM_GROUP)
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_default()
    }

    /// Label the backend already resolved for an executor id, if any.
    pub fn embedded_executor_label(&self) -> Option<String> {
        self.resolved
            .as_ref()
            .and_then(|r| r.executor.as_ref())
            .map(ResolvedUser::label)
    }

    pub fn embedded_user_label(&self) -> Option<String> {
        self.resolved
            .as_ref()
            .and_then(|r| r.user.as_ref())
            .map(ResolvedUser::label)
    }

    pub fn embedded_channel_label(&self) -> Option<String> {
        self.resolved
            .as_ref()
            .and_then(|r| r.channel.as_ref())
            .map(|c| channel_label(&c.name))
    }
}

/// Whether `s` looks like a Discord snowflake (a bare 15–21 digit number).
pub fn is_snowflake(s: &str) -> bool {
    (15..=21).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}
