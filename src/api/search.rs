use serde::Deserialize;

use crate::types::{channel_label, event::id_de, member_label};

use super::client::{ApiClient, take_field};
use super::error::ApiError;

/// Which search endpoint (and name cache namespace) an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Member,
    Channel,
}

impl NameKind {
    fn path_segment(self) -> &'static str {
        match self {
            Self::Member => "members",
            Self::Channel => "channels",
        }
    }
}

/// One row of `/search/members` or `/search/channels`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(deserialize_with = "id_de::deserialize")]
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, alias = "nick")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl SearchHit {
    /// The hit's own name, if the backend sent one.
    pub fn known_label(&self, kind: NameKind) -> Option<String> {
        match kind {
            NameKind::Member => {
                let nick = self.nickname.as_deref().or(self.display_name.as_deref());
                match self.username.as_deref().or(self.name.as_deref()) {
                    Some(username) => Some(member_label(username, nick)),
                    None => nick.map(str::to_owned),
                }
            }
            NameKind::Channel => self.name.as_deref().map(channel_label),
        }
    }

    /// Display label for a search listing. Falls back to the raw id.
    pub fn label(&self, kind: NameKind) -> String {
        self.known_label(kind).unwrap_or_else(|| self.id.clone())
    }
}

/// Free-text search, used by autocomplete.
pub async fn search(
    client: &ApiClient,
    guild_id: &str,
    kind: NameKind,
    q: &str,
) -> Result<Vec<SearchHit>, ApiError> {
    let path = ["guild", guild_id, "search", kind.path_segment()];
    let body = client.get_json(&path, &[("q", q.to_owned())], "search").await?;
    let hits: Option<Vec<SearchHit>> = take_field(body, "results")?;
    Ok(hits.unwrap_or_default())
}

/// Batch lookup: the endpoint accepts a comma-joined id list as the query.
///
/// Returns `(id, label)` only for requested ids that came back with a name;
/// unrelated fuzzy matches and nameless rows are discarded.
pub async fn resolve_batch(
    client: &ApiClient,
    guild_id: &str,
    kind: NameKind,
    ids: &[String],
) -> Result<Vec<(String, String)>, ApiError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let hits = search(client, guild_id, kind, &ids.join(",")).await?;
    Ok(hits
        .into_iter()
        .filter(|h| ids.contains(&h.id))
        .filter_map(|h| {
            let label = h.known_label(kind)?;
            Some((h.id, label))
        })
        .collect())
}
