use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Families
// ---------------------------------------------------------------------------

/// Coarse event category used to build type patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Messages,
    Members,
    Voice,
    Bans,
}

impl Family {
    pub const ALL: [Self; 4] = [Self::Messages, Self::Members, Self::Voice, Self::Bans];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::Members => "members",
            Self::Voice => "voice",
            Self::Bans => "bans",
        }
    }

    /// Wildcard type pattern sent to the backend for this family.
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Messages => "mod_message_*",
            Self::Members => "mod_member_*",
            Self::Voice => "mod_voice_*",
            Self::Bans => "mod_ban_*",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "messages" | "message" => Ok(Self::Messages),
            "members" | "member" => Ok(Self::Members),
            "voice" => Ok(Self::Voice),
            "bans" | "ban" => Ok(Self::Bans),
            other => Err(format!("unknown event family {other:?}")),
        }
    }
}

/// Value of the legacy single-family field: `"all"` or one family name.
pub const ALL_FAMILIES: &str = "all";

/// A name typed where an id is expected (`@alice`, `#general`), without its
/// sigil. Plain ids yield `None`.
pub fn name_reference(value: &str) -> Option<&str> {
    let name = value.trim().strip_prefix(['@', '#'])?.trim();
    (!name.is_empty()).then_some(name)
}

// ---------------------------------------------------------------------------
// Filter state
// ---------------------------------------------------------------------------

/// The query the user has configured for the feed view.
///
/// `families` is the multi-select; `family` mirrors it for older preference
/// files that only knew a single family. Mutate families through
/// [`FilterState::set_families`] / [`FilterState::set_legacy_family`] so the
/// two stay consistent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterState {
    pub families: BTreeSet<Family>,
    pub family: String,
    pub q: String,
    pub from: String,
    pub to: String,
    pub user_id: String,
    pub moderator_id: String,
    pub channel_id: String,
    pub order_desc: bool,
    pub group_by_mod: bool,
    pub group_sort_by_volume: bool,
    pub pinned: BTreeSet<String>,
    pub pin_order: Vec<String>,
    pub page: u32,
    pub per_page: u32,
    pub limit: Option<u32>,
    pub stream: bool,
    pub show_latency: bool,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            families: BTreeSet::new(),
            family: ALL_FAMILIES.to_owned(),
            q: String::new(),
            from: String::new(),
            to: String::new(),
            user_id: String::new(),
            moderator_id: String::new(),
            channel_id: String::new(),
            order_desc: true,
            group_by_mod: false,
            group_sort_by_volume: false,
            pinned: BTreeSet::new(),
            pin_order: Vec::new(),
            page: 1,
            per_page: 50,
            limit: None,
            stream: false,
            show_latency: false,
        }
    }
}

impl FilterState {
    /// Replace the family multi-select. An empty selection means "all".
    pub fn set_families(&mut self, families: impl IntoIterator<Item = Family>) {
        self.families = families.into_iter().collect();
        self.sync_legacy_family();
    }

    /// Toggle one family in the multi-select.
    pub fn toggle_family(&mut self, family: Family) {
        if !self.families.remove(&family) {
            self.families.insert(family);
        }
        self.sync_legacy_family();
    }

    /// Set through the legacy single-family control. `None` selects all.
    pub fn set_legacy_family(&mut self, family: Option<Family>) {
        self.families = family.into_iter().collect();
        self.sync_legacy_family();
    }

    /// Whether no family restriction applies.
    pub fn all_families(&self) -> bool {
        self.families.is_empty()
    }

    fn sync_legacy_family(&mut self) {
        self.family = match self.families.len() {
            1 => self
                .families
                .first()
                .map_or(ALL_FAMILIES, |f| f.as_str())
                .to_owned(),
            _ => ALL_FAMILIES.to_owned(),
        };
    }

    /// Restore consistency after loading from an older or hand-edited store.
    ///
    /// A store that only carries the legacy field gets its multi-select
    /// rebuilt from it; otherwise the multi-select wins.
    pub fn normalize(&mut self) {
        if self.families.is_empty()
            && let Ok(f) = self.family.parse::<Family>()
        {
            self.families.insert(f);
        }
        self.sync_legacy_family();
        if self.page == 0 {
            self.page = 1;
        }
        if self.per_page == 0 {
            self.per_page = FilterState::default().per_page;
        }
        self.pin_order.retain(|id| self.pinned.contains(id));
        let mut seen = BTreeSet::new();
        self.pin_order.retain(|id| seen.insert(id.clone()));
    }

    /// Number of events requested by a full load.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or_else(|| self.per_page.saturating_mul(self.page.max(1)))
    }

    // -- pins ---------------------------------------------------------------

    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned.contains(key)
    }

    pub fn pin(&mut self, key: &str) {
        self.pinned.insert(key.to_owned());
    }

    pub fn unpin(&mut self, key: &str) {
        self.pinned.remove(key);
        self.pin_order.retain(|id| id != key);
    }

    pub fn toggle_pin(&mut self, key: &str) {
        if self.is_pinned(key) {
            self.unpin(key);
        } else {
            self.pin(key);
        }
    }

    /// Move a pinned key to position `to` in the explicit pin order.
    ///
    /// When no explicit order exists yet it starts from the current pin set.
    pub fn move_pin(&mut self, key: &str, to: usize) {
        if !self.is_pinned(key) {
            return;
        }
        if self.pin_order.is_empty() {
            self.pin_order = self.pinned.iter().cloned().collect();
        } else {
            for id in &self.pinned {
                if !self.pin_order.contains(id) {
                    self.pin_order.push(id.clone());
                }
            }
        }
        self.pin_order.retain(|id| id != key);
        let to = to.min(self.pin_order.len());
        self.pin_order.insert(to, key.to_owned());
    }
}
