use crate::filter::{Family, FilterState};
use crate::types::LogEvent;

/// Type pattern matching every moderation event.
pub const UNIVERSAL_PATTERN: &str = "mod_*";

/// A backend log query, derived from [`FilterState`] by [`build_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub patterns: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub q: Option<String>,
    pub user_id: Option<String>,
    pub moderator_id: Option<String>,
    pub channel_id: Option<String>,
    pub limit: u32,
}

/// Translate the filter into the query sent to `GET /guild/{id}/logs`.
///
/// Pure and deterministic: families are emitted in their declaration order
/// regardless of selection order.
pub fn build_query(filter: &FilterState) -> LogQuery {
    let patterns = if filter.all_families() {
        vec![UNIVERSAL_PATTERN.to_owned()]
    } else {
        Family::ALL
            .iter()
            .filter(|f| filter.families.contains(f))
            .map(|f| f.pattern().to_owned())
            .collect()
    };
    LogQuery {
        patterns,
        from: non_empty(&filter.from),
        to: non_empty(&filter.to),
        q: non_empty(&filter.q),
        user_id: non_empty(&filter.user_id),
        moderator_id: non_empty(&filter.moderator_id),
        channel_id: non_empty(&filter.channel_id),
        limit: filter.effective_limit(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

impl LogQuery {
    /// The same query restricted to the `window` most recent events.
    pub fn head(&self, window: u32) -> Self {
        Self {
            limit: window,
            ..self.clone()
        }
    }

    /// Query-string pairs in a fixed order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("type", self.patterns.join(","))];
        let optional = [
            ("from", &self.from),
            ("to", &self.to),
            ("q", &self.q),
            ("userId", &self.user_id),
            ("moderatorId", &self.moderator_id),
            ("channelId", &self.channel_id),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                pairs.push((key, v.clone()));
            }
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }

    /// Evaluate the query locally.
    ///
    /// Used by the stub engine. Date bounds are compared as epoch millis when
    /// they parse as integers and ignored otherwise.
    pub fn matches(&self, event: &LogEvent) -> bool {
        if !self
            .patterns
            .iter()
            .any(|p| pattern_matches(p, &event.type_name))
        {
            return false;
        }
        if let Some(from) = self.from.as_deref().and_then(|s| s.parse::<i64>().ok())
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.to.as_deref().and_then(|s| s.parse::<i64>().ok())
            && event.timestamp > to
        {
            return false;
        }
        if let Some(ref user) = self.user_id
            && event.subject_id() != Some(user.as_str())
        {
            return false;
        }
        if let Some(ref moderator) = self.moderator_id
            && event.executor_id() != Some(moderator.as_str())
        {
            return false;
        }
        if let Some(ref channel) = self.channel_id
            && event.channel_id() != Some(channel.as_str())
        {
            return false;
        }
        if let Some(ref q) = self.q {
            let needle = q.to_lowercase();
            let hay = format!(
                "{} {} {}",
                event.type_name,
                event.message.as_deref().unwrap_or(""),
                serde_json::to_string(&event.payload).unwrap_or_default()
            )
            .to_lowercase();
            if !hay.contains(&needle) {
                return false;
            }
        }
        true
    }
}

/// Glob match supporting a single trailing `*`; dots and underscores are
/// interchangeable in type names.
pub fn pattern_matches(pattern: &str, type_name: &str) -> bool {
    let type_name = type_name.replace('.', "_").to_lowercase();
    let pattern = pattern.replace('.', "_").to_lowercase();
    match pattern.strip_suffix('*') {
        Some(prefix) => type_name.starts_with(prefix),
        None => type_name == pattern,
    }
}
