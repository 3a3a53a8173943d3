use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Aggregate moderation counters for one time window.
///
/// The backend owns the set of counter names; unknown keys are preserved in
/// arrival order so the status header can show them as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub metrics: IndexMap<String, serde_json::Value>,
}

impl Summary {
    /// Read a numeric counter, ignoring non-numeric metrics.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.metrics.get(name).and_then(serde_json::Value::as_u64)
    }

    /// `name=value` pairs for every numeric counter.
    pub fn numeric_pairs(&self) -> Vec<(String, u64)> {
        self.metrics
            .iter()
            .filter_map(|(k, v)| v.as_u64().map(|n| (k.clone(), n)))
            .collect()
    }
}
