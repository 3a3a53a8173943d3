use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::Millis;

/// How often recency bars are recomputed, independently of render passes.
pub const RECENCY_TICK_MS: Millis = 30_000;

/// Time window over which a card's recency bar decays to empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecencyWindow {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl RecencyWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "1h",
            Self::Day => "24h",
            Self::Week => "7d",
        }
    }

    pub fn millis(self) -> Millis {
        match self {
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
            Self::Week => 7 * 86_400_000,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::Hour => Self::Day,
            Self::Day => Self::Week,
            Self::Week => Self::Hour,
        }
    }

    /// Remaining freshness in `[0, 1]`: 1 at `now`, 0 once older than the
    /// window. Future timestamps count as fresh.
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(self, timestamp: Millis, now: Millis) -> f32 {
        let age = (now - timestamp).max(0);
        let window = self.millis();
        if age >= window {
            0.0
        } else {
            1.0 - (age as f32 / window as f32)
        }
    }
}

impl fmt::Display for RecencyWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecencyWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(Self::Hour),
            "24h" | "1d" => Ok(Self::Day),
            "7d" | "1w" => Ok(Self::Week),
            other => Err(format!("unknown window {other:?}; expected 1h, 24h or 7d")),
        }
    }
}
