//! Model tiers and client-model → tier resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Request model class; decides whether boost applies and which executor model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Small,
    Middle,
    Big,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Small, Tier::Middle, Tier::Big];

    /// Resolve the tier of a client-facing model name.
    ///
    /// Family names win (haiku/sonnet/opus); otherwise the name is matched
    /// against the configured executor models; anything else is Big.
    pub fn resolve(model: &str, models: &TierModels) -> Tier {
        let lower = model.to_lowercase();
        if lower.contains("haiku") {
            return Tier::Small;
        }
        if lower.contains("sonnet") {
            return Tier::Middle;
        }
        if lower.contains("opus") {
            return Tier::Big;
        }

        if model == models.small {
            Tier::Small
        } else if model == models.middle() {
            Tier::Middle
        } else {
            Tier::Big
        }
    }

    /// Environment spelling used by `ENABLE_BOOST_SUPPORT`
    pub fn env_name(&self) -> &'static str {
        match self {
            Tier::Small => "SMALL_MODEL",
            Tier::Middle => "MIDDLE_MODEL",
            Tier::Big => "BIG_MODEL",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Small => "small",
            Tier::Middle => "middle",
            Tier::Big => "big",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SMALL" | "SMALL_MODEL" => Ok(Tier::Small),
            "MIDDLE" | "MIDDLE_MODEL" => Ok(Tier::Middle),
            "BIG" | "BIG_MODEL" => Ok(Tier::Big),
            other => Err(format!("unknown tier '{}'", other)),
        }
    }
}

/// Executor model per tier
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TierModels {
    pub small: String,
    /// Falls back to `big` when unset
    pub middle: Option<String>,
    pub big: String,
}

impl Default for TierModels {
    fn default() -> Self {
        Self {
            small: "gpt-4o-mini".to_string(),
            middle: None,
            big: "gpt-4o".to_string(),
        }
    }
}

impl TierModels {
    pub fn middle(&self) -> &str {
        self.middle.as_deref().unwrap_or(&self.big)
    }

    pub fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Small => &self.small,
            Tier::Middle => self.middle(),
            Tier::Big => &self.big,
        }
    }
}
