use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Subscription plan tier
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "plan_tier", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PlanTier {
    #[default]
    Free,
    Standard,
    Pro,
}

impl PlanTier {
    /// Parse a provider-side plan label (price metadata or lookup key).
    /// Unknown labels return `None` so the stored plan is left alone.
    pub fn from_label(label: &str) -> Option<Self> {
        label.trim().parse().ok()
    }
}
