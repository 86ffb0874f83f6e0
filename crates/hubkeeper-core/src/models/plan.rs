use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column limit used by the single-column free tier
const FREE_COLUMNS_LIMIT: u32 = 1;

/// Column limit used when a build has no column restriction
const UNLIMITED_COLUMNS_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureFlags {
    pub columns_limit: u32,
    pub enable_filters: bool,
    pub enable_sync: bool,
    pub enable_private_repositories: bool,
    pub enable_push_notifications: bool,
    pub enable_desktop_push_notifications: bool,
}

/// Subscription plan attached to a user.
///
/// `trial_end_at` is absent when the plan has no trial boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Option<String>,
    pub source: Option<String>,
    pub label: Option<String>,
    /// Price in the smallest currency unit
    #[serde(default)]
    pub amount: i64,
    pub currency: Option<String>,
    pub interval: Option<String>,
    pub trial_period_days: Option<u32>,
    pub trial_end_at: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub feature_flags: FeatureFlags,
}

impl Plan {
    /// The plan given to users that sign in straight against GitHub.
    pub fn free(unlimited_columns: bool) -> Self {
        Self {
            id: None,
            source: None,
            label: Some("Free".to_string()),
            amount: 0,
            currency: Some("usd".to_string()),
            interval: None,
            trial_period_days: None,
            trial_end_at: None,
            cancel_at: None,
            feature_flags: FeatureFlags {
                columns_limit: if unlimited_columns {
                    UNLIMITED_COLUMNS_LIMIT
                } else {
                    FREE_COLUMNS_LIMIT
                },
                enable_filters: true,
                enable_sync: false,
                enable_private_repositories: true,
                enable_push_notifications: false,
                enable_desktop_push_notifications: true,
            },
        }
    }

    pub fn is_free(&self) -> bool {
        self.amount == 0
    }

    pub fn is_trialing_at(&self, now: DateTime<Utc>) -> bool {
        self.trial_end_at.is_some_and(|end| end > now)
    }
}
