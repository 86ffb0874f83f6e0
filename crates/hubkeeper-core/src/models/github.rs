use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The GitHub account behind a user, as reported by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct GitHubAccount {
    pub id: i64,
    #[serde(default)]
    pub node_id: String,
    pub login: String,
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A GitHub token together with the scopes it was granted.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct GitHubCredential {
    pub token: String,
    #[serde(default)]
    pub scope: BTreeSet<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub created_at: DateTime<Utc>,
    pub login: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl GitHubCredential {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scope.contains(scope)
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for GitHubCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubCredential")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .field("created_at", &self.created_at)
            .field("login", &self.login)
            .finish()
    }
}

/// GitHub App installation linked to an OAuth/app credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    pub id: i64,
    pub node_id: Option<String>,
    pub account_login: Option<String>,
}

/// Every credential linked to a user plus the underlying GitHub account.
///
/// Each credential kind occupies a single slot, so a user can never hold
/// more than one personal token: replacing it overwrites the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct GitHubIdentity {
    pub personal: Option<GitHubCredential>,
    pub oauth: Option<GitHubCredential>,
    pub app: Option<GitHubCredential>,
    #[serde(default)]
    pub installations: Vec<Installation>,
    pub user: GitHubAccount,
}
