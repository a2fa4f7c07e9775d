//! The installed-instance record for one remote account or group.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One installation of an add-on.
///
/// `oauth_token_url` and `api_url` are never taken from the install payload:
/// they come from the verified capabilities document. `group_name` stays
/// `None` until the token exchange succeeds.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub oauth_id: String,
    pub oauth_secret: String,
    pub capabilities_url: String,
    pub oauth_token_url: String,
    pub api_url: String,
    pub group_id: String,
    #[serde(default)]
    pub room_id: Option<String>,
    pub app_name: String,
    /// Pipe-delimited, in configured order.
    pub scopes: String,
    #[serde(default)]
    pub group_name: Option<String>,
}

impl Tenant {
    /// Scopes in the order they were granted.
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split('|').filter(|s| !s.is_empty()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("oauth_id", &self.oauth_id)
            .field("oauth_secret", &"<redacted>")
            .field("capabilities_url", &self.capabilities_url)
            .field("oauth_token_url", &self.oauth_token_url)
            .field("api_url", &self.api_url)
            .field("group_id", &self.group_id)
            .field("room_id", &self.room_id)
            .field("app_name", &self.app_name)
            .field("scopes", &self.scopes)
            .field("group_name", &self.group_name)
            .finish()
    }
}
