//! # Dach Configuration
//!
//! Add-ons are configured by name. Each entry carries the scope list
//! requested at install time and the descriptor template path:
//!
//! ```rust
//! use dach_core::config::{AppConfig, DachConfig};
//!
//! let config = DachConfig::new()
//!     .with_app("echo", AppConfig::new(["send_notification", "view_group"]));
//!
//! assert_eq!(config.app("echo").unwrap().joined_scopes(), "send_notification|view_group");
//! assert_eq!(config.descriptor_template("echo").unwrap(), "echo/atlassian-connect.json");
//! ```
//!
//! The same shape loads from JSON:
//!
//! ```json
//! {
//!   "appconfig": {
//!     "echo": { "scopes": ["send_notification"], "descriptor": "echo/descriptor.json" }
//!   },
//!   "timeouts": { "capabilities_secs": 5, "token_secs": 5 }
//! }
//! ```
//!
//! The value is handed to the installer when it is built; nothing here is
//! process-global.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DachConfig {
    #[serde(default)]
    pub appconfig: HashMap<String, AppConfig>,
    #[serde(default)]
    pub timeouts: RemoteTimeouts,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub scopes: Vec<String>,
    #[serde(default)]
    pub descriptor: Option<String>,
}

/// Upper bounds for the two outbound calls made during a handshake.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RemoteTimeouts {
    #[serde(default = "default_timeout_secs")]
    pub capabilities_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub token_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self {
            capabilities_secs: DEFAULT_TIMEOUT_SECS,
            token_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RemoteTimeouts {
    pub fn capabilities(&self) -> Duration {
        Duration::from_secs(self.capabilities_secs)
    }

    pub fn token(&self) -> Duration {
        Duration::from_secs(self.token_secs)
    }
}

impl AppConfig {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            descriptor: None,
        }
    }

    pub fn with_descriptor(mut self, path: impl Into<String>) -> Self {
        self.descriptor = Some(path.into());
        self
    }

    /// Scopes joined with `|`, in configured order.
    pub fn joined_scopes(&self) -> String {
        self.scopes.join("|")
    }
}

impl DachConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw).context("invalid dach configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read dach configuration at {}", path.display()))?;
        Self::from_json_str(&raw)
    }

    pub fn with_app(mut self, name: impl Into<String>, app: AppConfig) -> Self {
        self.appconfig.insert(name.into(), app);
        self
    }

    pub fn with_timeouts(mut self, timeouts: RemoteTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn app(&self, name: &str) -> Option<&AppConfig> {
        self.appconfig.get(name)
    }

    /// Template path for the add-on's descriptor, defaulting to
    /// `<app_name>/atlassian-connect.json`.
    pub fn descriptor_template(&self, name: &str) -> Option<String> {
        self.app(name).map(|app| {
            app.descriptor
                .clone()
                .unwrap_or_else(|| format!("{name}/atlassian-connect.json"))
        })
    }

    /// Timeouts must be finite and non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.capabilities_secs == 0 || self.timeouts.token_secs == 0 {
            return Err(anyhow!("remote timeouts must be greater than zero"));
        }
        Ok(())
    }
}
