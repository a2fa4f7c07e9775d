// Installation handshake.

use std::sync::Arc;

use dach_core::{DachConfig, LifecycleEvent, Notifier, StorageBackend, StorageError, Tenant, TENANT_KIND};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::capabilities::{CapabilityVerifier, DiscoveredEndpoints, HttpCapabilityVerifier};
use crate::error::{HandshakeError, HandshakeResult};
use crate::token::{OAuth2TokenExchanger, TokenExchanger};

/// Body of the platform's installation callback.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallPayload {
    pub capabilities_url: String,
    pub oauth_id: String,
    pub oauth_secret: String,
    #[serde(deserialize_with = "id_string")]
    pub group_id: String,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub room_id: Option<String>,
}

impl InstallPayload {
    pub fn from_slice(body: &[u8]) -> HandshakeResult<Self> {
        serde_json::from_slice(body).map_err(|e| HandshakeError::invalid_payload(e.to_string()))
    }
}

// Identifiers arrive as strings or as JSON numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number identifier, got {other}"
        ))),
    }
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number identifier, got {other}"
        ))),
    }
}

/// Assemble the provisional tenant: everything but `group_name`.
pub fn build_tenant(
    app_name: &str,
    scopes: String,
    payload: InstallPayload,
    endpoints: DiscoveredEndpoints,
) -> Tenant {
    Tenant {
        oauth_id: payload.oauth_id,
        oauth_secret: payload.oauth_secret,
        capabilities_url: payload.capabilities_url,
        oauth_token_url: endpoints.token_url,
        api_url: endpoints.api_url,
        group_id: payload.group_id,
        room_id: payload.room_id,
        app_name: app_name.to_string(),
        scopes,
        group_name: None,
    }
}

/// Runs the install and uninstall callbacks for every configured add-on.
///
/// Install is linear: parse, verify capabilities, exchange credentials,
/// persist, notify. Nothing is written unless the exchange succeeds, and a
/// notification failure after the write is logged but never undoes it.
pub struct Installer {
    config: Arc<DachConfig>,
    verifier: Arc<dyn CapabilityVerifier>,
    exchanger: Arc<dyn TokenExchanger>,
    storage: Arc<dyn StorageBackend>,
    notifier: Arc<dyn Notifier>,
}

impl Installer {
    /// Installer backed by HTTP capability discovery and the OAuth2
    /// client-credentials exchange, bounded by the configured timeouts.
    /// Zero timeouts are rejected as a configuration error.
    pub fn new(
        config: DachConfig,
        storage: Arc<dyn StorageBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> HandshakeResult<Self> {
        config.validate().map_err(|e| HandshakeError::Config { reason: e.to_string() })?;
        let verifier = Arc::new(HttpCapabilityVerifier::new(config.timeouts.capabilities())?);
        let exchanger = Arc::new(OAuth2TokenExchanger::new(config.timeouts.token()));
        Ok(Self {
            config: Arc::new(config),
            verifier,
            exchanger,
            storage,
            notifier,
        })
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CapabilityVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_exchanger(mut self, exchanger: Arc<dyn TokenExchanger>) -> Self {
        self.exchanger = exchanger;
        self
    }

    pub fn config(&self) -> &DachConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.storage)
    }

    pub fn exchanger(&self) -> Arc<dyn TokenExchanger> {
        Arc::clone(&self.exchanger)
    }

    /// Handle an installation callback body for `app_name`.
    #[instrument(skip_all, fields(app = %app_name, oauth_id = tracing::field::Empty))]
    pub async fn install(&self, app_name: &str, body: &[u8]) -> HandshakeResult<Tenant> {
        let result = self.run_install(app_name, body).await;
        if let Err(e) = &result {
            warn!(error = %e, "installation rejected");
        }
        result
    }

    async fn run_install(&self, app_name: &str, body: &[u8]) -> HandshakeResult<Tenant> {
        let app = self.config.app(app_name).ok_or_else(|| HandshakeError::UnknownAddon {
            app_name: app_name.to_string(),
        })?;

        let payload = InstallPayload::from_slice(body)?;
        tracing::Span::current().record("oauth_id", payload.oauth_id.as_str());

        let endpoints = self.verifier.verify_and_discover(&payload.capabilities_url).await?;

        let mut tenant = build_tenant(app_name, app.joined_scopes(), payload, endpoints);
        let token = self.exchanger.exchange(&tenant).await?;
        tenant.group_name = Some(token.group_name);

        let raw = tenant.to_json().map_err(StorageError::from)?;
        // A reinstall must not inherit tokens cached for the previous credentials.
        if let Err(e) = self.storage.delete(&tenant.oauth_id).await {
            error!(error = %e, "cannot clear previous installation");
            return Err(e.into());
        }
        if let Err(e) = self.storage.set(&tenant.oauth_id, TENANT_KIND, raw).await {
            error!(error = %e, "cannot persist tenant");
            return Err(e.into());
        }

        let event = LifecycleEvent::Installed {
            app_name: app_name.to_string(),
            tenant: tenant.clone(),
        };
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(error = %e, "install notification failed");
        }

        info!(event = event.kind().name(), "addon successfully installed");
        Ok(tenant)
    }

    /// Drop every record stored for `oauth_id`, then notify.
    #[instrument(skip(self))]
    pub async fn uninstall(&self, app_name: &str, oauth_id: &str) -> HandshakeResult<()> {
        if let Err(e) = self.storage.delete(oauth_id).await {
            error!(error = %e, "cannot delete tenant");
            return Err(e.into());
        }

        let event = LifecycleEvent::Uninstalled {
            app_name: app_name.to_string(),
            oauth_id: oauth_id.to_string(),
        };
        if let Err(e) = self.notifier.notify(&event).await {
            warn!(error = %e, "uninstall notification failed");
        }

        info!(event = event.kind().name(), "addon successfully uninstalled");
        Ok(())
    }
}
