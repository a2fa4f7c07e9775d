use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dach_core::{StorageBackend, Tenant, TOKEN_KIND};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, Client, ClientId, ClientSecret, ExtraTokenFields, Scope, StandardRevocableToken,
    StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HandshakeError, HandshakeResult};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Extra fields the platform returns alongside the access token.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GroupTokenFields {
    pub group_name: String,
    #[serde(default)]
    pub group_id: Option<serde_json::Value>,
}

impl ExtraTokenFields for GroupTokenFields {}

type GroupTokenResponse = StandardTokenResponse<GroupTokenFields, BasicTokenType>;

type GroupClient = Client<
    BasicErrorResponse,
    GroupTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// An access token obtained for one tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub group_name: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - chrono::Duration::seconds(EXPIRY_SKEW_SECS) <= now,
            None => false,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("group_name", &self.group_name)
            .field("group_id", &self.group_id)
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchange the tenant's OAuth credentials at its discovered token URL.
    async fn exchange(&self, tenant: &Tenant) -> HandshakeResult<AccessToken>;
}

/// Client-credentials grant against the tenant's token endpoint.
pub struct OAuth2TokenExchanger {
    timeout: Duration,
}

impl OAuth2TokenExchanger {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn client(tenant: &Tenant) -> HandshakeResult<GroupClient> {
        let token_url = TokenUrl::new(tenant.oauth_token_url.clone())
            .map_err(|e| HandshakeError::token_exchange(format!("malformed token URL: {e}")))?;
        // The platform has no authorization endpoint; the client type still wants one.
        let auth_url = AuthUrl::new(tenant.oauth_token_url.clone())
            .map_err(|e| HandshakeError::token_exchange(format!("malformed token URL: {e}")))?;

        Ok(GroupClient::new(
            ClientId::new(tenant.oauth_id.clone()),
            Some(ClientSecret::new(tenant.oauth_secret.clone())),
            auth_url,
            Some(token_url),
        ))
    }
}

fn group_id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl TokenExchanger for OAuth2TokenExchanger {
    async fn exchange(&self, tenant: &Tenant) -> HandshakeResult<AccessToken> {
        let client = Self::client(tenant)?;
        let scopes: Vec<Scope> = tenant
            .scope_list()
            .into_iter()
            .map(|s| Scope::new(s.to_string()))
            .collect();

        debug!(oauth_id = %tenant.oauth_id, "requesting access token");
        let request = client.exchange_client_credentials().add_scopes(scopes);
        let token = tokio::time::timeout(self.timeout, request.request_async(async_http_client))
            .await
            .map_err(|_| HandshakeError::token_exchange("request timed out"))?
            .map_err(|e| {
                warn!(oauth_id = %tenant.oauth_id, error = %e, "token endpoint rejected the exchange");
                HandshakeError::token_exchange(e.to_string())
            })?;

        let extra = token.extra_fields();
        let expires_at = token
            .expires_in()
            .and_then(|d| chrono::Duration::from_std(d).ok())
            .map(|d| Utc::now() + d);
        let scopes = token
            .scopes()
            .map(|granted| granted.iter().map(|s| s.to_string()).collect())
            .unwrap_or_else(|| tenant.scope_list().into_iter().map(str::to_string).collect());

        Ok(AccessToken {
            access_token: token.access_token().secret().clone(),
            group_name: extra.group_name.clone(),
            group_id: extra.group_id.as_ref().and_then(group_id_string),
            scopes,
            expires_at,
        })
    }
}

/// Access tokens for installed tenants, reused until they expire.
///
/// Entries live under the tenant's `oauth_id` with kind `token`, so an
/// uninstall drops them along with the tenant record.
pub struct TokenCache {
    storage: Arc<dyn StorageBackend>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl TokenCache {
    pub fn new(storage: Arc<dyn StorageBackend>, exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self { storage, exchanger }
    }

    pub async fn access_token(&self, tenant: &Tenant) -> HandshakeResult<AccessToken> {
        if let Some(raw) = self.storage.get(&tenant.oauth_id, TOKEN_KIND).await? {
            match serde_json::from_str::<AccessToken>(&raw) {
                Ok(token) if !token.is_expired(Utc::now()) => return Ok(token),
                Ok(_) => debug!(oauth_id = %tenant.oauth_id, "cached token expired"),
                Err(e) => warn!(oauth_id = %tenant.oauth_id, error = %e, "discarding unreadable cached token"),
            }
        }

        let token = self.exchanger.exchange(tenant).await?;
        let raw = serde_json::to_string(&token).map_err(dach_core::StorageError::from)?;
        self.storage.set(&tenant.oauth_id, TOKEN_KIND, raw).await?;
        Ok(token)
    }
}
