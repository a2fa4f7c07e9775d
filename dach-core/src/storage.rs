use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::tenant::Tenant;

/// Record kind for persisted tenants.
pub const TENANT_KIND: &str = "tenant";
/// Record kind for cached access tokens.
pub const TOKEN_KIND: &str = "token";

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {source}")]
    Backend {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Create a backend error from any error type
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            source: Box::new(error),
        }
    }
}

/// Key-value persistence for add-on records.
///
/// Each key may hold several records, one per kind. Writes are single-key
/// upserts; `delete` drops every kind stored under the key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn set(&self, key: &str, kind: &str, value: String) -> StorageResult<()>;

    async fn get(&self, key: &str, kind: &str) -> StorageResult<Option<String>>;

    async fn delete(&self, key: &str) -> StorageResult<()>;
}

/// Read back a persisted tenant.
pub async fn load_tenant(
    storage: &dyn StorageBackend,
    oauth_id: &str,
) -> StorageResult<Option<Tenant>> {
    match storage.get(oauth_id, TENANT_KIND).await? {
        Some(raw) => Ok(Some(Tenant::from_json(&raw)?)),
        None => Ok(None),
    }
}

/// In-memory backend for tests and development
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding at least one record.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn set(&self, key: &str, kind: &str, value: String) -> StorageResult<()> {
        self.records
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(kind.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str, kind: &str) -> StorageResult<Option<String>> {
        Ok(self
            .records
            .read()
            .get(key)
            .and_then(|kinds| kinds.get(kind))
            .cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.records.write().remove(key);
        Ok(())
    }
}
