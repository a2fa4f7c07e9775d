//! dach-core: framework-agnostic core for Dach add-ons.

pub mod config;
pub mod errors;
pub mod events;
pub mod storage;
pub mod tenant;

pub use config::{AppConfig, DachConfig, RemoteTimeouts};
pub use errors::{DachError, DachResult, ErrorKind};
pub use events::{
    listener, parse_event_pattern, DachEventHub, EventListener, EventPattern, LifecycleEvent,
    LifecycleEventKind, ListenerId, Notifier,
};
pub use storage::{
    load_tenant, MemoryStorage, StorageBackend, StorageError, StorageResult, TENANT_KIND, TOKEN_KIND,
};
pub use tenant::Tenant;
