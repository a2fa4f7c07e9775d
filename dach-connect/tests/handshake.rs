use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dach_connect::{HandshakeError, Installer};
use dach_core::{
    load_tenant, AppConfig, DachConfig, LifecycleEvent, MemoryStorage, Notifier, RemoteTimeouts,
    StorageBackend, StorageError, StorageResult, TENANT_KIND, TOKEN_KIND,
};
use httpmock::prelude::*;
use serde_json::json;

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _event: &LifecycleEvent) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("listener unavailable"))
    }
}

struct ReadOnlyStorage;

#[async_trait]
impl StorageBackend for ReadOnlyStorage {
    async fn set(&self, _key: &str, _kind: &str, _value: String) -> StorageResult<()> {
        Err(StorageError::backend(std::io::Error::other("read-only")))
    }

    async fn get(&self, _key: &str, _kind: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::backend(std::io::Error::other("read-only")))
    }
}

fn config() -> DachConfig {
    DachConfig::new()
        .with_app("echo", AppConfig::new(["send_notification", "view_group"]))
        .with_timeouts(RemoteTimeouts {
            capabilities_secs: 2,
            token_secs: 2,
        })
}

fn capabilities_doc(server: &MockServer, self_link: &str) -> String {
    json!({
        "links": { "self": self_link, "api": server.url("/api") },
        "capabilities": { "oauth2Provider": { "tokenUrl": server.url("/token") } }
    })
    .to_string()
}

fn mock_capabilities<'a>(server: &'a MockServer, self_link: &str) -> httpmock::Mock<'a> {
    let body = capabilities_doc(server, self_link);
    server.mock(|when, then| {
        when.method(GET).path("/cap").header("accept", "application/json");
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

fn mock_token<'a>(server: &'a MockServer, group_name: &str) -> httpmock::Mock<'a> {
    let body = json!({
        "access_token": "tok",
        "token_type": "bearer",
        "expires_in": 3600,
        "group_id": 1,
        "group_name": group_name,
        "scope": "send_notification view_group"
    })
    .to_string();
    server.mock(|when, then| {
        // Basic base64("abc:s"), scopes space-joined in configured order.
        when.method(POST)
            .path("/token")
            .header("authorization", "Basic YWJjOnM=")
            .body_includes("grant_type=client_credentials")
            .body_includes("scope=send_notification+view_group");
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    })
}

fn payload(server: &MockServer, oauth_id: &str, group_id: &str) -> Vec<u8> {
    json!({
        "capabilitiesUrl": server.url("/cap"),
        "oauthId": oauth_id,
        "oauthSecret": "s",
        "groupId": group_id,
    })
    .to_string()
    .into_bytes()
}

fn installer(storage: Arc<dyn StorageBackend>, notifier: Arc<dyn Notifier>) -> Installer {
    Installer::new(config(), storage, notifier).unwrap()
}

#[tokio::test]
async fn install_persists_tenant_and_notifies_once() {
    let server = MockServer::start();
    let cap = mock_capabilities(&server, &server.url("/cap"));
    let token = mock_token(&server, "Acme");

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let tenant = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap();

    cap.assert();
    token.assert();

    let stored = load_tenant(storage.as_ref(), "abc").await.unwrap().unwrap();
    assert_eq!(stored, tenant);
    assert_eq!(stored.oauth_id, "abc");
    assert_eq!(stored.api_url, server.url("/api"));
    assert_eq!(stored.oauth_token_url, server.url("/token"));
    assert_eq!(stored.group_name.as_deref(), Some("Acme"));
    assert_eq!(stored.room_id, None);
    assert_eq!(stored.app_name, "echo");
    assert_eq!(stored.scopes, "send_notification|view_group");

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        LifecycleEvent::Installed { app_name, tenant } => {
            assert_eq!(app_name, "echo");
            assert_eq!(tenant, &stored);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn self_link_mismatch_persists_nothing() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, "https://elsewhere.example/cap");
    let token = mock_token(&server, "Acme");

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::CapabilityMismatch { .. }));
    assert_eq!(token.calls(), 0);
    assert!(storage.is_empty());
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn capabilities_fetch_failure_reports_status() {
    let server = MockServer::start();
    let _cap = server.mock(|when, then| {
        when.method(GET).path("/cap");
        then.status(404).body("Not Found");
    });

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    match err {
        HandshakeError::RemoteFetch { status, .. } => assert_eq!(status, Some(404)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(storage.is_empty());
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn slow_capabilities_server_times_out() {
    let server = MockServer::start();
    let body = capabilities_doc(&server, &server.url("/cap"));
    let _cap = server.mock(|when, then| {
        when.method(GET).path("/cap");
        then.status(200)
            .header("content-type", "application/json")
            .body(body)
            .delay(Duration::from_secs(5));
    });

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::RemoteFetch { status: None, .. }));
    assert!(storage.is_empty());
}

#[tokio::test]
async fn rejected_token_exchange_persists_nothing() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(401)
            .header("content-type", "application/json")
            .body(json!({"error": "invalid_client"}).to_string());
    });

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::TokenExchange { .. }));
    assert!(storage.is_empty());
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = server.mock(|when, then| {
        when.method(POST).path("/token");
        then.status(200)
            .header("content-type", "application/json")
            .body(json!({"access_token": "tok", "token_type": "bearer", "group_name": "Acme"}).to_string())
            .delay(Duration::from_secs(5));
    });

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let config = config().with_timeouts(RemoteTimeouts {
        capabilities_secs: 2,
        token_secs: 1,
    });
    let installer = Installer::new(config, storage.clone(), notifier.clone()).unwrap();

    let started = std::time::Instant::now();
    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::TokenExchange { .. }));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(storage.is_empty());
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn missing_token_url_surfaces_as_exchange_failure() {
    let server = MockServer::start();
    let body = json!({ "links": { "self": server.url("/cap") } }).to_string();
    let _cap = server.mock(|when, then| {
        when.method(GET).path("/cap");
        then.status(200)
            .header("content-type", "application/json")
            .body(body);
    });

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::TokenExchange { .. }));
    assert!(storage.is_empty());
}

#[tokio::test]
async fn reinstall_overwrites_previous_record() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = mock_token(&server, "Acme");

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap();
    installer.install("echo", &payload(&server, "abc", "g2")).await.unwrap();

    assert_eq!(storage.len(), 1);
    let stored = load_tenant(storage.as_ref(), "abc").await.unwrap().unwrap();
    assert_eq!(stored.group_id, "g2");
    assert_eq!(notifier.events().len(), 2);
}

#[tokio::test]
async fn reinstall_drops_token_cached_for_previous_install() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = mock_token(&server, "Acme");

    let storage = Arc::new(MemoryStorage::new());
    storage.set("abc", TOKEN_KIND, r#"{"access_token":"stale"}"#.into()).await.unwrap();
    let installer = installer(storage.clone(), Arc::new(RecordingNotifier::default()));

    installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap();

    assert!(storage.get("abc", TOKEN_KIND).await.unwrap().is_none());
    assert!(storage.get("abc", TENANT_KIND).await.unwrap().is_some());
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_any_remote_call() {
    let server = MockServer::start();
    let cap = mock_capabilities(&server, &server.url("/cap"));

    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer
        .install("echo", br#"{"capabilitiesUrl":"https://x/cap","oauthId":"abc"}"#)
        .await
        .unwrap_err();

    assert!(matches!(err, HandshakeError::InvalidPayload { .. }));
    assert_eq!(cap.calls(), 0);
    assert!(storage.is_empty());
}

#[tokio::test]
async fn unknown_addon_is_rejected() {
    let server = MockServer::start();
    let storage = Arc::new(MemoryStorage::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    let err = installer.install("poll", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::UnknownAddon { .. }));
}

#[tokio::test]
async fn storage_failure_fails_install_without_notifying() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = mock_token(&server, "Acme");

    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(Arc::new(ReadOnlyStorage), notifier.clone());

    let err = installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap_err();

    assert!(matches!(err, HandshakeError::Storage(_)));
    assert!(notifier.events().is_empty());
}

#[tokio::test]
async fn notification_failure_keeps_the_install() {
    let server = MockServer::start();
    let _cap = mock_capabilities(&server, &server.url("/cap"));
    let _token = mock_token(&server, "Acme");

    let storage = Arc::new(MemoryStorage::new());
    let installer = installer(storage.clone(), Arc::new(FailingNotifier));

    installer.install("echo", &payload(&server, "abc", "g1")).await.unwrap();

    assert!(storage.get("abc", TENANT_KIND).await.unwrap().is_some());
}

#[tokio::test]
async fn uninstall_removes_record_and_notifies_once() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set("abc", TENANT_KIND, "{}".into()).await.unwrap();
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(storage.clone(), notifier.clone());

    installer.uninstall("echo", "abc").await.unwrap();
    installer.uninstall("echo", "never-installed").await.unwrap();

    assert!(storage.is_empty());
    let events = notifier.events();
    assert_eq!(events.len(), 2);
    assert!(matches!(
        &events[0],
        LifecycleEvent::Uninstalled { oauth_id, .. } if oauth_id == "abc"
    ));
}

#[tokio::test]
async fn uninstall_propagates_storage_failure() {
    let notifier = Arc::new(RecordingNotifier::default());
    let installer = installer(Arc::new(ReadOnlyStorage), notifier.clone());

    let err = installer.uninstall("echo", "abc").await.unwrap_err();

    assert!(matches!(err, HandshakeError::Storage(_)));
    assert!(notifier.events().is_empty());
}
