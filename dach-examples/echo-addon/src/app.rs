use std::sync::Arc;

use anyhow::Result;
use dach_axum::{axum, AxumApp, FileDescriptorSource};
use dach_connect::{Installer, TokenCache};
use dach_core::{listener, DachEventHub, LifecycleEvent, MemoryStorage, Notifier, StorageBackend};

use crate::config::EchoSettings;

pub fn echo_app(settings: EchoSettings) -> Result<AxumApp> {
    let storage: Arc<dyn StorageBackend> = Arc::new(MemoryStorage::new());
    let hub = Arc::new(DachEventHub::new());
    let notifier: Arc<dyn Notifier> = hub.clone();

    let installer = Installer::new(settings.dach, Arc::clone(&storage), notifier)?;
    let tokens = Arc::new(TokenCache::new(Arc::clone(&storage), installer.exchanger()));
    register_listeners(&hub, tokens)?;

    let descriptors = Arc::new(FileDescriptorSource::new(settings.templates));
    let ax = axum(installer, descriptors)
        .use_addon("/echo/setup", "echo")
        .use_get("/health", || async { "ok" });
    Ok(ax)
}

fn register_listeners(hub: &DachEventHub, tokens: Arc<TokenCache>) -> Result<()> {
    // Warm the token cache so the first outbound call does not pay for the exchange.
    hub.on_str(
        "echo.installed",
        listener(move |event| {
            let tokens = Arc::clone(&tokens);
            async move {
                if let LifecycleEvent::Installed { tenant, .. } = event {
                    tokens.access_token(&tenant).await?;
                    tracing::info!(oauth_id = %tenant.oauth_id, room = ?tenant.room_id, "echo ready");
                }
                Ok(())
            }
        }),
    )?;

    hub.on_str(
        "*.uninstalled",
        listener(|event| async move {
            tracing::info!(app = event.app_name(), oauth_id = event.oauth_id(), "add-on removed");
            Ok(())
        }),
    )?;

    Ok(())
}
