use std::future::Future;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::tenant::Tenant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// The two lifecycle outcomes an add-on can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    Installed,
    Uninstalled,
}

impl LifecycleEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEventKind::Installed => "install",
            LifecycleEventKind::Uninstalled => "uninstall",
        }
    }
}

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Installed { app_name: String, tenant: Tenant },
    Uninstalled { app_name: String, oauth_id: String },
}

impl LifecycleEvent {
    pub fn kind(&self) -> LifecycleEventKind {
        match self {
            LifecycleEvent::Installed { .. } => LifecycleEventKind::Installed,
            LifecycleEvent::Uninstalled { .. } => LifecycleEventKind::Uninstalled,
        }
    }

    pub fn app_name(&self) -> &str {
        match self {
            LifecycleEvent::Installed { app_name, .. } | LifecycleEvent::Uninstalled { app_name, .. } => {
                app_name
            }
        }
    }

    pub fn oauth_id(&self) -> &str {
        match self {
            LifecycleEvent::Installed { tenant, .. } => &tenant.oauth_id,
            LifecycleEvent::Uninstalled { oauth_id, .. } => oauth_id,
        }
    }
}

/// Outbound port for lifecycle notifications.
///
/// Called after the outcome is final; a failure here never undoes it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &LifecycleEvent) -> Result<()>;
}

pub type ListenerFut = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Listener signature (async). Each listener receives its own copy of the event.
pub type EventListener = Arc<dyn Fn(LifecycleEvent) -> ListenerFut + Send + Sync>;

/// Wrap an async closure as an [`EventListener`].
pub fn listener<F, Fut>(f: F) -> EventListener
where
    F: Fn(LifecycleEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event: LifecycleEvent| Box::pin(f(event)) as ListenerFut)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppPat {
    Any,
    Exact(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventPat {
    Any,
    Exact(LifecycleEventKind),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventPattern {
    pub app: AppPat,
    pub event: EventPat,
}

impl EventPattern {
    pub fn exact(app: impl Into<String>, event: LifecycleEventKind) -> Self {
        Self {
            app: AppPat::Exact(app.into()),
            event: EventPat::Exact(event),
        }
    }

    pub fn any() -> Self {
        Self {
            app: AppPat::Any,
            event: EventPat::Any,
        }
    }

    pub fn matches(&self, app_name: &str, event: LifecycleEventKind) -> bool {
        let app_ok = match &self.app {
            AppPat::Any => true,
            AppPat::Exact(a) => a == app_name,
        };
        let event_ok = match &self.event {
            EventPat::Any => true,
            EventPat::Exact(e) => *e == event,
        };
        app_ok && event_ok
    }
}

/// Parse sugar strings like "echo.installed", "echo.*", "*.uninstalled"
pub fn parse_event_pattern(input: &str) -> Result<EventPattern> {
    let s = input.trim();

    let Some((app, ev)) = s.split_once('.') else {
        return Err(anyhow!("Invalid event pattern '{s}'. Expected 'app.event'."));
    };
    let (app, ev) = (app.trim(), ev.trim());

    let app = if app == "*" {
        AppPat::Any
    } else {
        AppPat::Exact(app.to_string())
    };

    let event = if ev == "*" {
        EventPat::Any
    } else {
        EventPat::Exact(parse_event_kind(ev)?)
    };

    Ok(EventPattern { app, event })
}

pub fn parse_event_kind(s: &str) -> Result<LifecycleEventKind> {
    match s.trim().to_lowercase().as_str() {
        "install" | "installed" => Ok(LifecycleEventKind::Installed),
        "uninstall" | "uninstalled" => Ok(LifecycleEventKind::Uninstalled),
        other => Err(anyhow!("Unknown lifecycle event '{other}'")),
    }
}

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    pattern: EventPattern,
    listener: EventListener,
    once: bool,
}

/// In-process event hub that fans lifecycle events out to listeners.
///
/// Emission snapshots matching listeners under a read lock and drops fired
/// `once` listeners under a write lock before awaiting anything, so no lock
/// is held across `.await`.
#[derive(Default)]
pub struct DachEventHub {
    listeners: RwLock<Vec<ListenerEntry>>,
}

impl DachEventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// hub.on(EventPattern::exact("echo", Installed), ...)
    pub fn on(&self, pattern: EventPattern, listener: EventListener) -> ListenerId {
        self.push(pattern, listener, false)
    }

    /// Sugar: hub.on_str("echo.installed", ...)
    pub fn on_str(&self, pattern: &str, listener: EventListener) -> Result<ListenerId> {
        Ok(self.on(parse_event_pattern(pattern)?, listener))
    }

    /// Fires at most once, then removes itself.
    pub fn once(&self, pattern: EventPattern, listener: EventListener) -> ListenerId {
        self.push(pattern, listener, true)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|e| e.id != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn push(&self, pattern: EventPattern, listener: EventListener, once: bool) -> ListenerId {
        let id = next_listener_id();
        self.listeners.write().push(ListenerEntry {
            id,
            pattern,
            listener,
            once,
        });
        id
    }

    fn snapshot(&self, event: &LifecycleEvent) -> (Vec<EventListener>, Vec<ListenerId>) {
        let mut to_call = Vec::new();
        let mut once_ids = Vec::new();

        for entry in self.listeners.read().iter() {
            if entry.pattern.matches(event.app_name(), event.kind()) {
                to_call.push(Arc::clone(&entry.listener));
                if entry.once {
                    once_ids.push(entry.id);
                }
            }
        }

        (to_call, once_ids)
    }
}

#[async_trait]
impl Notifier for DachEventHub {
    /// Every matching listener runs; the first failure is returned afterwards.
    async fn notify(&self, event: &LifecycleEvent) -> Result<()> {
        let (listeners, once_ids) = self.snapshot(event);

        if !once_ids.is_empty() {
            self.listeners.write().retain(|e| !once_ids.contains(&e.id));
        }

        let mut first_error = None;
        for f in &listeners {
            if let Err(e) = f(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
