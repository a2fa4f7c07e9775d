use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::get;
use axum::Router;
use dach_connect::Installer;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::descriptor::DescriptorSource;
use crate::routes::addon_router;
use crate::DachAxumState;

pub struct AxumApp {
    pub installer: Arc<Installer>,
    pub descriptors: Arc<dyn DescriptorSource>,
    pub router: Router<()>,
}

impl Clone for AxumApp {
    fn clone(&self) -> Self {
        Self {
            installer: Arc::clone(&self.installer),
            descriptors: Arc::clone(&self.descriptors),
            router: self.router.clone(),
        }
    }
}

impl AxumApp {
    pub fn new(installer: Installer, descriptors: Arc<dyn DescriptorSource>) -> Self {
        Self {
            installer: Arc::new(installer),
            descriptors,
            router: Router::new(),
        }
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.router = self.router.nest(path, router);
        self
    }

    pub fn use_get<H, T>(self, path: &str, handler: H) -> Self
    where
        H: Handler<T, ()> + Clone + Send + 'static,
        T: 'static,
    {
        let router = Router::new().route("/", get(handler));
        self.use_router(path, router)
    }

    /// Mount the lifecycle endpoints of `app_name` under `path`.
    pub fn use_addon(self, path: &str, app_name: &str) -> Self {
        let state = DachAxumState::new(Arc::clone(&self.installer), Arc::clone(&self.descriptors), app_name);
        let router = addon_router(state);
        self.use_router(path, router)
    }

    /// Final router with tracing and `x-request-id` handling.
    pub fn into_router(self) -> Router<()> {
        self.router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, self.into_router()).await?;
        Ok(())
    }
}

pub fn axum(installer: Installer, descriptors: Arc<dyn DescriptorSource>) -> AxumApp {
    AxumApp::new(installer, descriptors)
}
