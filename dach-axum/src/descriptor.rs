use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dach_core::bail_dach;
use dach_core::errors::{DachError, DachResult};
use serde_json::Value;
use tracing::{debug, warn};

/// Loads an add-on descriptor by its configured template path.
///
/// Template rendering lives behind this port; the HTTP layer only serves
/// whatever JSON the source hands back.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn load(&self, template: &str) -> DachResult<Value>;
}

/// Serves descriptor files from a template root, unmodified.
pub struct FileDescriptorSource {
    root: PathBuf,
}

impl FileDescriptorSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, template: &str) -> Option<PathBuf> {
        let relative = Path::new(template);
        let mut components = relative.components().peekable();
        let plain = components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)));
        plain.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl DescriptorSource for FileDescriptorSource {
    async fn load(&self, template: &str) -> DachResult<Value> {
        let Some(path) = self.resolve(template) else {
            bail_dach!(not_found, "descriptor template {} not found", template);
        };
        debug!(path = %path.display(), "loading descriptor");

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                bail_dach!(not_found, "descriptor template {} not found", template);
            }
            Err(e) => return Err(DachError::general_error("cannot read descriptor").with_source(e.into()).into_anyhow()),
        };

        serde_json::from_str(&raw).map_err(|e| {
            warn!(path = %path.display(), error = %e, "descriptor is not valid JSON");
            DachError::general_error(format!("descriptor template {template} is not valid JSON"))
                .with_source(e.into())
                .into_anyhow()
        })
    }
}
