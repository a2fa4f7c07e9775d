use std::sync::Arc;

use dach_connect::Installer;

use crate::descriptor::DescriptorSource;

/// Per-add-on handler state: the shared installer plus the add-on's name,
/// passed explicitly instead of being read from the routed path.
pub struct DachAxumState {
    pub installer: Arc<Installer>,
    pub descriptors: Arc<dyn DescriptorSource>,
    pub app_name: Arc<str>,
}

impl Clone for DachAxumState {
    fn clone(&self) -> Self {
        Self {
            installer: Arc::clone(&self.installer),
            descriptors: Arc::clone(&self.descriptors),
            app_name: Arc::clone(&self.app_name),
        }
    }
}

impl DachAxumState {
    pub fn new(
        installer: Arc<Installer>,
        descriptors: Arc<dyn DescriptorSource>,
        app_name: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            installer,
            descriptors,
            app_name: app_name.into(),
        }
    }
}
