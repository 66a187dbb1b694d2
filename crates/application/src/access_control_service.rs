use std::sync::Arc;

use crate::{PermissionStore, Registry};

mod managed;
mod resolve;
mod search;


/// Application service resolving and searching role-based permissions.
///
/// The service never mutates fixed or basic roles; it reads them from the
/// committed [`Registry`] and reads everything else from the store.
#[derive(Clone)]
pub struct AccessControlService {
    store: Arc<dyn PermissionStore>,
    registry: Arc<Registry>,
}

impl AccessControlService {
    /// Creates a service from a store and a committed registry.
    #[must_use]
    pub fn new(store: Arc<dyn PermissionStore>, registry: Arc<Registry>) -> Self {
        Self { store, registry }
    }

    /// Returns the committed registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        self.registry.as_ref()
    }
}
