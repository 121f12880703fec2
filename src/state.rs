//! State shared by the orchestrators, the dev router, the HTML multiplexer and the reload
//! notifier. One `AssetState` is created per process and handed out as an `Arc`.

use crate::registry::AssetRegistry;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct AssetState {
    registry: RwLock<AssetRegistry>,
    active_language: RwLock<Option<String>>,
}

pub type SharedState = Arc<AssetState>;

impl AssetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Self::new())
    }

    pub fn registry(&self) -> RwLockReadGuard<'_, AssetRegistry> {
        self.registry.read()
    }

    pub fn registry_mut(&self) -> RwLockWriteGuard<'_, AssetRegistry> {
        self.registry.write()
    }

    /// The language the dev server believes the connected client is viewing.
    pub fn active_language(&self) -> Option<String> {
        self.active_language.read().clone()
    }

    pub fn set_active_language(&self, language: Option<String>) {
        let mut active = self.active_language.write();
        if *active != language {
            tracing::debug!(
                "[AssetState] Active language changed: {:?} -> {:?}",
                *active,
                language
            );
            *active = language;
        }
    }
}
