//! Named managers and the registry that holds them.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::context::InvocationContext;
use crate::error::ManagerError;

mod git;
pub mod ohmyzsh;
pub mod self_manage;

pub use ohmyzsh::{OhMyzshManager, OhMyzshParams};
pub use self_manage::{SelfManager, SelfParams};

/// Something that can be installed, removed and updated.
///
/// Each operation resolves its own parameter bundle from `ctx`.
#[async_trait]
pub trait Manager: Send + Sync {
    async fn install(&self, ctx: &InvocationContext) -> anyhow::Result<()>;
    async fn uninstall(&self, ctx: &InvocationContext) -> anyhow::Result<()>;
    async fn update(&self, ctx: &InvocationContext) -> anyhow::Result<()>;
}

/// Thread-safe name → manager map.
#[derive(Default)]
pub struct ManagerRegistry {
    managers: RwLock<HashMap<String, Arc<dyn Manager>>>,
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry").field("names", &self.names()).finish()
    }
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in manager.
    pub fn with_builtin_managers() -> Self {
        let registry = Self::new();
        registry.register(ohmyzsh::MANAGER_NAME, Arc::new(OhMyzshManager::default()));
        registry.register(self_manage::MANAGER_NAME, Arc::new(SelfManager::default()));
        registry
    }

    /// Registers `manager` under `name`. A later registration replaces an earlier one.
    pub fn register(&self, name: impl Into<String>, manager: Arc<dyn Manager>) {
        let name = name.into();
        let mut managers = self.managers.write().unwrap_or_else(PoisonError::into_inner);
        if managers.insert(name.clone(), manager).is_some() {
            debug!(manager = %name, "replaced registered manager");
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Manager>, ManagerError> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound { name: name.to_string() })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
