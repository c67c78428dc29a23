//! Per-invocation parameter store handed to managers.
//!
//! Entries are either serializable data (settings sections, env maps) kept
//! as JSON, or shared services (the UI sink, raw argument matches) kept as
//! type-erased handles. The store also carries the invocation's
//! cancellation token.

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::DecodeError;

/// Manager-specific settings section.
pub const CFG_KEY: &str = "cfg";
/// Settings shared by every command (`CommonConfig`).
pub const GLOBAL_KEY: &str = "global";
/// The `Arc<dyn Ui>` sink.
pub const UI_KEY: &str = "ui";
/// Raw `ArgMatches` of the dispatched command.
pub const CMD_KEY: &str = "cmd";
/// Extra environment for spawned children.
pub const ENV_KEY: &str = "env";

#[derive(Clone)]
pub enum ContextValue {
    Data(Value),
    Service(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::Data(value) => f.debug_tuple("Data").field(value).finish(),
            ContextValue::Service(_) => f.write_str("Service(..)"),
        }
    }
}

/// Insertion-ordered key/value store for one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    values: IndexMap<String, ContextValue>,
    cancellation: CancellationToken,
}

impl InvocationContext {
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            values: IndexMap::new(),
            cancellation,
        }
    }

    /// Stores `value` as a data entry, replacing any previous entry under `key`.
    pub fn insert_data<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<(), DecodeError> {
        let key = key.into();
        let json = serde_json::to_value(value).map_err(|error| DecodeError::new(&key, type_name::<T>(), error))?;
        self.values.insert(key, ContextValue::Data(json));
        Ok(())
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), ContextValue::Data(value));
    }

    /// Stores a shared service. Bindings retrieve it by its exact type `T`.
    pub fn insert_service<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, service: T) {
        self.values.insert(key.into(), ContextValue::Service(Arc::new(service)));
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}
