//! Manager-backed commands for devtools.
//!
//! Built-in managers implement [`manager::Manager`] and are looked up by name
//! in a [`manager::ManagerRegistry`]. Each operation receives an
//! [`context::InvocationContext`] and resolves its own typed parameters from
//! it with [`resolve::resolve`].

pub mod adapter;
pub mod context;
pub mod error;
pub mod manager;
pub mod resolve;

pub use adapter::{
    ManagerAction, Operation, PluginSpec, SubcommandSpec, builtin_plugin_specs, register_builtin_commands,
    standard_subcommands,
};
pub use context::{ContextValue, InvocationContext};
pub use error::{DecodeError, ManagerError};
pub use manager::{Manager, ManagerRegistry};
pub use resolve::{Binding, ParameterBundle, resolve};
