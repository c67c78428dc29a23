//! Plugin discovery and command tree assembly for devtools.
//!
//! Declarative plugins are directories holding a `meta.yml` descriptor next
//! to the scripts or playbooks that back each command. This crate loads those
//! descriptors, picks an executor per plugin kind, and assembles runnable
//! command handles that render to a clap parser.

pub mod clap_builder;
pub mod command_tree;
pub mod config;
pub mod error;
pub mod executor;
pub mod loader;
pub mod models;

pub use clap_builder::{ARGS_ID, CommandAction, CommandHandle, FlagSpec, Invocation};
pub use command_tree::{ScriptAction, build_command_tree};
pub use config::{ResolvedSettings, SettingsOptions, load_settings, load_settings_from_path, save_settings};
pub use error::{ConfigError, DispatchError, ExecError, LoadError};
pub use executor::{PlaybookExecutor, ScriptExecutor, ShellExecutor, executor_for};
pub use loader::{DiscoveredPlugin, META_FILE_NAME, PluginScan, load_descriptor, scan_plugins};
pub use models::{CommandRegistry, ROOT_COMMAND_NAME};
