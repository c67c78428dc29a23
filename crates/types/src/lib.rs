//! Shared type definitions for devtools.
//!
//! This crate holds the plain data models other crates exchange: the plugin
//! descriptor tree parsed from `meta.yml` and the resolved settings object.

pub mod descriptor;
pub mod settings;

pub use descriptor::{CommandNode, CommandOption, DescriptorError, PluginDescriptor, PluginKind};
pub use settings::{
    AnsibleConfig, CommonConfig, DockerConfig, GlobalConfig, LangConfig, OhMyzshConfig, OhMyzshPlugin,
};
