//! Descriptor model for declarative plugins.
//!
//! A plugin directory carries a `meta.yml` document describing the plugin's
//! name, backend kind and command tree. These types mirror that document one
//! to one and carry no behavior beyond structural validation.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Option names taken by the argument parser and the global flags.
pub const RESERVED_OPTION_NAMES: &[&str] = &["help", "args", "debug", "root-dir", "config"];

/// Short aliases taken by the argument parser and the global flags.
pub const RESERVED_SHORT_ALIASES: &[char] = &['h', 'r', 'c'];

/// Backend that runs the artifacts of a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginKind {
    /// Shell scripts (`.sh`) run through `bash`.
    #[serde(rename = "shell")]
    Shell,
    /// Ansible playbooks (`.yml`) run against the local host.
    #[serde(rename = "ansible")]
    Playbook,
}

impl std::fmt::Display for PluginKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginKind::Shell => write!(f, "shell"),
            PluginKind::Playbook => write!(f, "ansible"),
        }
    }
}

/// Root of a plugin's declared command tree.
///
/// A descriptor with no `commands` is a single-action plugin: invoking the
/// plugin's top-level command runs the artifact named after the plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub commands: BTreeMap<String, CommandNode>,
}

/// One command (or subcommand) in a descriptor's tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNode {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subcommands: BTreeMap<String, CommandNode>,
}

/// A declared command-line option; maps 1:1 to a flag on the generated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<char>,
    #[serde(default)]
    pub description: String,
    /// Default value pre-filled on the generated flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Structural problems found in an otherwise parseable descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("plugin name must not be empty")]
    EmptyPluginName,

    #[error("command name must not be empty (under '{parent}')")]
    EmptyCommandName { parent: String },

    #[error("option name must not be empty (command '{command}')")]
    EmptyOptionName { command: String },

    #[error("option '{option}' is declared more than once on command '{command}'")]
    DuplicateOption { command: String, option: String },

    #[error("option '{option}' on command '{command}' uses a reserved name")]
    ReservedOption { command: String, option: String },

    #[error("short alias '-{short}' on command '{command}' is declared more than once or reserved")]
    InvalidShortAlias { command: String, short: char },
}

impl PluginDescriptor {
    /// Returns true when the plugin declares no commands and runs a single artifact.
    pub fn is_single_action(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of command levels below the plugin root.
    pub fn depth(&self) -> usize {
        self.commands.values().map(CommandNode::depth).max().unwrap_or(0)
    }

    /// Checks the constraints the schema alone cannot express.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.name.trim().is_empty() {
            return Err(DescriptorError::EmptyPluginName);
        }
        validate_children(&self.name, &self.commands)
    }
}

impl CommandNode {
    /// A node with no subcommands is a leaf and resolves to exactly one artifact.
    pub fn is_leaf(&self) -> bool {
        self.subcommands.is_empty()
    }

    /// Height of this subtree, counting this node as one level.
    pub fn depth(&self) -> usize {
        1 + self.subcommands.values().map(CommandNode::depth).max().unwrap_or(0)
    }

    fn validate(&self, path: &str) -> Result<(), DescriptorError> {
        let mut names = HashSet::new();
        let mut shorts = HashSet::new();
        for option in &self.options {
            if option.name.trim().is_empty() {
                return Err(DescriptorError::EmptyOptionName { command: path.to_string() });
            }
            if RESERVED_OPTION_NAMES.contains(&option.name.as_str()) {
                return Err(DescriptorError::ReservedOption {
                    command: path.to_string(),
                    option: option.name.clone(),
                });
            }
            if !names.insert(option.name.as_str()) {
                return Err(DescriptorError::DuplicateOption {
                    command: path.to_string(),
                    option: option.name.clone(),
                });
            }
            if let Some(short) = option.short
                && (RESERVED_SHORT_ALIASES.contains(&short) || !shorts.insert(short))
            {
                return Err(DescriptorError::InvalidShortAlias {
                    command: path.to_string(),
                    short,
                });
            }
        }
        validate_children(path, &self.subcommands)
    }
}

fn validate_children(parent: &str, children: &BTreeMap<String, CommandNode>) -> Result<(), DescriptorError> {
    for (name, node) in children {
        if name.trim().is_empty() {
            return Err(DescriptorError::EmptyCommandName { parent: parent.to_string() });
        }
        node.validate(&format!("{parent} {name}"))?;
    }
    Ok(())
}
