use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgMatches, Command as ClapCommand};
use devtools_types::GlobalConfig;
use devtools_util::Ui;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clap_builder::CommandHandle;
use crate::command_tree::build_command_tree;
use crate::error::DispatchError;
use crate::executor::executor_for;
use crate::loader::scan_plugins;

/// Name of the binary's root command.
pub const ROOT_COMMAND_NAME: &str = "devtools";

/// The assembled top-level command surface.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    /// Top-level commands in registration order.
    pub commands: Vec<CommandHandle>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a top-level command. Returns false, and keeps the existing
    /// command, when the name is already taken.
    pub fn insert(&mut self, handle: CommandHandle) -> bool {
        if self.get(&handle.name).is_some() {
            warn!(command = %handle.name, "a command with this name is already registered; skipping");
            return false;
        }
        self.commands.push(handle);
        true
    }

    pub fn get(&self, name: &str) -> Option<&CommandHandle> {
        self.commands.iter().find(|handle| handle.name == name)
    }

    /// Scans `plugins_root` and registers one top-level command per plugin.
    ///
    /// Returns the number of plugins registered.
    pub fn load_plugins(&mut self, plugins_root: &Path, settings: &GlobalConfig, ui: Arc<dyn Ui>) -> usize {
        let scan = scan_plugins(plugins_root);
        let mut registered = 0;
        for plugin in scan.plugins {
            let executor = executor_for(plugin.descriptor.kind, settings, ui.clone());
            let handle = build_command_tree(&plugin.base_path, &plugin.descriptor, executor);
            debug!(
                plugin = %plugin.descriptor.name,
                kind = %plugin.descriptor.kind,
                depth = plugin.descriptor.depth(),
                "assembled plugin command tree"
            );
            if self.insert(handle) {
                registered += 1;
            }
        }
        if !scan.rejected.is_empty() {
            info!(rejected = scan.rejected.len(), "some plugins could not be loaded");
        }
        registered
    }

    /// Attaches every registered command to `root`.
    pub fn build_clap(&self, root: ClapCommand) -> ClapCommand {
        self.commands
            .iter()
            .fold(root, |root, handle| root.subcommand(handle.to_clap()))
    }

    /// Dispatches the matched top-level subcommand of `matches`.
    pub async fn dispatch(&self, matches: &ArgMatches, cancellation: CancellationToken) -> Result<()> {
        let Some((name, sub_matches)) = matches.subcommand() else {
            return Err(DispatchError::MissingSubcommand {
                command: ROOT_COMMAND_NAME.to_string(),
            }
            .into());
        };
        let handle = self.get(name).ok_or_else(|| DispatchError::UnknownCommand {
            parent: ROOT_COMMAND_NAME.to_string(),
            name: name.to_string(),
        })?;
        handle.dispatch(sub_matches, cancellation).await
    }
}

