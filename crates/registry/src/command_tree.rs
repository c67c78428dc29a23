//! Turns a plugin descriptor into a runnable command tree.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use devtools_types::{CommandNode, CommandOption, PluginDescriptor};

use crate::clap_builder::{CommandAction, CommandHandle, FlagSpec, Invocation};
use crate::executor::ScriptExecutor;

/// Runs the artifact behind one command through its plugin's executor.
#[derive(Debug)]
pub struct ScriptAction {
    path: PathBuf,
    executor: Arc<dyn ScriptExecutor>,
}

impl ScriptAction {
    pub fn new(path: PathBuf, executor: Arc<dyn ScriptExecutor>) -> Self {
        Self { path, executor }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CommandAction for ScriptAction {
    async fn run(&self, invocation: Invocation) -> anyhow::Result<()> {
        // Checked at dispatch time so a missing artifact only fails its own command.
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(self.executor.not_found_error(&self.path).into());
        }
        self.executor.exec(&self.path, &invocation).await?;
        Ok(())
    }
}

/// Builds the command handle of one plugin rooted at `base_path`.
///
/// Commands and options come out sorted by name. A plugin without commands
/// becomes a single leaf backed by the artifact named after the plugin.
/// Nothing is read from disk here.
pub fn build_command_tree(
    base_path: &Path,
    descriptor: &PluginDescriptor,
    executor: Arc<dyn ScriptExecutor>,
) -> CommandHandle {
    let root = CommandHandle::new(&descriptor.name).about(&descriptor.description);

    if descriptor.is_single_action() {
        let path = executor.script_path(base_path, &[descriptor.name.as_str()]);
        return root
            .accepts_args(true)
            .action(Arc::new(ScriptAction::new(path, executor)));
    }

    let mut segments = Vec::new();
    descriptor.commands.iter().fold(root, |root, (name, node)| {
        root.child(build_node(base_path, &mut segments, name, node, &executor))
    })
}

fn build_node<'a>(
    base_path: &Path,
    segments: &mut Vec<&'a str>,
    name: &'a str,
    node: &'a CommandNode,
    executor: &Arc<dyn ScriptExecutor>,
) -> CommandHandle {
    segments.push(name);
    let path = executor.script_path(base_path, segments);

    let help = if node.usage.is_empty() { &node.description } else { &node.usage };
    let mut handle = CommandHandle::new(name)
        .about(help)
        .accepts_args(node.is_leaf())
        .action(Arc::new(ScriptAction::new(path, executor.clone())));
    if !node.description.is_empty() && node.description != *help {
        handle = handle.long_about(&node.description);
    }

    let mut options: Vec<&CommandOption> = node.options.iter().collect();
    options.sort_by(|a, b| a.name.cmp(&b.name));
    for option in options {
        handle = handle.flag(flag_from_option(option));
    }

    for (child_name, child) in &node.subcommands {
        handle = handle.child(build_node(base_path, segments, child_name, child, executor));
    }
    segments.pop();
    handle
}

fn flag_from_option(option: &CommandOption) -> FlagSpec {
    FlagSpec {
        name: option.name.clone(),
        short: option.short,
        help: option.description.clone(),
        default: option.value.clone(),
    }
}
