//! Runnable command handles and their clap rendering.
//!
//! clap commands carry no run callbacks, so the assembled command surface is
//! kept as a tree of [`CommandHandle`]s. [`CommandHandle::to_clap`] renders the
//! parser and [`CommandHandle::dispatch`] walks the matched subcommand chain
//! back to the handle whose action should run.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command as ClapCommand};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::DispatchError;

/// Argument id of the trailing positional arguments on leaf commands.
pub const ARGS_ID: &str = "args";

/// A command-line flag on a generated command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSpec {
    pub name: String,
    pub short: Option<char>,
    pub help: String,
    /// Value shown and parsed when the flag is absent. Never forwarded to scripts.
    pub default: Option<String>,
}

impl FlagSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Everything an action needs from one parsed command line.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Command names from the top-level command down to the dispatched one.
    pub command_path: Vec<String>,
    /// Raw matches of the dispatched command.
    pub matches: ArgMatches,
    /// Flags set explicitly on the command line, in the handle's flag order (sorted by name).
    pub flags: Vec<(String, String)>,
    /// Trailing positional arguments, verbatim.
    pub args: Vec<String>,
    pub cancellation: CancellationToken,
}

impl Invocation {
    /// Value of an explicitly set flag.
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags
            .iter()
            .find(|(flag, _)| flag == name)
            .map(|(_, value)| value.as_str())
    }

    #[cfg(test)]
    pub(crate) fn for_test(path: &[&str], flags: &[(&str, &str)], args: &[&str]) -> Self {
        Self {
            command_path: path.iter().map(ToString::to_string).collect(),
            matches: ArgMatches::default(),
            flags: flags
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            args: args.iter().map(ToString::to_string).collect(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// The run callback of a command.
#[async_trait]
pub trait CommandAction: Send + Sync {
    async fn run(&self, invocation: Invocation) -> anyhow::Result<()>;
}

/// A command, its flags, its action and its subcommands.
#[derive(Clone, Default)]
pub struct CommandHandle {
    pub name: String,
    pub about: String,
    pub long_about: Option<String>,
    pub flags: Vec<FlagSpec>,
    /// Whether trailing positional arguments are accepted.
    pub accepts_args: bool,
    pub action: Option<Arc<dyn CommandAction>>,
    pub children: Vec<CommandHandle>,
}

impl fmt::Debug for CommandHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandle")
            .field("name", &self.name)
            .field("about", &self.about)
            .field("flags", &self.flags)
            .field("accepts_args", &self.accepts_args)
            .field("has_action", &self.action.is_some())
            .field("children", &self.children)
            .finish()
    }
}

impl CommandHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn about(mut self, about: impl Into<String>) -> Self {
        self.about = about.into();
        self
    }

    pub fn long_about(mut self, long_about: impl Into<String>) -> Self {
        self.long_about = Some(long_about.into());
        self
    }

    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn accepts_args(mut self, accepts: bool) -> Self {
        self.accepts_args = accepts;
        self
    }

    pub fn action(mut self, action: Arc<dyn CommandAction>) -> Self {
        self.action = Some(action);
        self
    }

    pub fn child(mut self, child: CommandHandle) -> Self {
        self.children.push(child);
        self
    }

    pub fn find_child(&self, name: &str) -> Option<&CommandHandle> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Renders this handle and its subtree as a clap command.
    ///
    /// clap's builder wants `'static` strings for ids, long names and
    /// defaults; they are leaked, which is fine for a tree built once per
    /// process.
    pub fn to_clap(&self) -> ClapCommand {
        let mut command = ClapCommand::new(leak(&self.name))
            .about(self.about.clone())
            .disable_help_subcommand(true);
        if let Some(long_about) = &self.long_about {
            command = command.long_about(long_about.clone());
        }

        for flag in &self.flags {
            command = command.arg(build_flag_argument(flag));
        }
        if self.accepts_args {
            command = command.arg(
                Arg::new(ARGS_ID)
                    .num_args(0..)
                    .action(ArgAction::Append)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true)
                    .help("Arguments passed through to the command"),
            );
        }
        for child in &self.children {
            command = command.subcommand(child.to_clap());
        }
        if self.action.is_none() {
            command = command.subcommand_required(true).arg_required_else_help(true);
        }
        command
    }

    /// Runs the action of the deepest handle matched under `matches`.
    ///
    /// `matches` must be the matches of this handle's own command.
    pub async fn dispatch(&self, matches: &ArgMatches, cancellation: CancellationToken) -> anyhow::Result<()> {
        let mut handle = self;
        let mut current = matches;
        let mut command_path = vec![self.name.clone()];

        while let Some((name, sub_matches)) = current.subcommand() {
            let child = handle.find_child(name).ok_or_else(|| DispatchError::UnknownCommand {
                parent: command_path.join(" "),
                name: name.to_string(),
            })?;
            command_path.push(name.to_string());
            handle = child;
            current = sub_matches;
        }

        let Some(action) = &handle.action else {
            return Err(DispatchError::MissingSubcommand {
                command: command_path.join(" "),
            }
            .into());
        };

        let invocation = Invocation {
            flags: handle.explicit_flags(current),
            args: positional_args(current),
            matches: current.clone(),
            command_path,
            cancellation,
        };
        debug!(command = %invocation.command_path.join(" "), flags = invocation.flags.len(), "dispatching command");
        action.run(invocation).await
    }

    fn explicit_flags(&self, matches: &ArgMatches) -> Vec<(String, String)> {
        self.flags
            .iter()
            .filter(|flag| matches.value_source(&flag.name) == Some(ValueSource::CommandLine))
            .filter_map(|flag| {
                let value = matches.try_get_one::<String>(&flag.name).ok().flatten()?;
                Some((flag.name.clone(), value.clone()))
            })
            .collect()
    }
}

fn positional_args(matches: &ArgMatches) -> Vec<String> {
    matches
        .try_get_many::<String>(ARGS_ID)
        .ok()
        .flatten()
        .map(|values| values.cloned().collect())
        .unwrap_or_default()
}

fn build_flag_argument(flag: &FlagSpec) -> Arg {
    let name = leak(&flag.name);
    let mut arg = Arg::new(name).long(name).action(ArgAction::Set).help(flag.help.clone());
    if let Some(short) = flag.short {
        arg = arg.short(short);
    }
    if let Some(default) = &flag.default {
        arg = arg.default_value(leak(default));
    }
    arg
}

fn leak(value: &str) -> &'static str {
    Box::leak(value.to_string().into_boxed_str())
}
