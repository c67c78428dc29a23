use std::ffi::OsString;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use devtools_engine::{ManagerRegistry, register_builtin_commands};
use devtools_registry::config::{CONFIG_FILE_NAME, DEFAULT_ROOT_DIR};
use devtools_registry::{CommandRegistry, ROOT_COMMAND_NAME, SettingsOptions, load_settings};
use devtools_util::{ConsoleUi, Ui};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const DEBUG_FLAG: &str = "debug";
const ROOT_DIR_FLAG: &str = "root-dir";
const CONFIG_FLAG: &str = "config";

#[tokio::main]
async fn main() -> ExitCode {
    match run(std::env::args_os().collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(argv: Vec<OsString>) -> Result<()> {
    let options = pre_parse(&argv);
    init_tracing(options.debug);

    let settings = load_settings(&options);
    match &settings.source {
        Some(path) => debug!(path = %path.display(), "using settings file"),
        None => debug!("running with default settings"),
    }
    let settings = settings.config;

    let ui: Arc<dyn Ui> = Arc::new(ConsoleUi::new(settings.common.debug));
    let managers = Arc::new(ManagerRegistry::with_builtin_managers());
    let mut registry = CommandRegistry::new();
    let builtins = register_builtin_commands(&mut registry, managers, &settings, ui.clone())
        .context("failed to register built-in commands")?;
    let plugins = registry.load_plugins(&settings.plugins_dir(), &settings, ui);
    debug!(builtins, plugins, "command tree assembled");

    let mut cli = registry.build_clap(root_command());
    let matches = cli.clone().get_matches_from(argv);
    if matches.subcommand_name().is_none() {
        cli.print_help()?;
        println!();
        return Ok(());
    }

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            ctrl_c.cancel();
        }
    });

    registry.dispatch(&matches, cancellation).await
}

/// The root command and its global flags, before any subcommand is attached.
fn root_command() -> Command {
    Command::new(ROOT_COMMAND_NAME)
        .about("Developer tooling assembled from plugins and built-in managers")
        .version(env!("CARGO_PKG_VERSION"))
        .disable_help_subcommand(true)
        .arg(
            Arg::new(DEBUG_FLAG)
                .long(DEBUG_FLAG)
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Enable debug output"),
        )
        .arg(
            Arg::new(ROOT_DIR_FLAG)
                .short('r')
                .long(ROOT_DIR_FLAG)
                .value_name("DIR")
                .default_value(DEFAULT_ROOT_DIR)
                .global(true)
                .help("Root directory of the devtools installation"),
        )
        .arg(
            Arg::new(CONFIG_FLAG)
                .short('c')
                .long(CONFIG_FLAG)
                .value_name("FILE")
                .default_value(CONFIG_FILE_NAME)
                .global(true)
                .help("Settings file to load"),
        )
}

/// Reads the global flags before the command tree exists.
///
/// The flags are global, so they are picked up anywhere on the line up to a
/// bare `--`, in `--flag value`, `--flag=value`, `-f value` and `-fvalue` form.
fn pre_parse(argv: &[OsString]) -> SettingsOptions {
    let mut options = SettingsOptions::default();
    let words: Vec<String> = argv.iter().skip(1).map(|word| word.to_string_lossy().into_owned()).collect();
    let mut words = words.iter();

    while let Some(word) = words.next() {
        if word == "--" {
            break;
        }
        if word == "--debug" {
            options.debug = true;
            continue;
        }
        let Some((flag, inline)) = value_flag(word) else {
            continue;
        };
        let Some(value) = inline.map(str::to_string).or_else(|| words.next().cloned()) else {
            break;
        };
        match flag {
            ROOT_DIR_FLAG => {
                options.root_dir = value;
                options.root_dir_explicit = true;
            }
            _ => {
                options.config_file = value;
                options.config_file_explicit = true;
            }
        }
    }
    options
}

/// Matches a global flag that takes a value, returning its id and any inline value.
fn value_flag(word: &str) -> Option<(&'static str, Option<&str>)> {
    for (id, short) in [(ROOT_DIR_FLAG, "-r"), (CONFIG_FLAG, "-c")] {
        if let Some(rest) = word.strip_prefix("--").and_then(|long| long.strip_prefix(id)) {
            match rest.strip_prefix('=') {
                Some(value) => return Some((id, Some(value))),
                None if rest.is_empty() => return Some((id, None)),
                None => continue,
            }
        }
        if let Some(rest) = word.strip_prefix(short) {
            let value = rest.strip_prefix('=').unwrap_or(rest);
            return Some((id, (!rest.is_empty()).then_some(value)));
        }
    }
    None
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
