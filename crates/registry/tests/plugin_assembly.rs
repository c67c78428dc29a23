use std::fs;
use std::path::Path;
use std::sync::Arc;

use clap::Command as ClapCommand;
use devtools_registry::{CommandRegistry, ExecError, META_FILE_NAME};
use devtools_types::GlobalConfig;
use devtools_util::BufferedUi;
use tokio_util::sync::CancellationToken;

const TOOLBOX: &str = r#"
name: toolbox
description: Assorted tools
type: shell
version: "1.0"
commands:
  net:
    usage: Network helpers
    subcommands:
      probe:
        usage: Probe a host
        options:
          - name: port
            short: p
            value: "22"
          - name: host
"#;

const DEPLOY: &str = r#"
name: deploy
type: ansible
commands:
  app:
    subcommands:
      web:
        usage: Deploy the web tier
        options:
          - name: env
"#;

fn write_plugin(dir: &Path, meta: &str) {
    fs::create_dir_all(dir).expect("plugin dir");
    fs::write(dir.join(META_FILE_NAME), meta).expect("meta");
}

fn root_command() -> ClapCommand {
    ClapCommand::new("devtools").disable_help_subcommand(true)
}

fn registry_for(root: &Path) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.load_plugins(root, &GlobalConfig::default(), Arc::new(BufferedUi::new()));
    registry
}

#[test]
fn malformed_plugin_does_not_block_valid_ones() {
    let root = tempfile::tempdir().expect("tempdir");
    write_plugin(&root.path().join("toolbox"), TOOLBOX);
    write_plugin(&root.path().join("broken"), "name: broken\ntype: perl\n");

    let mut registry = CommandRegistry::new();
    let count = registry.load_plugins(root.path(), &GlobalConfig::default(), Arc::new(BufferedUi::new()));
    assert_eq!(count, 1);
    assert!(registry.get("toolbox").is_some());
    assert!(registry.get("broken").is_none());
}

#[test]
fn colliding_plugin_names_keep_the_first() {
    let root = tempfile::tempdir().expect("tempdir");
    write_plugin(&root.path().join("a"), TOOLBOX);
    write_plugin(&root.path().join("b"), TOOLBOX);

    let registry = registry_for(root.path());
    assert_eq!(registry.commands.len(), 1);
}

#[test]
fn clap_tree_mirrors_descriptor_depth() {
    let root = tempfile::tempdir().expect("tempdir");
    write_plugin(&root.path().join("toolbox"), TOOLBOX);

    let clap = registry_for(root.path()).build_clap(root_command());
    let probe = clap
        .find_subcommand("toolbox")
        .and_then(|c| c.find_subcommand("net"))
        .and_then(|c| c.find_subcommand("probe"))
        .expect("toolbox net probe");
    let flags: Vec<_> = probe
        .get_arguments()
        .filter_map(|arg| arg.get_long())
        .collect();
    assert_eq!(flags, vec!["host", "port"]);
}

#[tokio::test]
async fn missing_playbook_reports_expected_path() {
    let root = tempfile::tempdir().expect("tempdir");
    let plugin_dir = root.path().join("deploy");
    write_plugin(&plugin_dir, DEPLOY);

    let registry = registry_for(root.path());
    let matches = registry
        .build_clap(root_command())
        .try_get_matches_from(["devtools", "deploy", "app", "web", "--env", "prod"])
        .expect("parses");
    let error = registry
        .dispatch(&matches, CancellationToken::new())
        .await
        .expect_err("playbook is missing");

    match error.downcast_ref::<ExecError>() {
        Some(ExecError::PlaybookNotFound { path }) => assert_eq!(path, &plugin_dir.join("app/web.yml")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn shell_script_receives_only_explicit_flags() {
    let root = tempfile::tempdir().expect("tempdir");
    let plugin_dir = root.path().join("toolbox");
    write_plugin(&plugin_dir, TOOLBOX);
    let out = root.path().join("argv.txt");
    fs::create_dir_all(plugin_dir.join("net")).expect("net dir");
    fs::write(
        plugin_dir.join("net/probe.sh"),
        format!("printf '%s\\n' \"$@\" > '{}'\n", out.display()),
    )
    .expect("script");

    let registry = registry_for(root.path());
    let matches = registry
        .build_clap(root_command())
        .try_get_matches_from(["devtools", "toolbox", "net", "probe", "--host", "db1", "extra"])
        .expect("parses");
    registry
        .dispatch(&matches, CancellationToken::new())
        .await
        .expect("script runs");

    let argv = fs::read_to_string(&out).expect("argv written");
    assert_eq!(argv.lines().collect::<Vec<_>>(), vec!["--host", "db1", "extra"]);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_script_surfaces_execution_failure() {
    let root = tempfile::tempdir().expect("tempdir");
    let plugin_dir = root.path().join("solo");
    write_plugin(&plugin_dir, "name: solo\ntype: shell\n");
    fs::write(plugin_dir.join("solo.sh"), "echo nope >&2\nexit 2\n").expect("script");

    let ui = Arc::new(BufferedUi::new());
    let mut registry = CommandRegistry::new();
    registry.load_plugins(root.path(), &GlobalConfig::default(), ui.clone());
    let matches = registry
        .build_clap(root_command())
        .try_get_matches_from(["devtools", "solo"])
        .expect("parses");
    let error = registry
        .dispatch(&matches, CancellationToken::new())
        .await
        .expect_err("script fails");

    assert!(matches!(
        error.downcast_ref::<ExecError>(),
        Some(ExecError::ExecutionFailure { .. })
    ));
    assert_eq!(ui.output_lines(devtools_util::OutputStream::Stderr), vec!["nope".to_string()]);
}

#[cfg(unix)]
#[tokio::test]
async fn explicit_flags_reach_script_sorted_by_name() {
    let root = tempfile::tempdir().expect("tempdir");
    let plugin_dir = root.path().join("toolbox");
    write_plugin(&plugin_dir, TOOLBOX);
    let out = root.path().join("argv.txt");
    fs::create_dir_all(plugin_dir.join("net")).expect("net dir");
    fs::write(
        plugin_dir.join("net/probe.sh"),
        format!("printf '%s\\n' \"$@\" > '{}'\n", out.display()),
    )
    .expect("script");

    let registry = registry_for(root.path());
    let matches = registry
        .build_clap(root_command())
        .try_get_matches_from(["devtools", "toolbox", "net", "probe", "-p", "2222", "--host", "db1"])
        .expect("parses");
    registry
        .dispatch(&matches, CancellationToken::new())
        .await
        .expect("script runs");

    let argv = fs::read_to_string(&out).expect("argv written");
    assert_eq!(argv.lines().collect::<Vec<_>>(), vec!["--host", "db1", "--port", "2222"]);
}
