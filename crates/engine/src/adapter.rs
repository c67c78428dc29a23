//! Command specs backed by registered managers.
//!
//! A [`PluginSpec`] describes a top-level command whose subcommands call one
//! manager operation each. The manager is looked up by name when the command
//! runs, so a spec can be assembled before (or without) its manager being
//! registered.

use std::sync::Arc;

use async_trait::async_trait;
use devtools_registry::{CommandAction, CommandHandle, CommandRegistry, FlagSpec, Invocation};
use devtools_types::{CommonConfig, GlobalConfig};
use devtools_util::Ui;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::context::{CFG_KEY, CMD_KEY, ENV_KEY, GLOBAL_KEY, InvocationContext, UI_KEY};
use crate::error::DecodeError;
use crate::manager::{ManagerRegistry, ohmyzsh, self_manage};

/// Manager operation run by a subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Install,
    Uninstall,
    Update,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Install => "install",
            Operation::Uninstall => "uninstall",
            Operation::Update => "update",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcommandSpec {
    pub name: String,
    pub about: String,
    pub operation: Operation,
    pub flags: Vec<FlagSpec>,
}

impl SubcommandSpec {
    pub fn new(operation: Operation, about: impl Into<String>) -> Self {
        Self {
            name: operation.name().to_string(),
            about: about.into(),
            operation,
            flags: Vec::new(),
        }
    }

    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }
}

/// A manager-backed top-level command.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginSpec {
    pub name: String,
    pub description: String,
    pub manager_name: String,
    /// Placed in the context under `cfg`.
    pub config: Value,
    /// Additional context entries, inserted after the standard ones.
    pub extras: IndexMap<String, Value>,
    pub subcommands: Vec<SubcommandSpec>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, config: Value) -> Self {
        let name = name.into();
        Self {
            manager_name: name.clone(),
            name,
            description: description.into(),
            config,
            extras: IndexMap::new(),
            subcommands: Vec::new(),
        }
    }

    pub fn extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn subcommands(mut self, subcommands: Vec<SubcommandSpec>) -> Self {
        self.subcommands = subcommands;
        self
    }

    /// Renders the spec as a command handle whose leaves run `ManagerAction`s.
    pub fn into_command(
        self,
        managers: Arc<ManagerRegistry>,
        global: &CommonConfig,
        ui: Arc<dyn Ui>,
    ) -> Result<CommandHandle, DecodeError> {
        let global = to_json(GLOBAL_KEY, global)?;
        let shared = Arc::new(SharedContext {
            manager_name: self.manager_name,
            config: self.config,
            global,
            extras: self.extras,
            ui,
            managers,
        });

        let handle = self
            .subcommands
            .into_iter()
            .fold(CommandHandle::new(self.name).about(self.description), |handle, sub| {
                let action = ManagerAction {
                    operation: sub.operation,
                    shared: shared.clone(),
                };
                let child = sub
                    .flags
                    .into_iter()
                    .fold(CommandHandle::new(sub.name).about(sub.about), CommandHandle::flag)
                    .action(Arc::new(action));
                handle.child(child)
            });
        Ok(handle)
    }
}

/// Everything the subcommands of one spec share.
struct SharedContext {
    manager_name: String,
    config: Value,
    global: Value,
    extras: IndexMap<String, Value>,
    ui: Arc<dyn Ui>,
    managers: Arc<ManagerRegistry>,
}

/// Runs one manager operation for a dispatched subcommand.
pub struct ManagerAction {
    operation: Operation,
    shared: Arc<SharedContext>,
}

impl ManagerAction {
    fn context(&self, invocation: Invocation) -> InvocationContext {
        let shared = &self.shared;
        let mut ctx = InvocationContext::new(invocation.cancellation.clone());
        ctx.insert_value(CFG_KEY, shared.config.clone());
        ctx.insert_value(GLOBAL_KEY, shared.global.clone());
        ctx.insert_service(UI_KEY, shared.ui.clone());
        for (key, value) in &shared.extras {
            ctx.insert_value(key.clone(), value.clone());
        }
        ctx.insert_service(CMD_KEY, invocation.matches);
        ctx
    }
}

#[async_trait]
impl CommandAction for ManagerAction {
    async fn run(&self, invocation: Invocation) -> anyhow::Result<()> {
        let manager = self.shared.managers.get(&self.shared.manager_name)?;
        debug!(
            manager = %self.shared.manager_name,
            operation = self.operation.name(),
            "running manager operation"
        );
        let ctx = self.context(invocation);
        match self.operation {
            Operation::Install => manager.install(&ctx).await,
            Operation::Uninstall => manager.uninstall(&ctx).await,
            Operation::Update => manager.update(&ctx).await,
        }
    }
}

fn to_json<T: Serialize>(key: &str, value: &T) -> Result<Value, DecodeError> {
    serde_json::to_value(value).map_err(|error| DecodeError::new(key, std::any::type_name::<T>(), error))
}

/// `install`, `uninstall` and `update`, labelled with `label`.
pub fn standard_subcommands(label: &str) -> Vec<SubcommandSpec> {
    vec![
        SubcommandSpec::new(Operation::Install, format!("Install {label}")),
        SubcommandSpec::new(Operation::Uninstall, format!("Uninstall {label}")),
        SubcommandSpec::new(Operation::Update, format!("Update {label}")),
    ]
}

/// Specs of the built-in manager commands, in registration order.
pub fn builtin_plugin_specs(settings: &GlobalConfig) -> Result<Vec<PluginSpec>, DecodeError> {
    let self_spec = PluginSpec::new(
        self_manage::MANAGER_NAME,
        "Manage the devtools installation",
        to_json(CFG_KEY, settings)?,
    )
    .subcommands(vec![
        SubcommandSpec::new(Operation::Install, "Install devtools").flag(
            FlagSpec::new(self_manage::INSTALL_DIR_FLAG)
                .help("Directory where the tool should be installed")
                .default_value("~/.tools"),
        ),
        SubcommandSpec::new(Operation::Uninstall, "Uninstall devtools"),
        SubcommandSpec::new(Operation::Update, "Update devtools"),
    ]);

    let ohmyzsh_spec = PluginSpec::new(
        ohmyzsh::MANAGER_NAME,
        "Manage oh-my-zsh: install, uninstall, update",
        to_json(CFG_KEY, &settings.oh_my_zsh)?,
    )
    .extra(ENV_KEY, json!({}))
    .subcommands(standard_subcommands("oh-my-zsh"));

    Ok(vec![self_spec, ohmyzsh_spec])
}

/// Adds the built-in manager commands to `registry`. Returns how many were added.
pub fn register_builtin_commands(
    registry: &mut CommandRegistry,
    managers: Arc<ManagerRegistry>,
    settings: &GlobalConfig,
    ui: Arc<dyn Ui>,
) -> Result<usize, DecodeError> {
    let mut added = 0;
    for spec in builtin_plugin_specs(settings)? {
        let handle = spec.into_command(managers.clone(), &settings.common, ui.clone())?;
        if registry.insert(handle) {
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManagerError;
    use crate::manager::Manager;
    use crate::resolve::{Binding, ParameterBundle, resolve};
    use devtools_util::BufferedUi;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct Seen {
        cfg: Value,
        env: Option<Value>,
        global: CommonConfig,
        has_cmd: bool,
    }

    #[derive(Default)]
    struct Probe {
        cfg: Value,
        env: Option<Value>,
        global: CommonConfig,
        cmd: Option<clap::ArgMatches>,
    }

    impl ParameterBundle for Probe {
        fn bindings() -> Vec<Binding<Self>> {
            vec![
                Binding::data(CFG_KEY, |p: &mut Probe| &mut p.cfg),
                Binding::data(ENV_KEY, |p: &mut Probe| &mut p.env),
                Binding::data(GLOBAL_KEY, |p: &mut Probe| &mut p.global),
                Binding::service(CMD_KEY, |p: &mut Probe| &mut p.cmd),
            ]
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(Operation, Seen)>>,
    }

    impl Recording {
        fn record(&self, operation: Operation, ctx: &InvocationContext) -> anyhow::Result<()> {
            let probe: Probe = resolve(ctx)?;
            self.seen.lock().expect("lock").push((
                operation,
                Seen {
                    cfg: probe.cfg,
                    env: probe.env,
                    global: probe.global,
                    has_cmd: probe.cmd.is_some(),
                },
            ));
            Ok(())
        }
    }

    #[async_trait]
    impl Manager for Recording {
        async fn install(&self, ctx: &InvocationContext) -> anyhow::Result<()> {
            self.record(Operation::Install, ctx)
        }

        async fn uninstall(&self, ctx: &InvocationContext) -> anyhow::Result<()> {
            self.record(Operation::Uninstall, ctx)
        }

        async fn update(&self, ctx: &InvocationContext) -> anyhow::Result<()> {
            self.record(Operation::Update, ctx)
        }
    }

    fn settings() -> GlobalConfig {
        let mut settings = GlobalConfig::default();
        settings.apply_defaults(std::path::Path::new("/opt/tools"));
        settings.common.http_proxy = "http://proxy:3128".into();
        settings
    }

    #[tokio::test]
    async fn subcommand_builds_context_and_calls_operation() {
        let recording = Arc::new(Recording::default());
        let managers = Arc::new(ManagerRegistry::new());
        managers.register(ohmyzsh::MANAGER_NAME, recording.clone());

        let settings = settings();
        let specs = builtin_plugin_specs(&settings).expect("specs");
        let spec = specs
            .into_iter()
            .find(|spec| spec.name == ohmyzsh::MANAGER_NAME)
            .expect("ohmyzsh spec");
        let handle = spec
            .into_command(managers, &settings.common, Arc::new(BufferedUi::new()))
            .expect("command");

        let matches = handle
            .to_clap()
            .try_get_matches_from(["ohmyzsh", "update"])
            .expect("parses");
        handle.dispatch(&matches, CancellationToken::new()).await.expect("runs");

        let seen = recording.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        let (operation, seen) = &seen[0];
        assert_eq!(*operation, Operation::Update);
        assert_eq!(seen.cfg["theme"], json!("robbyrussell"));
        assert_eq!(seen.env, Some(json!({})));
        assert_eq!(seen.global.http_proxy, "http://proxy:3128");
        assert!(seen.has_cmd);
    }

    #[tokio::test]
    async fn unregistered_manager_fails_at_dispatch() {
        let settings = settings();
        let spec = PluginSpec::new("docker", "Docker", json!({})).subcommands(standard_subcommands("Docker"));
        let handle = spec
            .into_command(Arc::new(ManagerRegistry::new()), &settings.common, Arc::new(BufferedUi::new()))
            .expect("command");
        let matches = handle
            .to_clap()
            .try_get_matches_from(["docker", "install"])
            .expect("parses");

        let error = handle
            .dispatch(&matches, CancellationToken::new())
            .await
            .expect_err("no manager");
        assert_eq!(
            error.downcast_ref::<ManagerError>(),
            Some(&ManagerError::NotFound { name: "docker".into() })
        );
    }

    #[test]
    fn self_install_exposes_install_dir_flag() {
        let specs = builtin_plugin_specs(&settings()).expect("specs");
        let names: Vec<_> = specs.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, vec!["self", "ohmyzsh"]);

        let install = &specs[0].subcommands[0];
        assert_eq!(install.operation, Operation::Install);
        assert_eq!(install.flags[0].name, "install-dir");
        assert_eq!(install.flags[0].default.as_deref(), Some("~/.tools"));
    }
}
