//! oh-my-zsh installation, update and removal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use devtools_types::settings::DEFAULT_ZSH_THEME;
use devtools_types::{CommonConfig, OhMyzshConfig, OhMyzshPlugin};
use devtools_util::{Ui, path_exists};
use tracing::debug;

use super::Manager;
use super::git::{Git, backup_path};
use crate::context::{CFG_KEY, ENV_KEY, GLOBAL_KEY, InvocationContext, UI_KEY};
use crate::error::ManagerError;
use crate::resolve::{Binding, ParameterBundle, resolve};

pub const MANAGER_NAME: &str = "ohmyzsh";

const OHMYZSH_REPO: &str = "https://github.com/ohmyzsh/ohmyzsh.git";

/// Plugins bundled with oh-my-zsh that are always enabled.
const BUNDLED_PLUGINS: [&str; 4] = ["git", "sudo", "extract", "z"];

/// Parameters of every oh-my-zsh operation.
#[derive(Clone)]
pub struct OhMyzshParams {
    pub ui: Option<Arc<dyn Ui>>,
    pub cfg: OhMyzshConfig,
    pub env: HashMap<String, String>,
    pub global: CommonConfig,
}

impl Default for OhMyzshParams {
    fn default() -> Self {
        Self {
            ui: None,
            cfg: OhMyzshConfig {
                theme: DEFAULT_ZSH_THEME.to_string(),
                ..Default::default()
            },
            env: HashMap::new(),
            global: CommonConfig::default(),
        }
    }
}

impl ParameterBundle for OhMyzshParams {
    fn bindings() -> Vec<Binding<Self>> {
        vec![
            Binding::service(UI_KEY, |p: &mut OhMyzshParams| &mut p.ui),
            Binding::data(CFG_KEY, |p: &mut OhMyzshParams| &mut p.cfg),
            Binding::data(ENV_KEY, |p: &mut OhMyzshParams| &mut p.env),
            Binding::data(GLOBAL_KEY, |p: &mut OhMyzshParams| &mut p.global),
        ]
    }
}

/// Manages an oh-my-zsh checkout and the user's `~/.zshrc`.
#[derive(Debug, Clone, Default)]
pub struct OhMyzshManager {
    home: Option<PathBuf>,
}

impl OhMyzshManager {
    /// Uses `home` instead of the current user's home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: Some(home.into()) }
    }

    fn zshrc_path(&self) -> Result<PathBuf> {
        let home = match &self.home {
            Some(home) => home.clone(),
            None => dirs_next::home_dir().context("cannot determine the home directory")?,
        };
        Ok(home.join(".zshrc"))
    }

    fn params(ctx: &InvocationContext) -> Result<(OhMyzshParams, Arc<dyn Ui>)> {
        let params: OhMyzshParams = resolve(ctx)?;
        let ui = params.ui.clone().ok_or(ManagerError::MissingParameter { key: UI_KEY })?;
        Ok((params, ui))
    }

    /// Creates `~/.zshrc` from the bundled template when it does not exist yet.
    async fn setup_zshrc(&self, params: &OhMyzshParams, ui: &Arc<dyn Ui>) -> Result<()> {
        let zshrc = self.zshrc_path()?;
        if path_exists(&zshrc) {
            ui.info(".zshrc already exists; keeping it");
            return Ok(());
        }
        let template = params.cfg.install_dir.join("templates").join("zshrc.zsh-template");
        ui.info("Creating .zshrc from the oh-my-zsh template");
        tokio::fs::copy(&template, &zshrc)
            .await
            .with_context(|| format!("failed to copy {} to {}", template.display(), zshrc.display()))?;
        Ok(())
    }

    async fn install_plugins(&self, params: &OhMyzshParams, git: &Git<'_>) -> Result<()> {
        let plugins_dir = custom_plugins_dir(&params.cfg.install_dir);
        tokio::fs::create_dir_all(&plugins_dir)
            .await
            .with_context(|| format!("failed to create {}", plugins_dir.display()))?;
        git.ui.info("Installing plugins...");
        for plugin in &params.cfg.plugins {
            let url = format!("https://github.com/{}.git", plugin.repo);
            git.clone(&url, &plugin_checkout(&plugins_dir, plugin)).await?;
        }
        Ok(())
    }

    async fn configure_zshrc(&self, params: &OhMyzshParams, ui: &Arc<dyn Ui>) -> Result<()> {
        let zshrc = self.zshrc_path()?;
        let content = tokio::fs::read_to_string(&zshrc)
            .await
            .with_context(|| format!("failed to read {}", zshrc.display()))?;
        let updated = rewrite_zshrc(&content, &params.cfg);
        tokio::fs::write(&zshrc, updated)
            .await
            .with_context(|| format!("failed to write {}", zshrc.display()))?;
        ui.info(&format!("Theme: {}", params.cfg.theme));
        ui.info(&format!("Plugins: {}", plugin_names(&params.cfg.plugins).join(" ")));
        Ok(())
    }

    async fn run_install(&self, params: &OhMyzshParams, git: &Git<'_>) -> Result<()> {
        git.clone(OHMYZSH_REPO, &params.cfg.install_dir).await?;
        self.setup_zshrc(params, git.ui).await?;
        self.install_plugins(params, git).await?;
        self.configure_zshrc(params, git.ui).await
    }
}

#[async_trait]
impl Manager for OhMyzshManager {
    async fn install(&self, ctx: &InvocationContext) -> Result<()> {
        let (params, ui) = Self::params(ctx)?;
        ui.info("Installing oh-my-zsh...");
        let git = Git {
            ui: &ui,
            global: &params.global,
            env: &params.env,
            cancellation: ctx.cancellation(),
        };
        if let Err(error) = self.run_install(&params, &git).await {
            ui.error(&format!("Installation failed: {error:#}"));
            return Err(error.context("oh-my-zsh installation failed"));
        }
        ui.success("Installation complete. Open a new terminal or run: source ~/.zshrc");
        Ok(())
    }

    async fn uninstall(&self, ctx: &InvocationContext) -> Result<()> {
        let (params, ui) = Self::params(ctx)?;
        ui.info("Removing oh-my-zsh...");
        let install_dir = &params.cfg.install_dir;
        if !install_dir.as_os_str().is_empty() && path_exists(install_dir) {
            ui.info(&format!("Deleting {}", install_dir.display()));
            tokio::fs::remove_dir_all(install_dir)
                .await
                .with_context(|| format!("failed to delete {}", install_dir.display()))?;
        }

        let zshrc = self.zshrc_path()?;
        if path_exists(&zshrc) {
            let backup = backup_path(&zshrc);
            ui.info(&format!("Backing up {} to {}", zshrc.display(), backup.display()));
            if let Err(error) = tokio::fs::rename(&zshrc, &backup).await {
                ui.warning(&format!("Could not back up .zshrc: {error}"));
            }
        }
        ui.success("oh-my-zsh removed. Restart your terminal.");
        Ok(())
    }

    async fn update(&self, ctx: &InvocationContext) -> Result<()> {
        let (params, ui) = Self::params(ctx)?;
        let git = Git {
            ui: &ui,
            global: &params.global,
            env: &params.env,
            cancellation: ctx.cancellation(),
        };
        ui.info("Updating oh-my-zsh...");
        git.pull(&params.cfg.install_dir).await?;

        ui.info("Updating plugins...");
        let plugins_dir = custom_plugins_dir(&params.cfg.install_dir);
        for plugin in &params.cfg.plugins {
            git.pull(&plugin_checkout(&plugins_dir, plugin)).await?;
        }
        ui.success("Update complete. Run: source ~/.zshrc");
        Ok(())
    }
}

fn custom_plugins_dir(install_dir: &Path) -> PathBuf {
    install_dir.join("custom").join("plugins")
}

/// Checkout directory of a custom plugin: the last path component of its name.
fn plugin_checkout(plugins_dir: &Path, plugin: &OhMyzshPlugin) -> PathBuf {
    let name = Path::new(&plugin.name)
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| plugin.name.clone().into());
    plugins_dir.join(name)
}

fn plugin_names(plugins: &[OhMyzshPlugin]) -> Vec<&str> {
    BUNDLED_PLUGINS
        .iter()
        .copied()
        .chain(plugins.iter().map(|plugin| plugin.name.as_str()))
        .collect()
}

/// Rewrites the `export ZSH=`, `ZSH_THEME=` and `plugins=(` lines of a `.zshrc`.
///
/// The first matching line of each kind is replaced. A missing `ZSH` or theme
/// line is prepended and a missing plugins line is appended.
pub fn rewrite_zshrc(content: &str, cfg: &OhMyzshConfig) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    let zsh_line = format!("export ZSH=\"{}\"", cfg.install_dir.display());
    if !replace_first(&mut lines, "export ZSH=", &zsh_line) {
        lines.insert(0, zsh_line);
    }
    let theme_line = format!("ZSH_THEME=\"{}\"", cfg.theme);
    if !replace_first(&mut lines, "ZSH_THEME=", &theme_line) {
        lines.insert(0, theme_line);
    }
    let plugins_line = format!("plugins=({})", plugin_names(&cfg.plugins).join(" "));
    if !replace_first(&mut lines, "plugins=(", &plugins_line) {
        lines.push(plugins_line);
    }

    debug!(lines = lines.len(), "rewrote .zshrc");
    lines.join("\n")
}

fn replace_first(lines: &mut [String], prefix: &str, replacement: &str) -> bool {
    match lines.iter_mut().find(|line| line.trim_start().starts_with(prefix)) {
        Some(line) => {
            *line = replacement.to_string();
            true
        }
        None => false,
    }
}
