//! Installs the running devtools binary into its root directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::ArgMatches;
use clap::parser::ValueSource;
use devtools_registry::config::{CONFIG_FILE_NAME, save_settings};
use devtools_types::GlobalConfig;
use devtools_util::{Ui, expand_abs_dir, path_exists};
use tracing::debug;

use super::Manager;
use crate::context::{CFG_KEY, CMD_KEY, InvocationContext, UI_KEY};
use crate::error::ManagerError;
use crate::resolve::{Binding, ParameterBundle, resolve};

pub const MANAGER_NAME: &str = "self";

/// Flag of `self install` that relocates the root directory.
pub const INSTALL_DIR_FLAG: &str = "install-dir";

/// File name of the installed binary under `<root>/bin`.
pub const BINARY_NAME: &str = "devtools";

#[derive(Clone, Default)]
pub struct SelfParams {
    pub ui: Option<Arc<dyn Ui>>,
    pub cfg: GlobalConfig,
    pub cmd: Option<ArgMatches>,
}

impl ParameterBundle for SelfParams {
    fn bindings() -> Vec<Binding<Self>> {
        vec![
            Binding::service(UI_KEY, |p: &mut SelfParams| &mut p.ui),
            Binding::data(CFG_KEY, |p: &mut SelfParams| &mut p.cfg),
            Binding::service(CMD_KEY, |p: &mut SelfParams| &mut p.cmd),
        ]
    }
}

impl SelfParams {
    /// `--install-dir`, when it was given on the command line.
    fn explicit_install_dir(&self) -> Option<PathBuf> {
        let matches = self.cmd.as_ref()?;
        if matches.value_source(INSTALL_DIR_FLAG) != Some(ValueSource::CommandLine) {
            return None;
        }
        let dir = matches.try_get_one::<String>(INSTALL_DIR_FLAG).ok().flatten()?;
        Some(expand_abs_dir(dir))
    }
}

/// Manages the devtools installation itself.
#[derive(Debug, Clone, Default)]
pub struct SelfManager {
    executable: Option<PathBuf>,
}

impl SelfManager {
    /// Installs `executable` instead of the running binary.
    pub fn with_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }

    fn source_executable(&self) -> Result<PathBuf> {
        match &self.executable {
            Some(path) => Ok(path.clone()),
            None => std::env::current_exe().context("cannot locate the running executable"),
        }
    }

    fn params(ctx: &InvocationContext) -> Result<(SelfParams, Arc<dyn Ui>)> {
        let params: SelfParams = resolve(ctx)?;
        let ui = params.ui.clone().ok_or(ManagerError::MissingParameter { key: UI_KEY })?;
        if params.cfg.common.root_dir.as_os_str().is_empty() {
            return Err(ManagerError::MissingParameter { key: CFG_KEY }.into());
        }
        Ok((params, ui))
    }

    /// Copies the executable to `<root>/bin/devtools`, replacing any previous copy.
    async fn install_binary(&self, root: &Path, ui: &Arc<dyn Ui>) -> Result<PathBuf> {
        let source = self.source_executable()?;
        let bin_dir = root.join("bin");
        let target = bin_dir.join(BINARY_NAME);
        tokio::fs::create_dir_all(&bin_dir)
            .await
            .with_context(|| format!("failed to create {}", bin_dir.display()))?;

        if same_file(&source, &target) {
            debug!(path = %target.display(), "binary already in place");
            return Ok(target);
        }
        ui.info(&format!("Copying {} -> {}", source.display(), target.display()));
        tokio::fs::copy(&source, &target)
            .await
            .with_context(|| format!("failed to copy {} to {}", source.display(), target.display()))?;
        make_executable(&target).await?;
        Ok(target)
    }
}

#[async_trait]
impl Manager for SelfManager {
    async fn install(&self, ctx: &InvocationContext) -> Result<()> {
        let (mut params, ui) = Self::params(ctx)?;
        if let Some(dir) = params.explicit_install_dir() {
            params.cfg.update_root_dir(&dir);
        }
        let root = params.cfg.common.root_dir.clone();
        ui.info(&format!("Installing devtools into {}", root.display()));

        let binary = self.install_binary(&root, &ui).await?;

        let plugins_dir = params.cfg.plugins_dir();
        tokio::fs::create_dir_all(&plugins_dir)
            .await
            .with_context(|| format!("failed to create {}", plugins_dir.display()))?;

        let config_path = root.join(CONFIG_FILE_NAME);
        if path_exists(&config_path) {
            ui.info(&format!("Keeping existing settings at {}", config_path.display()));
        } else {
            save_settings(&config_path, &params.cfg)?;
            ui.info(&format!("Wrote settings to {}", config_path.display()));
        }

        ui.success(&format!("Installed {}", binary.display()));
        if let Some(bin_dir) = binary.parent() {
            ui.info(&format!("Add {} to your PATH to use it", bin_dir.display()));
        }
        Ok(())
    }

    async fn uninstall(&self, ctx: &InvocationContext) -> Result<()> {
        let (params, ui) = Self::params(ctx)?;
        let binary = params.cfg.common.root_dir.join("bin").join(BINARY_NAME);
        if !path_exists(&binary) {
            ui.warning(&format!("{} is not installed", binary.display()));
            return Ok(());
        }
        tokio::fs::remove_file(&binary)
            .await
            .with_context(|| format!("failed to remove {}", binary.display()))?;
        ui.success(&format!("Removed {}", binary.display()));
        Ok(())
    }

    async fn update(&self, ctx: &InvocationContext) -> Result<()> {
        let (params, ui) = Self::params(ctx)?;
        let binary = self.install_binary(&params.cfg.common.root_dir, &ui).await?;
        ui.success(&format!("Updated {}", binary.display()));
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
