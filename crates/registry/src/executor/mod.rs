//! Backends that run the artifact behind a plugin command.
//!
//! The command tree only knows the [`ScriptExecutor`] trait. [`executor_for`]
//! is the single place where a [`PluginKind`] picks a concrete backend.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use devtools_types::{GlobalConfig, PluginKind};
use devtools_util::Ui;
use tracing::debug;

use crate::clap_builder::Invocation;
use crate::error::ExecError;

mod playbook;
mod shell;

pub use playbook::PlaybookExecutor;
pub use shell::ShellExecutor;

/// Runs plugin artifacts of one kind.
#[async_trait]
pub trait ScriptExecutor: Send + Sync + Debug {
    /// Maps a command path to the artifact that backs it. Performs no I/O.
    fn script_path(&self, base_path: &Path, segments: &[&str]) -> PathBuf;

    /// Runs the artifact at `path` with the invocation's flags and arguments.
    async fn exec(&self, path: &Path, invocation: &Invocation) -> Result<(), ExecError>;

    /// Error reported when the artifact at `path` does not exist.
    fn not_found_error(&self, path: &Path) -> ExecError;
}

/// Joins `segments` under `base_path` and appends `.extension` to the last one.
pub(crate) fn artifact_path(base_path: &Path, segments: &[&str], extension: &str) -> PathBuf {
    let mut path = base_path.to_path_buf();
    if let Some((last, parents)) = segments.split_last() {
        path.extend(parents);
        path.push(format!("{last}.{extension}"));
    }
    path
}

/// Picks the backend for a plugin kind.
pub fn executor_for(kind: PluginKind, settings: &GlobalConfig, ui: Arc<dyn Ui>) -> Arc<dyn ScriptExecutor> {
    match kind {
        PluginKind::Shell => Arc::new(ShellExecutor::new(ui)),
        PluginKind::Playbook => {
            let bundled = settings.ansible.ansible_dir.join("bin").join(playbook::DEFAULT_PROGRAM);
            if !settings.ansible.ansible_dir.as_os_str().is_empty() && bundled.is_file() {
                debug!(program = %bundled.display(), "using bundled ansible-playbook");
                Arc::new(PlaybookExecutor::new(ui).with_program(bundled.to_string_lossy()))
            } else {
                Arc::new(PlaybookExecutor::new(ui))
            }
        }
    }
}
