use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use devtools_util::{CommandRequest, Ui, run_streaming};
use tracing::debug;

use super::{ScriptExecutor, artifact_path};
use crate::clap_builder::Invocation;
use crate::error::ExecError;

pub(crate) const DEFAULT_PROGRAM: &str = "ansible-playbook";

/// Inventory and connection flags that point a playbook at the local host.
const LOCAL_TARGET: [&str; 4] = ["-i", "127.0.0.1,", "-c", "local"];

/// Runs `.yml` playbooks against the local host.
///
/// Explicitly set flags become playbook variables passed as a JSON
/// `--extra-vars` document. Positional arguments are not forwarded.
#[derive(Clone)]
pub struct PlaybookExecutor {
    program: String,
    ui: Arc<dyn Ui>,
}

impl PlaybookExecutor {
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            ui,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_args(path: &Path, invocation: &Invocation) -> Result<Vec<String>, ExecError> {
        let variables: BTreeMap<&str, &str> = invocation
            .flags
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let mut args: Vec<String> = LOCAL_TARGET.iter().map(ToString::to_string).collect();
        args.push("--extra-vars".to_string());
        args.push(serde_json::to_string(&variables)?);
        args.push(path.to_string_lossy().into_owned());
        Ok(args)
    }
}

impl fmt::Debug for PlaybookExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybookExecutor").field("program", &self.program).finish_non_exhaustive()
    }
}

#[async_trait]
impl ScriptExecutor for PlaybookExecutor {
    fn script_path(&self, base_path: &Path, segments: &[&str]) -> PathBuf {
        artifact_path(base_path, segments, "yml")
    }

    async fn exec(&self, path: &Path, invocation: &Invocation) -> Result<(), ExecError> {
        let request = CommandRequest::new(&self.program).args(Self::build_args(path, invocation)?);
        debug!(command = %invocation.command_path.join(" "), playbook = %path.display(), "running playbook");

        run_streaming(&request, self.ui.clone(), &invocation.cancellation).await?;
        Ok(())
    }

    fn not_found_error(&self, path: &Path) -> ExecError {
        ExecError::PlaybookNotFound { path: path.to_path_buf() }
    }
}
