use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use devtools_util::{CommandRequest, Ui, run_streaming};
use tracing::debug;

use super::{ScriptExecutor, artifact_path};
use crate::clap_builder::Invocation;
use crate::error::ExecError;

pub(crate) const DEFAULT_PROGRAM: &str = "bash";

/// Runs `.sh` artifacts through a shell interpreter.
///
/// The argument vector is the script path, then `--name value` for every
/// flag set on the command line, then the positional arguments.
#[derive(Clone)]
pub struct ShellExecutor {
    program: String,
    ui: Arc<dyn Ui>,
}

impl ShellExecutor {
    pub fn new(ui: Arc<dyn Ui>) -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            ui,
        }
    }

    /// Overrides the interpreter, e.g. `sh` on hosts without bash.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn build_args(path: &Path, invocation: &Invocation) -> Vec<String> {
        let mut args = Vec::with_capacity(1 + invocation.flags.len() * 2 + invocation.args.len());
        args.push(path.to_string_lossy().into_owned());
        for (name, value) in &invocation.flags {
            args.push(format!("--{name}"));
            args.push(value.clone());
        }
        args.extend(invocation.args.iter().cloned());
        args
    }
}

impl fmt::Debug for ShellExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellExecutor").field("program", &self.program).finish_non_exhaustive()
    }
}

#[async_trait]
impl ScriptExecutor for ShellExecutor {
    fn script_path(&self, base_path: &Path, segments: &[&str]) -> PathBuf {
        artifact_path(base_path, segments, "sh")
    }

    async fn exec(&self, path: &Path, invocation: &Invocation) -> Result<(), ExecError> {
        let args = Self::build_args(path, invocation);
        let request = CommandRequest::new(&self.program).args(args.clone());
        debug!(command = %invocation.command_path.join(" "), script = %path.display(), "running shell script");

        run_streaming(&request, self.ui.clone(), &invocation.cancellation)
            .await
            .map(|_| ())
            .map_err(|source| ExecError::ExecutionFailure {
                command: self.program.clone(),
                args,
                source,
            })
    }

    fn not_found_error(&self, path: &Path) -> ExecError {
        ExecError::ScriptNotFound { path: path.to_path_buf() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devtools_util::{BufferedUi, OutputStream};

    #[test]
    fn args_are_script_then_flags_then_positionals() {
        let invocation = Invocation::for_test(&["demo", "run"], &[("port", "80")], &["extra", "--raw"]);
        let args = ShellExecutor::build_args(Path::new("/p/run.sh"), &invocation);
        assert_eq!(args, vec!["/p/run.sh", "--port", "80", "extra", "--raw"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streams_script_output_to_ui() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("hello.sh");
        std::fs::write(&script, "echo \"hello $@\"\n").expect("script");

        let ui = Arc::new(BufferedUi::new());
        let executor = ShellExecutor::new(ui.clone()).with_program("sh");
        let invocation = Invocation::for_test(&["demo"], &[("name", "x")], &[]);
        executor.exec(&script, &invocation).await.expect("script runs");
        assert_eq!(ui.output_lines(OutputStream::Stdout), vec!["hello --name x".to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failure_carries_full_command_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("fail.sh");
        std::fs::write(&script, "exit 4\n").expect("script");

        let executor = ShellExecutor::new(Arc::new(BufferedUi::new())).with_program("sh");
        let invocation = Invocation::for_test(&["demo"], &[], &["a"]);
        let error = executor.exec(&script, &invocation).await.expect_err("script fails");
        match error {
            ExecError::ExecutionFailure { command, args, .. } => {
                assert_eq!(command, "sh");
                assert_eq!(args, vec![script.to_string_lossy().into_owned(), "a".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
