//! Streaming child-process execution.
//!
//! [`run_streaming`] spawns one child, relays each stdout/stderr line to the
//! [`Ui`] sink as soon as it is read, keeps a combined copy for the caller,
//! and kills the child when the invocation's cancellation token fires.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::redact_sensitive;
use crate::ui::{OutputStream, Ui};

/// A program invocation: argument vector, extra environment and working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: IndexMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl CommandRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds environment variables on top of the inherited environment.
    pub fn envs<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in vars {
            self.env.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Space-joined command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a child that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub status_code: Option<i32>,
    /// Combined stdout and stderr, one line per relayed line.
    pub output: String,
}

/// Failures of [`run_streaming`].
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed with {status}")]
    NonZeroExit {
        program: String,
        status: String,
        status_code: Option<i32>,
        output: String,
    },

    #[error("'{program}' was cancelled")]
    Cancelled { program: String },
}

impl ProcessError {
    /// Captured output of a child that ran to a non-zero exit.
    pub fn output(&self) -> Option<&str> {
        match self {
            ProcessError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Runs `request` to completion, streaming its output to `ui`.
///
/// Stdin is inherited so interactive scripts keep working. The call returns
/// [`ProcessError::Cancelled`] without spawning anything if `cancellation`
/// already fired, and kills the child if it fires while the child runs.
pub async fn run_streaming(
    request: &CommandRequest,
    ui: Arc<dyn Ui>,
    cancellation: &CancellationToken,
) -> Result<CapturedOutput, ProcessError> {
    run_child(request, Some(ui), cancellation).await
}

/// Like [`run_streaming`], but output is only captured, never relayed.
pub async fn run_quiet(request: &CommandRequest, cancellation: &CancellationToken) -> Result<CapturedOutput, ProcessError> {
    run_child(request, None, cancellation).await
}

async fn run_child(
    request: &CommandRequest,
    ui: Option<Arc<dyn Ui>>,
    cancellation: &CancellationToken,
) -> Result<CapturedOutput, ProcessError> {
    let program = request.program.clone();
    if cancellation.is_cancelled() {
        return Err(ProcessError::Cancelled { program });
    }

    let mut command = Command::new(&request.program);
    command
        .args(&request.args)
        .envs(&request.env)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &request.cwd {
        command.current_dir(cwd);
    }

    debug!(command = %redact_sensitive(&request.display()), "spawning child process");
    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.clone(),
        source,
    })?;

    let captured = Arc::new(Mutex::new(String::new()));
    let mut forwarders = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        forwarders.push(spawn_line_forwarder(stdout, OutputStream::Stdout, ui.clone(), captured.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        forwarders.push(spawn_line_forwarder(stderr, OutputStream::Stderr, ui, captured.clone()));
    }

    let waited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancellation.cancelled() => None,
    };

    let Some(status) = waited else {
        warn!(program = %program, "cancellation requested; terminating child process");
        if let Err(error) = child.kill().await {
            warn!(program = %program, %error, "failed to kill child process");
        }
        for forwarder in forwarders {
            forwarder.abort();
        }
        return Err(ProcessError::Cancelled { program });
    };
    let status = status.map_err(|source| ProcessError::Wait {
        program: program.clone(),
        source,
    })?;

    // Drain whatever is still buffered in the pipes before reporting.
    for forwarder in forwarders {
        let _ = forwarder.await;
    }
    let output = std::mem::take(&mut *captured.lock().unwrap_or_else(PoisonError::into_inner));

    debug!(program = %program, status = %status, "child process exited");
    if !status.success() {
        return Err(ProcessError::NonZeroExit {
            program,
            status: status.to_string(),
            status_code: status.code(),
            output,
        });
    }
    Ok(CapturedOutput {
        status_code: status.code(),
        output,
    })
}

/// Spawn a background task that relays lines from `reader` to the sink and the capture buffer.
///
/// The pipe is read to EOF even when a read fails, so the child never sees a closed pipe.
fn spawn_line_forwarder<R>(
    reader: R,
    stream: OutputStream,
    ui: Option<Arc<dyn Ui>>,
    captured: Arc<Mutex<String>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    if let Some(ui) = &ui {
                        ui.output_line(stream, &line);
                    }
                    let mut buffer = captured.lock().unwrap_or_else(PoisonError::into_inner);
                    buffer.push_str(&line);
                    buffer.push('\n');
                }
                Err(error) => {
                    warn!(?stream, %error, "failed to read child output; discarding the rest");
                    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
                    break;
                }
            }
        }
    })
}

/// Decodes one raw line, replacing invalid UTF-8 and dropping the line terminator.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ui::BufferedUi;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn streams_and_captures_both_streams() {
        let ui = Arc::new(BufferedUi::new());
        let request = CommandRequest::new("sh").arg("-c").arg("echo out; echo err 1>&2");
        let captured = run_streaming(&request, ui.clone(), &CancellationToken::new())
            .await
            .expect("command succeeds");

        assert_eq!(captured.status_code, Some(0));
        assert!(captured.output.contains("out\n"));
        assert!(captured.output.contains("err\n"));
        assert_eq!(ui.output_lines(OutputStream::Stdout), vec!["out".to_string()]);
        assert_eq!(ui.output_lines(OutputStream::Stderr), vec!["err".to_string()]);
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_output() {
        let ui = Arc::new(BufferedUi::new());
        let request = CommandRequest::new("sh").args(["-c", "echo partial; exit 3"]);
        let error = run_streaming(&request, ui, &CancellationToken::new())
            .await
            .expect_err("command fails");

        match &error {
            ProcessError::NonZeroExit { status_code, .. } => assert_eq!(*status_code, Some(3)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(error.output(), Some("partial\n"));
    }

    #[tokio::test]
    async fn passes_environment_and_working_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ui = Arc::new(BufferedUi::new());
        let request = CommandRequest::new("sh")
            .args(["-c", "echo \"$GREETING\"; pwd"])
            .env("GREETING", "hello")
            .current_dir(dir.path());
        let captured = run_streaming(&request, ui, &CancellationToken::new())
            .await
            .expect("command succeeds");
        let mut lines = captured.output.lines();
        assert_eq!(lines.next(), Some("hello"));
        let cwd = lines.next().expect("pwd line");
        assert!(cwd.ends_with(dir.path().file_name().and_then(|n| n.to_str()).expect("name")));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let ui = Arc::new(BufferedUi::new());
        let request = CommandRequest::new("devtools-definitely-missing-binary");
        let error = run_streaming(&request, ui, &CancellationToken::new())
            .await
            .expect_err("spawn fails");
        assert!(matches!(error, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn cancellation_terminates_child() {
        let ui = Arc::new(BufferedUi::new());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let request = CommandRequest::new("sh").args(["-c", "sleep 30"]);
        let error = run_streaming(&request, ui, &token).await.expect_err("cancelled");
        assert!(matches!(error, ProcessError::Cancelled { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn pre_cancelled_token_spawns_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ran");
        let token = CancellationToken::new();
        token.cancel();
        let request = CommandRequest::new("sh").args(["-c".to_string(), format!("touch {}", marker.display())]);
        let error = run_streaming(&request, Arc::new(BufferedUi::new()), &token)
            .await
            .expect_err("cancelled");
        assert!(matches!(error, ProcessError::Cancelled { .. }));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_stop_the_stream() {
        let ui = Arc::new(BufferedUi::new());
        let request = CommandRequest::new("sh").args(["-c", "printf 'bad\\377\\n'; echo after"]);
        let captured = run_streaming(&request, ui.clone(), &CancellationToken::new())
            .await
            .expect("command succeeds");

        assert_eq!(
            ui.output_lines(OutputStream::Stdout),
            vec!["bad\u{FFFD}".to_string(), "after".to_string()]
        );
        assert!(captured.output.ends_with("after\n"));
    }

    #[tokio::test]
    async fn output_after_invalid_utf8_is_still_drained() {
        let ui = Arc::new(BufferedUi::new());
        let script = "printf 'bad\\377\\n'; head -c 400000 /dev/zero | tr '\\0' a; echo; echo done";
        let captured = run_streaming(&request_for(script), ui.clone(), &CancellationToken::new())
            .await
            .expect("child is not killed by a closed pipe");
        assert_eq!(captured.status_code, Some(0));
        assert_eq!(ui.output_lines(OutputStream::Stdout).last().map(String::as_str), Some("done"));
    }

    #[tokio::test]
    async fn quiet_run_captures_without_relaying() {
        let captured = run_quiet(&request_for("echo true"), &CancellationToken::new())
            .await
            .expect("command succeeds");
        assert_eq!(captured.output, "true\n");
    }

    #[test]
    fn decode_line_strips_terminators() {
        assert_eq!(decode_line(b"plain\n"), "plain");
        assert_eq!(decode_line(b"crlf\r\n"), "crlf");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\xffx\n"), "\u{FFFD}x");
    }

    fn request_for(script: &str) -> CommandRequest {
        CommandRequest::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn display_joins_program_and_args() {
        let request = CommandRequest::new("bash").args(["run.sh", "--port", "80"]);
        assert_eq!(request.display(), "bash run.sh --port 80");
    }
}
