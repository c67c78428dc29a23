//! Error types for plugin loading, execution and dispatch.

use std::path::PathBuf;

use devtools_types::DescriptorError;
use devtools_util::ProcessError;
use thiserror::Error;

/// Outcome of inspecting one candidate plugin directory.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The path is not a directory or has no descriptor file. Callers skip it.
    #[error("not a plugin directory: {}", .path.display())]
    NotAPlugin { path: PathBuf },

    #[error("failed to read plugin descriptor {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor exists but does not match the schema.
    #[error("malformed plugin descriptor {}: {reason}", .path.display())]
    MalformedDescriptor { path: PathBuf, reason: String },
}

impl LoadError {
    pub fn not_a_plugin(path: impl Into<PathBuf>) -> Self {
        Self::NotAPlugin { path: path.into() }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedDescriptor {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for conditions that are skipped without a warning.
    pub fn is_benign(&self) -> bool {
        matches!(self, LoadError::NotAPlugin { .. })
    }
}

impl From<(PathBuf, DescriptorError)> for LoadError {
    fn from((path, error): (PathBuf, DescriptorError)) -> Self {
        LoadError::malformed(path, error)
    }
}

/// Errors raised by a [`crate::executor::ScriptExecutor`].
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("script not found: {}", .path.display())]
    ScriptNotFound { path: PathBuf },

    #[error("playbook not found: {}", .path.display())]
    PlaybookNotFound { path: PathBuf },

    /// A shell script ran but failed; carries the full command line.
    #[error("failed to execute {command} {}: {source}", .args.join(" "))]
    ExecutionFailure {
        command: String,
        args: Vec<String>,
        #[source]
        source: ProcessError,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("failed to encode playbook variables: {0}")]
    Variables(#[from] serde_json::Error),
}

impl ExecError {
    /// True when the backing artifact is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExecError::ScriptNotFound { .. } | ExecError::PlaybookNotFound { .. })
    }
}

/// Errors raised while walking matched arguments to a command action.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("'{command}' requires a subcommand")]
    MissingSubcommand { command: String },

    #[error("unknown command '{name}' under '{parent}'")]
    UnknownCommand { parent: String, name: String },
}

/// Errors raised while reading or writing the settings file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
