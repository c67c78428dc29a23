use thiserror::Error;

/// A context entry could not be converted into its bundle field.
///
/// Resolution is all-or-nothing: when this is returned no bundle is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode context key '{key}' as {expected}: {reason}")]
pub struct DecodeError {
    pub key: String,
    pub expected: &'static str,
    pub reason: String,
}

impl DecodeError {
    pub fn new(key: impl Into<String>, expected: &'static str, reason: impl ToString) -> Self {
        Self {
            key: key.into(),
            expected,
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("no manager registered under '{name}'")]
    NotFound { name: String },

    /// A bundle field the operation cannot run without was absent from the context.
    #[error("manager parameter '{key}' was not provided")]
    MissingParameter { key: &'static str },
}
