//! Utility helpers shared by the devtools crates.

pub mod path_processing;
pub mod process;
pub mod ui;

use once_cell::sync::Lazy;
use regex::Regex;

pub use path_processing::{expand_abs_dir, expand_tilde, path_exists};
pub use process::{CapturedOutput, CommandRequest, ProcessError, run_quiet, run_streaming};
pub use ui::{BufferedUi, ConsoleUi, OutputStream, Ui, UiEntry, UiLevel};

static SENSITIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)",
        r"(?i)(https?://[^:/\s]+:)([^@\s]+)(@)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Redacts values that look like secrets in a string.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for re in SENSITIVE_PATTERNS.iter() {
        redacted = re
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = caps.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>{}", prefix, suffix)
            })
            .to_string();
    }
    redacted
}
