//! User-facing output sink.
//!
//! Managers and executors report progress through a [`Ui`] rather than
//! printing directly, so the same code can write to a terminal or to an
//! in-memory buffer under test. Diagnostic logging goes through `tracing`;
//! the sink is only for messages meant for the person running the command.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use chrono::Local;
use tracing::warn;

/// Which child-process stream a relayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Severity of a UI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl UiLevel {
    fn label(self) -> &'static str {
        match self {
            UiLevel::Info => "INFO",
            UiLevel::Success => "SUCCESS",
            UiLevel::Warning => "WARN",
            UiLevel::Error => "ERROR",
            UiLevel::Debug => "DEBUG",
        }
    }
}

/// Output sink shared across one invocation.
pub trait Ui: Send + Sync {
    /// Emits a leveled message.
    fn message(&self, level: UiLevel, message: &str);

    /// Relays one line of child-process output as it arrives.
    fn output_line(&self, stream: OutputStream, line: &str);

    fn info(&self, message: &str) {
        self.message(UiLevel::Info, message);
    }

    fn success(&self, message: &str) {
        self.message(UiLevel::Success, message);
    }

    fn warning(&self, message: &str) {
        self.message(UiLevel::Warning, message);
    }

    fn error(&self, message: &str) {
        self.message(UiLevel::Error, message);
    }

    fn debug(&self, message: &str) {
        self.message(UiLevel::Debug, message);
    }
}

/// Terminal sink: `[timestamp] [LEVEL  ] message` on stdout.
///
/// Debug messages are dropped unless the sink was created with debug enabled.
#[derive(Debug, Clone, Default)]
pub struct ConsoleUi {
    debug_enabled: bool,
}

impl ConsoleUi {
    pub fn new(debug_enabled: bool) -> Self {
        Self { debug_enabled }
    }

    fn format_message(level: UiLevel, message: &str) -> String {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        format!("[{timestamp}] [{:<7}] {message}", level.label())
    }
}

impl Ui for ConsoleUi {
    fn message(&self, level: UiLevel, message: &str) {
        if level == UiLevel::Debug && !self.debug_enabled {
            return;
        }
        write_line(io::stdout().lock(), &Self::format_message(level, message));
    }

    fn output_line(&self, stream: OutputStream, line: &str) {
        match stream {
            OutputStream::Stdout => write_line(io::stdout().lock(), line),
            OutputStream::Stderr => write_line(io::stderr().lock(), line),
        }
    }
}

/// Writes one line. A closed reader (`BrokenPipe`) is ignored.
fn write_line<W: Write>(mut out: W, line: &str) {
    if let Err(error) = writeln!(out, "{line}") {
        if error.kind() != io::ErrorKind::BrokenPipe {
            warn!(%error, "failed to write console output");
        }
    }
}

/// One recorded entry of a [`BufferedUi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEntry {
    Message(UiLevel, String),
    Output(OutputStream, String),
}

/// In-memory sink that records everything it receives.
#[derive(Debug, Default)]
pub struct BufferedUi {
    entries: Mutex<Vec<UiEntry>>,
}

impl BufferedUi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<UiEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Lines relayed from the given child-process stream, in arrival order.
    pub fn output_lines(&self, stream: OutputStream) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                UiEntry::Output(s, line) if s == stream => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Messages recorded at the given level.
    pub fn messages(&self, level: UiLevel) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                UiEntry::Message(l, message) if l == level => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, entry: UiEntry) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).push(entry);
    }
}

impl Ui for BufferedUi {
    fn message(&self, level: UiLevel, message: &str) {
        self.push(UiEntry::Message(level, message.to_string()));
    }

    fn output_line(&self, stream: OutputStream, line: &str) {
        self.push(UiEntry::Output(stream, line.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_format_pads_level() {
        let line = ConsoleUi::format_message(UiLevel::Warning, "careful");
        assert!(line.ends_with("[WARN   ] careful"), "unexpected line: {line}");
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_line_tolerates_closed_reader() {
        write_line(ClosedPipe, "dropped");

        let mut out = Vec::new();
        write_line(&mut out, "kept");
        assert_eq!(out, b"kept\n");
    }

    #[test]
    fn buffered_ui_separates_levels_and_streams() {
        let ui = BufferedUi::new();
        ui.info("starting");
        ui.success("done");
        ui.output_line(OutputStream::Stdout, "hello");
        ui.output_line(OutputStream::Stderr, "oops");

        assert_eq!(ui.messages(UiLevel::Info), vec!["starting".to_string()]);
        assert_eq!(ui.messages(UiLevel::Success), vec!["done".to_string()]);
        assert_eq!(ui.output_lines(OutputStream::Stdout), vec!["hello".to_string()]);
        assert_eq!(ui.output_lines(OutputStream::Stderr), vec!["oops".to_string()]);
    }
}
