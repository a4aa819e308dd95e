//! Host surface: the editor (or terminal) that renders verification state.
//!
//! The controller only issues requests through this trait; it never renders
//! anything itself.

use std::io;
use std::path::Path;

use crate::log_sink::{LogEntry, LogLevel};
use crate::mapper::{Span, TextSnapshot};

/// Hover text anchored to a source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hover {
    pub span: Span,
    pub text: String,
}

pub trait HostSurface {
    /// Append one line to the verification log.
    fn append_log(&mut self, entry: &LogEntry);

    fn clear_log(&mut self);

    /// Show a short user-facing notification.
    fn notify(&mut self, level: LogLevel, text: &str);

    /// Snapshot of the document at `path`, as the host currently sees it.
    ///
    /// The default reads the file from disk.
    fn open_document(&mut self, path: &Path) -> io::Result<TextSnapshot> {
        std::fs::read_to_string(path).map(TextSnapshot::new)
    }

    /// Underline `spans` in the document at `path`.
    fn render_decorations(&mut self, path: &Path, spans: &[Span]);

    fn clear_decorations(&mut self);

    fn register_hovers(&mut self, path: &Path, hovers: &[Hover]);

    fn dispose_hovers(&mut self);
}
