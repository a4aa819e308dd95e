//! Terminal host surface.
//!
//! The verification log goes to stderr; notifications and annotated source
//! excerpts go to stdout, so `hypra verify f.hhl 2>/dev/null` shows only what
//! a user needs to act on.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use hypra_verifier::{
    Hover, HostSurface, LogEntry, LogLevel, PositionEncoding, Span, StatusFrame, TextSnapshot,
    VerificationStatus,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct ConsoleHost {
    /// Last document handed to the controller, for printing excerpts.
    document: Option<(PathBuf, TextSnapshot)>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn excerpt(&self, path: &Path, span: Span) -> Option<(String, String)> {
        let (doc_path, snapshot) = self.document.as_ref()?;
        if doc_path != path {
            return None;
        }
        let line = snapshot.text().lines().nth(span.start().line as usize)?;
        let start = span.start().character as usize;
        let end = if span.end().line == span.start().line {
            span.end().character as usize
        } else {
            line.chars().count()
        };
        let marker = format!("{}{}", " ".repeat(start), "^".repeat(end.saturating_sub(start).max(1)));
        Some((line.to_string(), marker))
    }

    fn write_hovers(&self, out: &mut impl Write, path: &Path, hovers: &[Hover]) -> io::Result<()> {
        for hover in hovers {
            let start = hover.span.start();
            writeln!(
                out,
                "{}:{}:{}: {}",
                path.display(),
                start.line + 1,
                start.character + 1,
                hover.text
            )?;
            if let Some((line, marker)) = self.excerpt(path, hover.span) {
                let gutter = (start.line + 1).to_string();
                let pad = " ".repeat(gutter.len());
                writeln!(out, "{gutter} | {line}")?;
                writeln!(out, "{pad} | {marker}")?;
            }
        }
        out.flush()
    }
}

impl HostSurface for ConsoleHost {
    fn append_log(&mut self, entry: &LogEntry) {
        eprintln!("{entry}");
    }

    // Printed lines cannot be retracted.
    fn clear_log(&mut self) {}

    fn notify(&mut self, level: LogLevel, text: &str) {
        println!("{}: {text}", level.label().to_ascii_lowercase());
    }

    fn open_document(&mut self, path: &Path) -> io::Result<TextSnapshot> {
        // Columns in characters, so excerpts line up with their markers.
        let snapshot =
            TextSnapshot::new(std::fs::read_to_string(path)?).with_encoding(PositionEncoding::Utf32);
        self.document = Some((path.to_path_buf(), snapshot.clone()));
        Ok(snapshot)
    }

    // Underlines are drawn as excerpt markers when hovers are printed.
    fn render_decorations(&mut self, _path: &Path, _spans: &[Span]) {}

    fn clear_decorations(&mut self) {}

    fn register_hovers(&mut self, path: &Path, hovers: &[Hover]) {
        match self.write_hovers(&mut io::stdout().lock(), path, hovers) {
            Ok(()) => tracing::debug!(hovers = hovers.len(), "Annotations printed"),
            Err(e) => tracing::warn!("Failed to print annotations: {e}"),
        }
    }

    fn dispose_hovers(&mut self) {}
}

/// Print each status transition to stderr.
///
/// Animation ticks are skipped; a terminal log is not a status bar.
pub fn spawn_status_printer(mut frames: watch::Receiver<StatusFrame>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = frames.borrow().status();
        while frames.changed().await.is_ok() {
            let frame = *frames.borrow_and_update();
            if frame.status() != last && frame.status() != VerificationStatus::Idle {
                eprintln!("{}", frame.label());
            }
            last = frame.status();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hypra_verifier::Position;

    #[test]
    fn test_excerpt_marks_span() {
        let mut host = ConsoleHost::new();
        let path = PathBuf::from("a.hhl");
        let snapshot = TextSnapshot::new("x := 1\nassert y > 0\n").with_encoding(PositionEncoding::Utf32);
        host.document = Some((path.clone(), snapshot));

        let span = Span::new(
            Position { line: 1, character: 7 },
            Position { line: 1, character: 12 },
        )
        .unwrap();
        let (line, marker) = host.excerpt(&path, span).unwrap();
        assert_eq!(line, "assert y > 0");
        assert_eq!(marker, "       ^^^^^");
    }

    #[test]
    fn test_write_hovers_prints_location_and_excerpt() {
        let mut host = ConsoleHost::new();
        let path = PathBuf::from("a.hhl");
        let snapshot = TextSnapshot::new("x := 1\nassert y > 0\n").with_encoding(PositionEncoding::Utf32);
        host.document = Some((path.clone(), snapshot));

        let span = Span::new(
            Position { line: 1, character: 7 },
            Position { line: 1, character: 8 },
        )
        .unwrap();
        let hover = Hover {
            span,
            text: "unknown variable".to_string(),
        };

        let mut out = Vec::new();
        host.write_hovers(&mut out, &path, &[hover]).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "a.hhl:2:8: unknown variable\n2 | assert y > 0\n  |        ^\n"
        );
    }

    #[test]
    fn test_write_hovers_reports_write_failure() {
        struct Closed;
        impl Write for Closed {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let host = ConsoleHost::new();
        let origin = Position { line: 0, character: 0 };
        let hover = Hover {
            span: Span::new(origin, origin).unwrap(),
            text: "x".to_string(),
        };
        let err = host
            .write_hovers(&mut Closed, Path::new("a.hhl"), &[hover])
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_excerpt_needs_matching_document() {
        let mut host = ConsoleHost::new();
        host.document = Some((PathBuf::from("a.hhl"), TextSnapshot::new("abc")));
        let origin = Position { line: 0, character: 0 };
        let span = Span::new(origin, origin).unwrap();
        assert!(host.excerpt(Path::new("b.hhl"), span).is_none());
    }
}
