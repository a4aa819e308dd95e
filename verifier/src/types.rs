//! Public types consumed by the host.
//!
//! These types define the interface between `hypra-verifier` and whatever
//! surface renders verification state. The host drives a
//! [`SessionManager`](crate::SessionManager), and reads [`Diagnostic`]s,
//! [`Termination`]s and [`DiagnosticsSnapshot`]s back out of it.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::mapper::Span;
use crate::status::VerificationStatus;

/// Identifies one `verify()` invocation. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) const FIRST: Self = Self(1);

    #[must_use]
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Severity level of a verifier record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Debug,
}

impl Severity {
    /// Convert from the wire tag (`INFO`, `WARN`, `ERR`, `DEBUG`).
    ///
    /// `ERROR` is accepted as a spelling of `ERR`. Returns `None` for
    /// anything else; the caller treats that as a malformed record.
    #[must_use]
    pub fn from_wire(tag: &str) -> Option<Self> {
        match tag {
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warning),
            "ERR" | "ERROR" => Some(Self::Error),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

/// Rendering hints decoded from the open `extra` map of a record.
///
/// Offsets stay signed here: the verifier reports them as plain JSON
/// integers, and rejecting a bad range is the mapper's job, not the decoder's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticAttribute {
    /// Error anchored to the byte range `[left, right)`.
    PositionedError {
        left: i64,
        right: i64,
        title: Option<String>,
    },
    /// Error anchored to the identifier starting at `offset`.
    WordError { offset: i64 },
    /// Display title for a record that carries no position.
    Title(String),
    /// Number of quantifiers eliminated. Only decoded when positive.
    QuantifierNote { count: u64 },
    /// Name of the applied while-rule.
    RuleNote { name: String },
}

/// A single finding reported by the verifier.
///
/// Fields are private; construction goes through the decoder and the mapper.
/// External consumers read via accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: Severity,
    message: String,
    /// Timestamp as sent by the verifier, verbatim.
    timestamp: Option<String>,
    attributes: Vec<DiagnosticAttribute>,
    /// Resolved source range. `None` until mapped, or when the record has no
    /// usable position.
    span: Option<Span>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        severity: Severity,
        message: String,
        timestamp: Option<String>,
        attributes: Vec<DiagnosticAttribute>,
    ) -> Self {
        Self {
            severity,
            message,
            timestamp,
            attributes,
            span: None,
        }
    }

    #[must_use]
    pub(crate) fn with_span(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    #[must_use]
    pub fn attributes(&self) -> &[DiagnosticAttribute] {
        &self.attributes
    }

    #[must_use]
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }

    /// Raw `(left, right)` byte offsets, when the record carries both.
    #[must_use]
    pub fn offsets(&self) -> Option<(i64, i64)> {
        self.attributes.iter().find_map(|attr| match attr {
            DiagnosticAttribute::PositionedError { left, right, .. } => Some((*left, *right)),
            _ => None,
        })
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            DiagnosticAttribute::PositionedError {
                title: Some(title), ..
            }
            | DiagnosticAttribute::Title(title) => Some(title.as_str()),
            _ => None,
        })
    }

    #[must_use]
    pub fn quantifiers_removed(&self) -> Option<u64> {
        self.attributes.iter().find_map(|attr| match attr {
            DiagnosticAttribute::QuantifierNote { count } => Some(*count),
            _ => None,
        })
    }

    #[must_use]
    pub fn while_rule(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            DiagnosticAttribute::RuleNote { name } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Human-readable text used for log lines and hover content.
    ///
    /// `title: message (quantifiers removed: N) (rule: R)`, with each part
    /// omitted when absent.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = match self.title() {
            Some(title) => format!("{title}: {}", self.message),
            None => self.message.clone(),
        };
        if let Some(count) = self.quantifiers_removed() {
            out.push_str(&format!(" (quantifiers removed: {count})"));
        }
        if let Some(rule) = self.while_rule() {
            out.push_str(&format!(" (rule: {rule})"));
        }
        out
    }

    /// Format as `path:line:col: severity: text` (1-indexed for display).
    ///
    /// Unmapped diagnostics drop the `line:col` part.
    #[must_use]
    pub fn display_with_path(&self, path: &Path) -> String {
        match &self.span {
            Some(span) => format!(
                "{}:{}:{}: {}: {}",
                path.display(),
                span.start().line + 1,
                span.start().character + 1,
                self.severity.label(),
                self.render(),
            ),
            None => format!(
                "{}: {}: {}",
                path.display(),
                self.severity.label(),
                self.render()
            ),
        }
    }
}

/// Class of a stream-level record, as tagged by the verifier itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorClass {
    /// The verifier hit a structural failure it cannot continue past.
    Fatal,
    Warning,
    Informational,
}

/// The decoded form of one output record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    Diagnostic(Diagnostic),
    Stream {
        class: StreamErrorClass,
        name: String,
        description: String,
    },
}

/// How a verifier process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Exited with a code.
    Exited(i32),
    /// Killed by a signal; no code available.
    Signaled,
    /// Waiting on the child failed.
    Lost(String),
}

impl Termination {
    #[must_use]
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled | Self::Lost(_) => None,
        }
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "code {code}"),
            Self::Signaled => f.write_str("a signal"),
            Self::Lost(reason) => write!(f, "an unknown status ({reason})"),
        }
    }
}

/// Immutable view of the current (or last) session, suitable for rendering.
#[derive(Debug, Clone)]
pub struct DiagnosticsSnapshot {
    session: Option<SessionId>,
    path: Option<PathBuf>,
    status: VerificationStatus,
    /// Recorded error-severity diagnostics, in arrival order.
    diagnostics: Vec<Diagnostic>,
    warnings: usize,
}

impl DiagnosticsSnapshot {
    pub(crate) fn new(
        session: Option<SessionId>,
        path: Option<PathBuf>,
        status: VerificationStatus,
        diagnostics: Vec<Diagnostic>,
        warnings: usize,
    ) -> Self {
        Self {
            session,
            path,
            status,
            diagnostics,
            warnings,
        }
    }

    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty() && self.warnings == 0
    }

    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    /// Format a compact status string like "E:3 W:5".
    #[must_use]
    pub fn status_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        format!("E:{} W:{}", self.error_count(), self.warning_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::Position;

    fn positioned(title: Option<&str>) -> Diagnostic {
        Diagnostic::new(
            Severity::Error,
            "bad invariant".to_string(),
            None,
            vec![DiagnosticAttribute::PositionedError {
                left: 10,
                right: 15,
                title: title.map(String::from),
            }],
        )
    }

    #[test]
    fn test_from_wire_known_values() {
        assert_eq!(Severity::from_wire("INFO"), Some(Severity::Info));
        assert_eq!(Severity::from_wire("WARN"), Some(Severity::Warning));
        assert_eq!(Severity::from_wire("ERR"), Some(Severity::Error));
        assert_eq!(Severity::from_wire("ERROR"), Some(Severity::Error));
        assert_eq!(Severity::from_wire("DEBUG"), Some(Severity::Debug));
    }

    #[test]
    fn test_from_wire_unknown_returns_none() {
        assert_eq!(Severity::from_wire("info"), None);
        assert_eq!(Severity::from_wire("FATAL"), None);
        assert_eq!(Severity::from_wire(""), None);
    }

    #[test]
    fn test_is_error() {
        assert!(Severity::Error.is_error());
        assert!(!Severity::Warning.is_error());
        assert!(!Severity::Info.is_error());
        assert!(!Severity::Debug.is_error());
    }

    #[test]
    fn test_attribute_accessors() {
        let diag = Diagnostic::new(
            Severity::Error,
            "m".to_string(),
            None,
            vec![
                DiagnosticAttribute::PositionedError {
                    left: 3,
                    right: 9,
                    title: Some("Assertion".to_string()),
                },
                DiagnosticAttribute::QuantifierNote { count: 2 },
                DiagnosticAttribute::RuleNote {
                    name: "WhileSync".to_string(),
                },
            ],
        );
        assert_eq!(diag.offsets(), Some((3, 9)));
        assert_eq!(diag.title(), Some("Assertion"));
        assert_eq!(diag.quantifiers_removed(), Some(2));
        assert_eq!(diag.while_rule(), Some("WhileSync"));
    }

    #[test]
    fn test_render_with_all_parts() {
        let diag = Diagnostic::new(
            Severity::Info,
            "loop handled".to_string(),
            None,
            vec![
                DiagnosticAttribute::Title("Loop".to_string()),
                DiagnosticAttribute::QuantifierNote { count: 4 },
                DiagnosticAttribute::RuleNote {
                    name: "WhileDesugared".to_string(),
                },
            ],
        );
        assert_eq!(
            diag.render(),
            "Loop: loop handled (quantifiers removed: 4) (rule: WhileDesugared)"
        );
    }

    #[test]
    fn test_render_message_only() {
        assert_eq!(positioned(None).render(), "bad invariant");
    }

    #[test]
    fn test_display_with_path_mapped() {
        let span = Span::new(
            Position {
                line: 2,
                character: 4,
            },
            Position {
                line: 2,
                character: 9,
            },
        )
        .unwrap();
        let diag = positioned(Some("Postcondition")).with_span(Some(span));
        assert_eq!(
            diag.display_with_path(Path::new("loop.hhl")),
            "loop.hhl:3:5: error: Postcondition: bad invariant"
        );
    }

    #[test]
    fn test_display_with_path_unmapped() {
        let diag = positioned(None);
        assert_eq!(
            diag.display_with_path(Path::new("loop.hhl")),
            "loop.hhl: error: bad invariant"
        );
    }

    #[test]
    fn test_termination_display_and_code() {
        assert_eq!(Termination::Exited(2).to_string(), "code 2");
        assert_eq!(Termination::Exited(2).code(), Some(2));
        assert!(Termination::Exited(0).is_clean());
        assert!(!Termination::Exited(1).is_clean());
        assert!(!Termination::Signaled.is_clean());
        assert_eq!(Termination::Signaled.code(), None);
    }

    #[test]
    fn test_session_id_ordering() {
        let first = SessionId::FIRST;
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.get(), 2);
        assert_eq!(second.to_string(), "#2");
    }

    #[test]
    fn test_snapshot_counts_and_status_string() {
        let snap = DiagnosticsSnapshot::new(
            Some(SessionId::FIRST),
            Some(PathBuf::from("a.hhl")),
            VerificationStatus::Failed,
            vec![positioned(None), positioned(None)],
            3,
        );
        assert_eq!(snap.error_count(), 2);
        assert_eq!(snap.warning_count(), 3);
        assert_eq!(snap.status_string(), "E:2 W:3");
    }

    #[test]
    fn test_snapshot_empty_status_string() {
        let snap = DiagnosticsSnapshot::new(None, None, VerificationStatus::Idle, vec![], 0);
        assert!(snap.is_empty());
        assert_eq!(snap.status_string(), "");
    }
}
