//! SessionManager: the session controller consumed by the host.
//!
//! Owns at most one live verifier session. `verify()` supersedes whatever was
//! running; subprocess output arrives on a single event channel and is only
//! ever applied through `&mut self`, so session state has exactly one writer.
//!
//! The session lives in [`SessionState`]; moving it between variants is the
//! state transition.

use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, watch};

use crate::config::{
    BinaryResolver, ConfigProvider, DEPENDENCY_NOTE, SearchPath, missing_requisites,
    resolve_toolchain,
};
use crate::error::{ConfigurationError, DocumentError, SpawnError, VerifyError};
use crate::host::{Hover, HostSurface};
use crate::invocation::{Flags, build_invocation};
use crate::log_sink::{LogLevel, broadcast, log};
use crate::mapper::TextSnapshot;
use crate::protocol;
use crate::status::{StatusFrame, StatusIndicator, VerificationStatus};
use crate::supervisor::{self, ProcessHandle, ProcessOutput, SupervisorEvent};
use crate::types::{
    Diagnostic, DiagnosticsSnapshot, ProtocolEvent, SessionId, Severity, StreamErrorClass,
    Termination,
};

/// Channel capacity between supervisor tasks and the manager.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Extension of verifier source files.
pub const SOURCE_EXTENSION: &str = "hhl";

const STDERR_NOTICE: &str = "An unexpected error occurred during verification. More information can be found in the verification log.";

/// Whether `path` looks like a verifier source file.
#[must_use]
pub fn is_verifier_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// What a session accumulated from the verifier's output.
#[derive(Debug, Default)]
struct SessionRecord {
    /// Error-severity diagnostics, in arrival order.
    diagnostics: Vec<Diagnostic>,
    warnings: usize,
    /// Set by error diagnostics and fatal stream records alike.
    errors_occurred: bool,
}

struct ActiveSession {
    id: SessionId,
    path: PathBuf,
    document: TextSnapshot,
    process: ProcessHandle,
    record: SessionRecord,
}

struct FinishedSession {
    id: SessionId,
    path: PathBuf,
    record: SessionRecord,
}

enum SessionState {
    Idle,
    Active(ActiveSession),
    Finished(FinishedSession),
}

/// Drives verifier runs for one host surface.
pub struct SessionManager<H: HostSurface> {
    host: H,
    config: Box<dyn ConfigProvider + Send>,
    resolver: Box<dyn BinaryResolver + Send>,
    /// Directory holding the bundled verifier jar.
    bundle_dir: PathBuf,
    status: StatusIndicator,
    state: SessionState,
    next_session: SessionId,
    /// Whether the host currently holds hovers registered by us.
    hovers_registered: bool,
    event_rx: mpsc::Receiver<SupervisorEvent>,
    event_tx: mpsc::Sender<SupervisorEvent>,
}

impl<H: HostSurface> SessionManager<H> {
    /// Binaries not found in the configuration are looked up on `PATH`.
    pub fn new(
        host: H,
        config: impl ConfigProvider + Send + 'static,
        bundle_dir: impl Into<PathBuf>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            host,
            config: Box::new(config),
            resolver: Box::new(SearchPath),
            bundle_dir: bundle_dir.into(),
            status: StatusIndicator::new(),
            state: SessionState::Idle,
            next_session: SessionId::FIRST,
            hovers_registered: false,
            event_rx,
            event_tx,
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: impl BinaryResolver + Send + 'static) -> Self {
        self.resolver = Box::new(resolver);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[must_use]
    pub fn status(&self) -> VerificationStatus {
        self.status.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusFrame> {
        self.status.subscribe()
    }

    /// Id of the session whose subprocess is still running.
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        match &self.state {
            SessionState::Active(active) => Some(active.id),
            SessionState::Idle | SessionState::Finished(_) => None,
        }
    }

    /// Greet the user and list the external dependencies.
    pub fn welcome(&mut self) {
        log(
            &mut self.host,
            LogLevel::Info,
            "Hypra verifies hyperproperties of programs written in the Hyper Hoare Logic language.",
        );
        log(&mut self.host, LogLevel::Info, DEPENDENCY_NOTE);
    }

    /// Verify `path` with the flags from the current configuration.
    ///
    /// Any running session is killed first. Failures before the verifier
    /// starts are reported to the host and leave the status `Failed`; the
    /// returned error is for callers that need to branch on them.
    ///
    /// Must be called from within a tokio runtime.
    pub fn verify(&mut self, path: &Path) -> Result<SessionId, VerifyError> {
        self.start(path, Flags::FromConfig)
    }

    /// Like [`verify`](Self::verify), with `args` replacing the configured
    /// flags.
    pub fn verify_with_args(
        &mut self,
        path: &Path,
        args: &[String],
    ) -> Result<SessionId, VerifyError> {
        self.start(path, Flags::Custom(args))
    }

    /// Report every external binary that can be neither configured nor found.
    ///
    /// Returns `true` when nothing is missing.
    pub fn check_prerequisites(&mut self) -> bool {
        let config = self.config.snapshot();
        let missing = missing_requisites(&config, self.resolver.as_ref());
        for requisite in &missing {
            let err = ConfigurationError::MissingBinary(*requisite);
            broadcast(&mut self.host, LogLevel::Error, err.to_string());
        }
        if !missing.is_empty() {
            self.log_config_hint();
        }
        missing.is_empty()
    }

    fn start(&mut self, path: &Path, flags: Flags<'_>) -> Result<SessionId, VerifyError> {
        self.supersede();

        let id = self.next_session;
        self.next_session = id.next();
        tracing::info!(session = %id, path = %path.display(), "Starting verification");

        self.status.set_running();
        log(
            &mut self.host,
            LogLevel::Info,
            format!("Starting verification of \"{}\".", path.display()),
        );

        let config = self.config.snapshot();
        let toolchain = match resolve_toolchain(&config, self.resolver.as_ref(), &self.bundle_dir)
        {
            Ok(toolchain) => toolchain,
            Err(err) => return Err(self.fail_to_start(id, path, err.into())),
        };

        let document = match self.host.open_document(path) {
            Ok(document) => document,
            Err(source) => {
                let err = DocumentError {
                    path: path.to_path_buf(),
                    source,
                };
                return Err(self.fail_to_start(id, path, err.into()));
            }
        };

        let invocation = build_invocation(&config, &toolchain, path, flags);
        log(
            &mut self.host,
            LogLevel::Debug,
            format!(
                "Running {} {}",
                invocation.program().display(),
                invocation
                    .args()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
        );

        let process = match supervisor::spawn(&invocation, id, self.event_tx.clone()) {
            Ok(process) => process,
            Err(err) => return Err(self.fail_to_start(id, path, err.into())),
        };

        self.state = SessionState::Active(ActiveSession {
            id,
            path: path.to_path_buf(),
            document,
            process,
            record: SessionRecord::default(),
        });
        Ok(id)
    }

    /// Kill the running session and drop everything it left on the host.
    fn supersede(&mut self) {
        if let SessionState::Active(mut active) = self.replace_with_idle() {
            tracing::info!(
                session = %active.id,
                pid = ?active.process.pid(),
                "Superseding running verification"
            );
            active.process.kill();
        }
        self.clear_annotations();
        self.host.clear_log();
    }

    fn replace_with_idle(&mut self) -> SessionState {
        std::mem::replace(&mut self.state, SessionState::Idle)
    }

    fn clear_annotations(&mut self) {
        if self.hovers_registered {
            self.host.dispose_hovers();
            self.hovers_registered = false;
        }
        self.host.clear_decorations();
    }

    /// Report a failure that ended the session before the verifier ran.
    fn fail_to_start(&mut self, id: SessionId, path: &Path, err: VerifyError) -> VerifyError {
        tracing::warn!(session = %id, "Verification could not start: {err}");
        let summary = match &err {
            VerifyError::Configuration(_) => "Hypra is not configured correctly.".to_string(),
            VerifyError::Document(_) => format!("Could not open \"{}\".", path.display()),
            VerifyError::Spawn(SpawnError::NotFound { program }) => {
                format!("Could not start the verifier: \"{}\" was not found.", program.display())
            }
            VerifyError::Spawn(_) => "Could not start the verifier.".to_string(),
        };
        self.host.notify(LogLevel::Error, &summary);
        log(&mut self.host, LogLevel::Error, err.to_string());
        if matches!(err, VerifyError::Configuration(_)) {
            self.log_config_hint();
        }

        self.status.set_failed();
        self.state = SessionState::Finished(FinishedSession {
            id,
            path: path.to_path_buf(),
            record: SessionRecord::default(),
        });
        err
    }

    fn log_config_hint(&mut self) {
        if let Some(location) = self.config.location() {
            let hint = format!("Hypra settings are read from {}.", location.display());
            log(&mut self.host, LogLevel::Info, hint);
        }
        log(&mut self.host, LogLevel::Info, DEPENDENCY_NOTE);
    }

    /// Drain pending supervisor events, up to `budget`.
    ///
    /// Non-blocking; returns the number of events handled.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    /// Wait for the next supervisor event and apply it.
    pub async fn process_next_event(&mut self) {
        // The manager keeps a sender, so the channel never closes.
        if let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply events until the running session terminates.
    ///
    /// There is no timeout: a verifier that never exits keeps this pending.
    pub async fn run_to_completion(&mut self) -> VerificationStatus {
        while self.active_session().is_some() {
            self.process_next_event().await;
        }
        self.status.status()
    }

    fn handle_event(&mut self, event: SupervisorEvent) {
        let SessionState::Active(active) = &mut self.state else {
            tracing::debug!(session = %event.session, "Dropping event, no active session");
            return;
        };
        if active.id != event.session {
            tracing::debug!(
                session = %event.session,
                active = %active.id,
                "Dropping event from superseded session"
            );
            return;
        }

        match event.output {
            ProcessOutput::Stdout(line) => apply_record(&mut self.host, active, &line),
            ProcessOutput::Stderr(chunk) => {
                self.host.notify(LogLevel::Error, STDERR_NOTICE);
                log(&mut self.host, LogLevel::Error, chunk);
            }
            ProcessOutput::Exited(termination) => self.finish(termination),
        }
    }

    fn finish(&mut self, termination: Termination) {
        let SessionState::Active(active) = self.replace_with_idle() else {
            return;
        };
        let ActiveSession {
            id, path, record, ..
        } = active;
        tracing::info!(
            session = %id,
            termination = %termination,
            errors = record.diagnostics.len(),
            "Verification finished"
        );

        if !termination.is_clean() {
            // The verifier died; whatever it reported so far is still shown.
            self.annotate(&path, &record.diagnostics);
            broadcast(
                &mut self.host,
                LogLevel::Error,
                format!("Verification finished with {termination}."),
            );
            self.status.set_failed();
        } else if record.errors_occurred {
            self.annotate(&path, &record.diagnostics);
            let message = match record.diagnostics.len() {
                0 => "Verification failed.".to_string(),
                1 => "Verification failed with 1 error.".to_string(),
                n => format!("Verification failed with {n} errors."),
            };
            broadcast(&mut self.host, LogLevel::Error, message);
            self.status.set_failed();
        } else {
            broadcast(
                &mut self.host,
                LogLevel::Info,
                format!("Verification of \"{}\" succeeded.", path.display()),
            );
            self.status.set_success();
        }

        self.state = SessionState::Finished(FinishedSession { id, path, record });
    }

    /// Ask the host to underline and hover every positioned diagnostic.
    fn annotate(&mut self, path: &Path, diagnostics: &[Diagnostic]) {
        let hovers: Vec<Hover> = diagnostics
            .iter()
            .filter_map(|diagnostic| {
                diagnostic.span().map(|span| Hover {
                    span: *span,
                    text: diagnostic.render(),
                })
            })
            .collect();
        if hovers.is_empty() {
            return;
        }
        let spans: Vec<_> = hovers.iter().map(|hover| hover.span).collect();
        self.host.render_decorations(path, &spans);
        self.host.register_hovers(path, &hovers);
        self.hovers_registered = true;
    }

    /// Immutable view of the current, or most recent, session.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let status = self.status.status();
        let (id, path, record) = match &self.state {
            SessionState::Idle => {
                return DiagnosticsSnapshot::new(None, None, status, Vec::new(), 0);
            }
            SessionState::Active(active) => (active.id, &active.path, &active.record),
            SessionState::Finished(finished) => (finished.id, &finished.path, &finished.record),
        };
        DiagnosticsSnapshot::new(
            Some(id),
            Some(path.clone()),
            status,
            record.diagnostics.clone(),
            record.warnings,
        )
    }

    /// Kill any running verifier, drop all annotations and go back to idle.
    pub fn shutdown(&mut self) {
        if let SessionState::Active(mut active) = self.replace_with_idle() {
            tracing::info!(session = %active.id, "Stopping verifier for shutdown");
            active.process.kill();
        }
        self.clear_annotations();
        self.status.reset();
    }
}

/// Apply one stdout record to the active session.
fn apply_record<H: HostSurface>(host: &mut H, active: &mut ActiveSession, line: &str) {
    match protocol::decode_record(line) {
        Ok(ProtocolEvent::Diagnostic(diagnostic)) => {
            if diagnostic.severity().is_error() {
                let span = match active.document.anchor(&diagnostic) {
                    Ok(span) => span,
                    Err(invalid) => {
                        log(
                            host,
                            LogLevel::Warn,
                            format!("Ignoring {invalid} of \"{}\"", diagnostic.render()),
                        );
                        None
                    }
                };
                let diagnostic = diagnostic.with_span(span);
                log(host, LogLevel::Error, diagnostic.display_with_path(&active.path));
                active.record.errors_occurred = true;
                active.record.diagnostics.push(diagnostic);
            } else {
                if diagnostic.severity() == Severity::Warning {
                    active.record.warnings += 1;
                }
                log(host, diagnostic.severity().into(), diagnostic.render());
            }
        }
        Ok(ProtocolEvent::Stream {
            class,
            name,
            description,
        }) => {
            let text = format!("{name}: {description}");
            match class {
                StreamErrorClass::Fatal => {
                    active.record.errors_occurred = true;
                    broadcast(host, LogLevel::Error, text);
                }
                StreamErrorClass::Warning => {
                    active.record.warnings += 1;
                    broadcast(host, LogLevel::Warn, text);
                }
                StreamErrorClass::Informational => log(host, LogLevel::Info, text),
            }
        }
        Err(err) => log(
            host,
            LogLevel::Warn,
            format!(
                "Could not parse verifier output ({}): {}",
                err.reason(),
                err.raw()
            ),
        ),
    }
}
