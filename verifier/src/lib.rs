//! Session controller for the external Hypra verifier.

pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod invocation;
pub mod log_sink;
pub mod mapper;
pub mod protocol;
pub mod status;
pub mod types;

pub(crate) mod supervisor;

mod manager;

pub use config::{
    BinaryResolver, ConfigFile, ConfigProvider, SearchPath, VerifierConfig, VerifierOptions,
};
pub use error::{ConfigurationError, DocumentError, SpawnError, VerifyError};
pub use host::{Hover, HostSurface};
pub use log_sink::{LogEntry, LogLevel};
pub use manager::{SOURCE_EXTENSION, SessionManager, is_verifier_source};
pub use mapper::{Position, PositionEncoding, Span, TextSnapshot};
pub use status::{StatusFrame, VerificationStatus};
pub use types::{Diagnostic, DiagnosticsSnapshot, SessionId, Severity};
