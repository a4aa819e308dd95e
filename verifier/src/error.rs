//! Session-level failures.
//!
//! Each of these ends the current session only. By the time `verify()`
//! returns one, it has already been reported to the host.

use std::io;
use std::path::PathBuf;

use crate::config::Requisite;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error(
        "\"{binary}\" was not found. Set `{key}` in the Hypra configuration or add \"{binary}\" to PATH.",
        binary = .0.binary_name(),
        key = .0.config_key()
    )]
    MissingBinary(Requisite),
    #[error(
        "Hypra verifier not found at {}. Set `requisites.hypra_path` in the Hypra configuration.",
        .0.display()
    )]
    MissingVerifier(PathBuf),
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("{} does not exist or is not executable", program.display())]
    NotFound { program: PathBuf },
    #[error("failed to start {}: {source}", program.display())]
    Other {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no {stream} pipe from verifier process")]
    MissingPipe { stream: &'static str },
}

impl SpawnError {
    pub(crate) fn from_io(program: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound { program }
        } else {
            Self::Other { program, source }
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("cannot open {}: {source}", path.display())]
pub struct DocumentError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_message_names_config_key() {
        let err = ConfigurationError::MissingBinary(Requisite::Z3);
        let msg = err.to_string();
        assert!(msg.contains("\"z3\" was not found"));
        assert!(msg.contains("requisites.z3_path"));
    }

    #[test]
    fn test_spawn_error_distinguishes_not_found() {
        let not_found = SpawnError::from_io(
            PathBuf::from("/nope/java"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(matches!(not_found, SpawnError::NotFound { .. }));

        let denied = SpawnError::from_io(
            PathBuf::from("/bin/java"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(denied, SpawnError::Other { .. }));
    }
}
