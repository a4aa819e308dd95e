//! Verifier configuration: required binaries and verification flags.
//!
//! The controller reads one immutable [`VerifierConfig`] per `verify()` call
//! through a [`ConfigProvider`], and never writes it back.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigurationError;

/// Dependency versions the verifier is tested against.
pub const DEPENDENCY_NOTE: &str = "This application relies on:\n- Java 17.*\n- Boogie 2.15.8.0\n- z3 4.8.14\nUsing other versions is possible, but not recommended and happens at the risk of the user.";

/// Name of the verifier jar inside the bundle directory.
pub const BUNDLED_JAR: &str = "hhl.jar";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    pub requisites: Requisites,
    pub options: VerifierOptions,
}

/// Paths to external binaries. Unset or empty means "look on PATH".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Requisites {
    pub java_path: Option<PathBuf>,
    pub z3_path: Option<PathBuf>,
    pub boogie_path: Option<PathBuf>,
    /// Custom verifier jar; takes precedence over the bundled one.
    pub hypra_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VerifierOptions {
    pub forall_encoding: bool,
    pub exists_encoding: bool,
    pub no_frame: bool,
    pub exists_frame: bool,
    pub auto: bool,
    pub inline: bool,
    /// Write the intermediate Viper encoding next to the source file.
    pub save_viper_encoding: bool,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            forall_encoding: false,
            exists_encoding: false,
            no_frame: false,
            exists_frame: false,
            auto: true,
            inline: false,
            save_viper_encoding: false,
        }
    }
}

/// A binary the verifier cannot run without.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Requisite {
    Java,
    Z3,
    Boogie,
}

impl Requisite {
    pub const ALL: [Self; 3] = [Self::Java, Self::Z3, Self::Boogie];

    #[must_use]
    pub fn binary_name(self) -> &'static str {
        match self {
            Self::Java => "java",
            Self::Z3 => "z3",
            Self::Boogie => "boogie",
        }
    }

    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            Self::Java => "requisites.java_path",
            Self::Z3 => "requisites.z3_path",
            Self::Boogie => "requisites.boogie_path",
        }
    }
}

fn non_empty(path: Option<&PathBuf>) -> Option<&Path> {
    path.map(PathBuf::as_path)
        .filter(|p| !p.as_os_str().is_empty())
}

impl VerifierConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// The configured path for `requisite`, if set and non-empty.
    #[must_use]
    pub fn configured(&self, requisite: Requisite) -> Option<&Path> {
        let requisites = &self.requisites;
        non_empty(match requisite {
            Requisite::Java => requisites.java_path.as_ref(),
            Requisite::Z3 => requisites.z3_path.as_ref(),
            Requisite::Boogie => requisites.boogie_path.as_ref(),
        })
    }

    #[must_use]
    pub fn custom_verifier(&self) -> Option<&Path> {
        non_empty(self.requisites.hypra_path.as_ref())
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".hypra").join("config.toml"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Passive source of configuration snapshots.
pub trait ConfigProvider {
    fn snapshot(&self) -> VerifierConfig;

    /// Where the user edits this configuration, for remediation hints.
    fn location(&self) -> Option<&Path> {
        None
    }
}

impl ConfigProvider for VerifierConfig {
    fn snapshot(&self) -> VerifierConfig {
        self.clone()
    }
}

/// Configuration backed by a TOML file, re-read on every snapshot so edits
/// apply to the next verification.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `~/.hypra/config.toml`, when a home directory exists.
    #[must_use]
    pub fn default_location() -> Option<Self> {
        config_path().map(Self::new)
    }
}

impl ConfigProvider for ConfigFile {
    fn snapshot(&self) -> VerifierConfig {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No config file, using defaults");
            return VerifierConfig::default();
        }
        VerifierConfig::load_from(&self.path).unwrap_or_else(|err| {
            tracing::warn!("{err}; using defaults");
            VerifierConfig::default()
        })
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Locates executables that were not configured explicitly.
pub trait BinaryResolver {
    fn resolve(&self, binary: &str) -> Option<PathBuf>;
}

/// Resolves against the process `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchPath;

impl BinaryResolver for SearchPath {
    fn resolve(&self, binary: &str) -> Option<PathBuf> {
        which::which(binary).ok()
    }
}

/// Paths resolved for one verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub java: PathBuf,
    pub z3: PathBuf,
    pub boogie: PathBuf,
    pub verifier_jar: PathBuf,
}

/// Resolve one requisite: configured path verbatim, else the search path.
pub fn resolve_requisite(
    config: &VerifierConfig,
    resolver: &dyn BinaryResolver,
    requisite: Requisite,
) -> Option<PathBuf> {
    config
        .configured(requisite)
        .map(Path::to_path_buf)
        .or_else(|| resolver.resolve(requisite.binary_name()))
}

/// Every requisite that can be neither configured nor found.
#[must_use]
pub fn missing_requisites(config: &VerifierConfig, resolver: &dyn BinaryResolver) -> Vec<Requisite> {
    Requisite::ALL
        .into_iter()
        .filter(|&req| resolve_requisite(config, resolver, req).is_none())
        .collect()
}

/// Resolve everything a run needs.
///
/// `bundle_dir` is where the bundled verifier jar lives; a custom jar path in
/// the config takes precedence over it.
pub fn resolve_toolchain(
    config: &VerifierConfig,
    resolver: &dyn BinaryResolver,
    bundle_dir: &Path,
) -> Result<Toolchain, ConfigurationError> {
    let resolve = |requisite| {
        resolve_requisite(config, resolver, requisite)
            .ok_or(ConfigurationError::MissingBinary(requisite))
    };
    let java = resolve(Requisite::Java)?;
    let z3 = resolve(Requisite::Z3)?;
    let boogie = resolve(Requisite::Boogie)?;

    let verifier_jar = config
        .custom_verifier()
        .map_or_else(|| bundle_dir.join(BUNDLED_JAR), Path::to_path_buf);
    if !verifier_jar.is_file() {
        return Err(ConfigurationError::MissingVerifier(verifier_jar));
    }

    Ok(Toolchain {
        java,
        z3,
        boogie,
        verifier_jar,
    })
}
