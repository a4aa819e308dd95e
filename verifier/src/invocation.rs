//! Command line and environment for one verifier run.
//!
//! Argument order mirrors the verifier's CLI contract:
//!
//! ```text
//! java -Xss32m -jar <hhl.jar> <file> [--forall] [--exists] [--noframe]
//!      [--existsframe] [--auto] [--inline] [--output <file.vpr>] --ext
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{Requisite, Toolchain, VerifierConfig};

/// JVM thread stack size; the verifier recurses deeply on large programs.
pub const STACK_SIZE_FLAG: &str = "-Xss32m";
const JAR_FLAG: &str = "-jar";
const OUTPUT_FLAG: &str = "--output";
/// Declares that the verifier is driven by an external tool and should emit
/// structured records.
pub const EXTERNAL_MODE_FLAG: &str = "--ext";

/// Extension of the saved intermediate encoding.
pub const ENCODING_EXTENSION: &str = "vpr";

pub const Z3_ENV: &str = "Z3_EXE";
pub const BOOGIE_ENV: &str = "BOOGIE_EXE";

/// Which verifier flags to pass.
#[derive(Debug, Clone, Copy)]
pub enum Flags<'a> {
    /// Flags gated by the configuration options.
    FromConfig,
    /// Caller-supplied flags, replacing the configured ones.
    Custom(&'a [String]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    /// Overlaid on the inherited environment.
    env: Vec<(&'static str, OsString)>,
}

impl Invocation {
    #[cfg(test)]
    pub(crate) fn for_test(program: PathBuf, args: Vec<OsString>) -> Self {
        Self {
            program,
            args,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub fn env(&self) -> &[(&'static str, OsString)] {
        &self.env
    }
}

/// Path the verifier writes its intermediate encoding to.
#[must_use]
pub fn encoding_output_path(target: &Path) -> PathBuf {
    target.with_extension(ENCODING_EXTENSION)
}

#[must_use]
pub fn build_invocation(
    config: &VerifierConfig,
    toolchain: &Toolchain,
    target: &Path,
    flags: Flags<'_>,
) -> Invocation {
    let mut args: Vec<OsString> = vec![
        STACK_SIZE_FLAG.into(),
        JAR_FLAG.into(),
        toolchain.verifier_jar.clone().into(),
        target.into(),
    ];

    match flags {
        Flags::FromConfig => {
            let options = &config.options;
            let gated = [
                (options.forall_encoding, "--forall"),
                (options.exists_encoding, "--exists"),
                (options.no_frame, "--noframe"),
                (options.exists_frame, "--existsframe"),
                (options.auto, "--auto"),
                (options.inline, "--inline"),
            ];
            args.extend(
                gated
                    .into_iter()
                    .filter(|(enabled, _)| *enabled)
                    .map(|(_, flag)| OsString::from(flag)),
            );
            if options.save_viper_encoding {
                args.push(OUTPUT_FLAG.into());
                args.push(encoding_output_path(target).into());
            }
        }
        Flags::Custom(custom) => args.extend(custom.iter().map(OsString::from)),
    }
    args.push(EXTERNAL_MODE_FLAG.into());

    let mut env = Vec::new();
    if config.configured(Requisite::Z3).is_some() {
        env.push((Z3_ENV, toolchain.z3.clone().into_os_string()));
    }
    if config.configured(Requisite::Boogie).is_some() {
        env.push((BOOGIE_ENV, toolchain.boogie.clone().into_os_string()));
    }

    Invocation {
        program: toolchain.java.clone(),
        args,
        env,
    }
}
