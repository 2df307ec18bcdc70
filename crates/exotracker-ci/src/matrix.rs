//! CI job matrix configuration.
//!
//! Everything the pipeline needs to know about the current job arrives as
//! environment variables set by the CI matrix. They are read exactly once,
//! validated, and frozen into a [`BuildMatrix`] that is passed by reference
//! to each stage.

use crate::error::{CiError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Which VM and build configuration (32/64, compiler, target OS) is being used.
pub const JOB_NAME_VAR: &str = "APPVEYOR_JOB_NAME";
/// Debug or release build.
pub const CONFIGURATION_VAR: &str = "CONFIGURATION";
/// Disable precompiled headers to expose missing #includes.
pub const DISABLE_PCH_VAR: &str = "DISABLE_PCH";
/// Version string stamped into archive names.
pub const BUILD_VERSION_VAR: &str = "APPVEYOR_BUILD_VERSION";
pub const EXE_TRANSFER_VAR: &str = "ARCHIVE_EXE_TRANSFER";
pub const IMAGE_FORMATS_VAR: &str = "ARCHIVE_IMAGEFORMATS";
pub const DEBUG_SYMBOLS_VAR: &str = "ARCHIVE_DEBUG_SYMBOLS";
/// C compiler selector, rewritten to an absolute path before CMake runs.
pub const CC_VAR: &str = "CC";
/// C++ compiler selector, rewritten to an absolute path before CMake runs.
pub const CXX_VAR: &str = "CXX";

const MATRIX_VARS: [&str; 9] = [
    JOB_NAME_VAR,
    CONFIGURATION_VAR,
    DISABLE_PCH_VAR,
    BUILD_VERSION_VAR,
    EXE_TRANSFER_VAR,
    IMAGE_FORMATS_VAR,
    DEBUG_SYMBOLS_VAR,
    CC_VAR,
    CXX_VAR,
];

/// Configuration that gets no suffix in archive names.
pub const DEFAULT_CONFIGURATION: &str = "Release";

const DEFAULT_VERSION: &str = "UnknownVer";

/// Replace all characters except alphanumerics and separators with underscores.
pub fn sanitize_path(filename: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE
        .get_or_init(|| Regex::new(r"[^a-zA-Z0-9_\-.]").expect("sanitize pattern is valid"));
    re.replace_all(filename, "_").into_owned()
}

/// Parse the `""`/`"0"`/`"1"` convention used by matrix flags.
pub fn parse_bool_int(s: &str) -> Option<bool> {
    match s {
        "" | "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

/// How the built executable gets into the staging directory.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutableTransfer {
    /// Leave the build output intact so `archive` can be rerun locally.
    #[default]
    Copy,
    /// Move the executable out of the build directory.
    Move,
}

/// What to do with the Qt `imageformats` plugin directory after deployment.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageFormatPolicy {
    /// Delete every plugin except the SVG one.
    #[default]
    KeepSvg,
    /// Skip SVG during deployment and delete the whole directory.
    RemoveAll,
}

/// How debug symbols are published next to the application archive.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DebugSymbolPolicy {
    /// Compress the symbol file, unrenamed, into `<archive>.pdb.7z`.
    #[default]
    Compress,
    /// Copy the symbol file uncompressed to `<archive>.pdb` in the project
    /// root. The build output stays in place so `archive` can be rerun.
    ///
    /// Visual Studio will not load a renamed `.pdb`; consumers must rename
    /// it back to `exotracker-qt.pdb`.
    Rename,
}

macro_rules! policy_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    _ => Err(format!(
                        "expected one of: {}",
                        [$($name),+].join(", ")
                    )),
                }
            }
        }
    };
}

policy_names!(ExecutableTransfer { Copy => "copy", Move => "move" });
policy_names!(ImageFormatPolicy { KeepSvg => "keep-svg", RemoveAll => "remove-all" });
policy_names!(DebugSymbolPolicy { Compress => "compress", Rename => "rename" });

/// Packaging choices for `archive`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivePolicy {
    pub executable: ExecutableTransfer,
    pub image_formats: ImageFormatPolicy,
    pub debug_symbols: DebugSymbolPolicy,
}

/// Raw `CC`/`CXX` values as found in the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilerSelectors {
    pub cc: Option<String>,
    pub cxx: Option<String>,
}

/// Immutable per-process view of the CI job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildMatrix {
    pub job_name: String,
    pub configuration: String,
    pub version: String,
    pub disable_pch: bool,
    pub archive: ArchivePolicy,
    pub compilers: CompilerSelectors,
}

impl BuildMatrix {
    /// Read the matrix from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_os_lookup(|key| std::env::var_os(key))
    }

    /// Read the matrix through a lookup returning raw OS strings.
    ///
    /// A set variable whose value is not valid UTF-8 is rejected rather than
    /// treated as unset, so a corrupted `DISABLE_PCH` cannot silently fall
    /// back to its default.
    pub fn from_os_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let mut vars = HashMap::new();
        for var in MATRIX_VARS {
            if let Some(raw) = lookup(var) {
                let value = raw.into_string().map_err(|raw| CiError::InvalidConfig {
                    var: var.to_string(),
                    value: raw.to_string_lossy().into_owned(),
                    reason: "not valid UTF-8".to_string(),
                })?;
                vars.insert(var, value);
            }
        }
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read the matrix through an arbitrary variable lookup.
    ///
    /// Malformed values fail here, before any stage has a chance to run.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let disable_pch_raw = or_default(DISABLE_PCH_VAR, "0");
        let disable_pch = parse_bool_int(&disable_pch_raw).ok_or_else(|| CiError::InvalidConfig {
            var: DISABLE_PCH_VAR.to_string(),
            value: disable_pch_raw.clone(),
            reason: "must be 0 or 1 if present".to_string(),
        })?;

        let archive = ArchivePolicy {
            executable: parse_policy(&lookup, EXE_TRANSFER_VAR)?,
            image_formats: parse_policy(&lookup, IMAGE_FORMATS_VAR)?,
            debug_symbols: parse_policy(&lookup, DEBUG_SYMBOLS_VAR)?,
        };

        Ok(Self {
            job_name: or_default(JOB_NAME_VAR, JOB_NAME_VAR),
            configuration: or_default(CONFIGURATION_VAR, DEFAULT_CONFIGURATION),
            version: or_default(BUILD_VERSION_VAR, DEFAULT_VERSION),
            disable_pch,
            archive,
            compilers: CompilerSelectors {
                cc: lookup(CC_VAR),
                cxx: lookup(CXX_VAR),
            },
        })
    }

    /// Build directory name, unique per job and configuration.
    ///
    /// Distinct matrix entries that sanitize to the same name will share a
    /// directory.
    pub fn build_dir_name(&self) -> String {
        sanitize_path(&format!("build-{}-{}", self.job_name, self.configuration))
    }

    /// Base name (no extension) of the release artifacts.
    pub fn archive_name(&self) -> String {
        let configuration = if self.configuration == DEFAULT_CONFIGURATION {
            String::new()
        } else {
            format!("-{}", self.configuration)
        };

        format!("exotracker-v{}{}-dev", self.version, configuration)
    }
}

fn parse_policy<T, F>(lookup: &F, var: &str) -> Result<T>
where
    T: FromStr<Err = String> + Default,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(T::default()),
        Some(value) if value.is_empty() => Ok(T::default()),
        Some(value) => value.parse().map_err(|reason| CiError::InvalidConfig {
            var: var.to_string(),
            value,
            reason,
        }),
    }
}
