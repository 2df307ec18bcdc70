//! Compiler path resolution.
//!
//! CMake wants `CC` and `CXX` to be absolute paths, but CI images usually
//! set them to bare command names like `clang-cl`. The resolved paths are
//! handed to child processes as explicit environment overrides instead of
//! being written back into our own environment.

use crate::error::{CiError, Result};
use crate::matrix::{CompilerSelectors, CC_VAR, CXX_VAR};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Absolute paths of the C and C++ compilers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCompilers {
    pub cc: PathBuf,
    pub cxx: PathBuf,
}

impl ResolvedCompilers {
    /// Environment overrides for child processes.
    pub fn env_vars(&self) -> Vec<(String, OsString)> {
        vec![
            (CC_VAR.to_string(), self.cc.clone().into_os_string()),
            (CXX_VAR.to_string(), self.cxx.clone().into_os_string()),
        ]
    }
}

/// Resolve both compiler selectors against `search_path`.
///
/// Relative selectors containing a path separator are resolved against
/// `cwd`, matching what a shell would do.
pub fn resolve_compilers(
    selectors: &CompilerSelectors,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<ResolvedCompilers> {
    let cc = resolve_one(CC_VAR, selectors.cc.as_deref(), search_path, cwd)?;
    let cxx = resolve_one(CXX_VAR, selectors.cxx.as_deref(), search_path, cwd)?;
    Ok(ResolvedCompilers { cc, cxx })
}

fn resolve_one(
    var: &str,
    program: Option<&str>,
    search_path: Option<&OsStr>,
    cwd: &Path,
) -> Result<PathBuf> {
    let program = program.ok_or_else(|| CiError::MissingEnv(var.to_string()))?;

    let path = which::which_in(program, search_path, cwd).map_err(|source| {
        CiError::CompilerNotFound {
            var: var.to_string(),
            program: program.to_string(),
            source,
        }
    })?;

    debug!(var, program, path = %path.display(), "Resolved compiler");
    Ok(path)
}
