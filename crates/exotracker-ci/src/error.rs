//! Error types for CI pipeline operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, testing or packaging
#[derive(Error, Debug)]
pub enum CiError {
    /// Environment variable holds a value we cannot interpret
    #[error("{var} environment value {value:?} is invalid: {reason}")]
    InvalidConfig {
        var: String,
        value: String,
        reason: String,
    },

    /// Required environment variable is not set
    #[error("required environment variable {0} is not set")]
    MissingEnv(String),

    /// Compiler selector could not be found on the search path
    #[error("{var}={program} not found on PATH: {source}")]
    CompilerNotFound {
        var: String,
        program: String,
        #[source]
        source: which::Error,
    },

    /// Build directory from a previous `build` invocation does not exist
    #[error("build directory not found: {0} (run `build` first)")]
    BuildDirMissing(PathBuf),

    /// External tool could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited unsuccessfully
    #[error("{program} failed with {}", exit_description(.code))]
    CommandFailed { program: String, code: Option<i32> },

    /// Filesystem operation failed on a known path
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive assembly is not implemented for this OS
    #[error("archiving is not supported on {0}")]
    UnsupportedPlatform(String),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl CiError {
    /// Adapter for `map_err` that attaches the failing action and path.
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| CiError::Io {
            action,
            path,
            source,
        }
    }

    /// Process exit status to report for this error.
    ///
    /// A failing child's own exit code is passed through so the CI platform
    /// sees exactly what the tool returned.
    pub fn exit_code(&self) -> u8 {
        match self {
            CiError::CommandFailed {
                code: Some(code), ..
            } => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(1),
            _ => 1,
        }
    }
}

/// Result type for CI pipeline operations
pub type Result<T> = std::result::Result<T, CiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_exit_code_passthrough() {
        let err = CiError::CommandFailed {
            program: "exotracker-tests".to_string(),
            code: Some(3),
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "exotracker-tests failed with exit code 3");
    }

    #[test]
    fn test_out_of_range_exit_code_maps_to_one() {
        let err = CiError::CommandFailed {
            program: "ninja".to_string(),
            code: Some(-1073741819),
        };
        assert_eq!(err.exit_code(), 1);

        let err = CiError::CommandFailed {
            program: "ninja".to_string(),
            code: None,
        };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(CiError::MissingEnv("CC".to_string()).exit_code(), 1);
    }
}
