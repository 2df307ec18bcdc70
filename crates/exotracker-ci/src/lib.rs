//! exotracker CI - build orchestration for CI jobs
//!
//! Turns the CI job matrix (environment variables) into:
//! - a CMake + Ninja build in a per-job build directory
//! - a run of the unit test binary
//! - a release archive with the Qt runtime bundled, plus debug symbols

pub mod compilers;
pub mod error;
pub mod fakes;
pub mod matrix;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use compilers::{resolve_compilers, ResolvedCompilers};
pub use error::{CiError, Result};
pub use matrix::{
    sanitize_path, ArchivePolicy, BuildMatrix, CompilerSelectors, DebugSymbolPolicy,
    ExecutableTransfer, ImageFormatPolicy,
};
pub use orchestrator::{ArchiveOutputs, Artifact, Orchestrator};
pub use platform::{Platform, Windows};
pub use process::{Invocation, ProcessRunner, SystemRunner};
pub use telemetry::init_tracing;
pub use workspace::{PushDir, Workspace};
