//! Build, test and archive stages.

use crate::compilers::resolve_compilers;
use crate::error::{CiError, Result};
use crate::matrix::{BuildMatrix, DebugSymbolPolicy, ExecutableTransfer, ImageFormatPolicy};
use crate::platform::Platform;
use crate::process::{Invocation, ProcessRunner};
use crate::workspace::Workspace;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// CMake hook file included before the project's own settings.
pub const CMAKE_USER_BEGIN: &str = "cmake_user_begin.cmake";
/// Staging directory that becomes the root of the application archive.
pub const ARCHIVE_ROOT: &str = "archive-root";
/// GUI executable target.
pub const EXE_NAME: &str = "exotracker-qt";
/// Unit test executable target.
pub const TEST_EXE_NAME: &str = "exotracker-tests";

const DISABLE_PCH_DIRECTIVE: &str = "set(USE_PCH FALSE)\n";

/// A file produced by `archive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub sha256: String,
}

impl Artifact {
    fn from_file(path: PathBuf) -> Result<Self> {
        let mut file = fs::File::open(&path).map_err(CiError::io("open", &path))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(CiError::io("read", &path))?;
        let sha256 = hex::encode(hasher.finalize());
        Ok(Self { path, sha256 })
    }
}

/// Everything `archive` published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutputs {
    pub application: Artifact,
    pub debug_symbols: Option<Artifact>,
}

/// Runs the CI stages for one job.
pub struct Orchestrator {
    matrix: BuildMatrix,
    workspace: Workspace,
    runner: Arc<dyn ProcessRunner>,
    search_path: Option<OsString>,
}

impl Orchestrator {
    /// Compilers are looked up on the process `PATH` unless overridden with
    /// [`Orchestrator::with_search_path`].
    pub fn new(matrix: BuildMatrix, workspace: Workspace, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            matrix,
            workspace,
            runner,
            search_path: std::env::var_os("PATH"),
        }
    }

    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn matrix(&self) -> &BuildMatrix {
        &self.matrix
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Configure with CMake and build everything with Ninja.
    pub async fn build(&self) -> Result<()> {
        let compilers = resolve_compilers(
            &self.matrix.compilers,
            self.search_path.as_deref(),
            &self.workspace.cwd(),
        )?;

        if self.matrix.disable_pch {
            self.disable_precompiled_headers()?;
        }

        let build_dir = self.workspace.path(self.matrix.build_dir_name());
        fs::create_dir_all(&build_dir).map_err(CiError::io("create", &build_dir))?;
        info!(
            stage = "build",
            build_dir = %build_dir.display(),
            configuration = %self.matrix.configuration,
            "Configuring"
        );

        let _build = self.workspace.push_dir(&build_dir)?;
        let cwd = self.workspace.cwd();

        let cmake = Invocation::new("cmake", &cwd)
            .arg("..")
            .arg(format!("-DCMAKE_BUILD_TYPE={}", self.matrix.configuration))
            .args(["-G", "Ninja"])
            .envs(compilers.env_vars());
        self.runner.run(&cmake).await?;

        info!(stage = "build", "Compiling");
        let ninja = Invocation::new("ninja", &cwd).envs(compilers.env_vars());
        self.runner.run(&ninja).await?;

        info!(stage = "build", "Build finished");
        Ok(())
    }

    /// Run the unit test binary from an existing build directory.
    pub async fn test(&self) -> Result<()> {
        let build_dir = self.existing_build_dir()?;
        let _build = self.workspace.push_dir(&build_dir)?;

        let test_exe =
            build_dir.join(format!("{TEST_EXE_NAME}{}", std::env::consts::EXE_SUFFIX));
        info!(stage = "test", exe = %test_exe.display(), "Running tests");

        let tests = Invocation::new(test_exe.to_string_lossy(), self.workspace.cwd());
        self.runner.run(&tests).await
    }

    /// Assemble the release archive and publish debug symbols.
    ///
    /// The staging directory is wiped first, so repeated runs against the same
    /// build output stage exactly the same files.
    pub async fn archive(&self, platform: &dyn Platform) -> Result<ArchiveOutputs> {
        let policy = self.matrix.archive;
        let root_dir = self.workspace.cwd();
        let build_dir = self.existing_build_dir()?;
        let archive_base = self.workspace.path(self.matrix.archive_name());
        let ext = platform.archive_extension();

        info!(
            stage = "archive",
            platform = platform.name(),
            archive = %archive_base.display(),
            policy = ?policy,
            "Assembling release"
        );

        let stage_dir = self.workspace.path(ARCHIVE_ROOT);
        recreate_dir(&stage_dir)?;

        let exe = platform.executable(EXE_NAME);
        let app_archive = append_extension(&archive_base, ext);
        {
            let _stage = self.workspace.push_dir(&stage_dir)?;
            let cwd = self.workspace.cwd();

            transfer(&build_dir.join(&exe), &cwd.join(&exe), policy.executable)?;

            info!(stage = "archive", "Deploying Qt runtime");
            let deploy = platform.deploy_runtime(&exe, policy.image_formats, &cwd);
            self.runner.run(&deploy).await?;

            prune_image_formats(
                &cwd.join(platform.image_formats_dir()),
                platform.svg_plugin_prefix(),
                policy.image_formats,
            )?;

            remove_file_if_exists(&app_archive)?;
            let compress = platform.compress(&app_archive, &[Path::new(".")], &cwd);
            self.runner.run(&compress).await?;
        }

        let application = Artifact::from_file(app_archive)?;
        info!(
            stage = "archive",
            path = %application.path.display(),
            sha256 = %application.sha256,
            "Application archive ready"
        );

        let debug_symbols = match platform.debug_symbols(EXE_NAME) {
            None => None,
            Some(symbols) => {
                let source = build_dir.join(&symbols);
                let artifact = match policy.debug_symbols {
                    // Debuggers refuse symbol files that have been renamed, so
                    // only the archive carries the release name.
                    DebugSymbolPolicy::Compress => {
                        let symbols_archive =
                            append_extension(&append_extension(&archive_base, "pdb"), ext);
                        remove_file_if_exists(&symbols_archive)?;
                        let compress =
                            platform.compress(&symbols_archive, &[source.as_path()], &root_dir);
                        self.runner.run(&compress).await?;
                        Artifact::from_file(symbols_archive)?
                    }
                    DebugSymbolPolicy::Rename => {
                        let target = append_extension(&archive_base, "pdb");
                        fs::copy(&source, &target).map_err(CiError::io("copy", &source))?;
                        Artifact::from_file(target)?
                    }
                };
                info!(
                    stage = "archive",
                    path = %artifact.path.display(),
                    sha256 = %artifact.sha256,
                    "Debug symbols ready"
                );
                Some(artifact)
            }
        };

        Ok(ArchiveOutputs {
            application,
            debug_symbols,
        })
    }

    fn existing_build_dir(&self) -> Result<PathBuf> {
        let build_dir = self.workspace.path(self.matrix.build_dir_name());
        if build_dir.is_dir() {
            Ok(build_dir)
        } else {
            Err(CiError::BuildDirMissing(build_dir))
        }
    }

    fn disable_precompiled_headers(&self) -> Result<()> {
        let path = self.workspace.path(CMAKE_USER_BEGIN);
        info!(path = %path.display(), "Disabling precompiled headers");

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(CiError::io("open", &path))?;
        file.write_all(DISABLE_PCH_DIRECTIVE.as_bytes())
            .map_err(CiError::io("write", &path))
    }
}

/// `path` with `.ext` appended, keeping any dots already in the name.
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn recreate_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => debug!(dir = %dir.display(), "Removed previous staging directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(CiError::io("remove", dir)(e)),
    }
    fs::create_dir(dir).map_err(CiError::io("create", dir))
}

fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CiError::io("remove", path)(e)),
    }
}

fn transfer(source: &Path, target: &Path, mode: ExecutableTransfer) -> Result<()> {
    debug!(from = %source.display(), to = %target.display(), mode = %mode, "Staging executable");
    match mode {
        ExecutableTransfer::Copy => fs::copy(source, target)
            .map(|_| ())
            .map_err(CiError::io("copy", source)),
        ExecutableTransfer::Move => fs::rename(source, target).map_err(CiError::io("move", source)),
    }
}

/// Drop image format plugins the tracker never loads.
///
/// A missing plugin directory means the deployment tool had nothing to add.
fn prune_image_formats(dir: &Path, svg_prefix: &str, policy: ImageFormatPolicy) -> Result<()> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "No image format plugins deployed");
        return Ok(());
    }

    match policy {
        ImageFormatPolicy::RemoveAll => {
            fs::remove_dir_all(dir).map_err(CiError::io("remove", dir))?;
        }
        ImageFormatPolicy::KeepSvg => {
            for entry in fs::read_dir(dir).map_err(CiError::io("list", dir))? {
                let path = entry.map_err(CiError::io("list", dir))?.path();
                let keep = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(svg_prefix));
                if !keep {
                    debug!(plugin = %path.display(), "Removing image format plugin");
                    fs::remove_file(&path).map_err(CiError::io("remove", &path))?;
                }
            }
        }
    }
    Ok(())
}
