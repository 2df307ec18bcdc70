//! Per-OS packaging strategy.
//!
//! The archive stage is identical on every OS except for file naming and the
//! tools used to deploy Qt and to compress the result. Those pieces live
//! behind [`Platform`]; adding an OS means adding an implementation, not
//! touching the orchestrator.

use crate::error::{CiError, Result};
use crate::matrix::ImageFormatPolicy;
use crate::process::Invocation;
use std::fmt;
use std::path::Path;

/// 7-Zip compression level. Speed matters more than size for CI artifacts.
pub const COMPRESSION_LEVEL: u8 = 3;

/// OS-specific pieces of release packaging.
pub trait Platform: Send + Sync + fmt::Debug {
    /// Short OS name for logs.
    fn name(&self) -> &'static str;

    /// File name of an executable target as the build emits it.
    fn executable(&self, stem: &str) -> String;

    /// Debug symbol file the build emits next to the executable, if separate.
    fn debug_symbols(&self, stem: &str) -> Option<String>;

    /// Extension (without dot) of compressed artifacts.
    fn archive_extension(&self) -> &'static str;

    /// Copy the GUI runtime next to `executable` inside `cwd`.
    fn deploy_runtime(&self, executable: &str, policy: ImageFormatPolicy, cwd: &Path)
        -> Invocation;

    /// Directory (relative to the staged executable) holding image format plugins.
    fn image_formats_dir(&self) -> &'static str;

    /// Name prefix of the SVG image format plugin.
    fn svg_plugin_prefix(&self) -> &'static str;

    /// Compress `inputs` (relative to `cwd`, or absolute) into `archive`.
    fn compress(&self, archive: &Path, inputs: &[&Path], cwd: &Path) -> Invocation;
}

/// Windows: `windeployqt` + 7-Zip, MSVC-style `.pdb` symbols.
#[derive(Debug, Default, Clone, Copy)]
pub struct Windows;

impl Platform for Windows {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn executable(&self, stem: &str) -> String {
        format!("{stem}.exe")
    }

    fn debug_symbols(&self, stem: &str) -> Option<String> {
        Some(format!("{stem}.pdb"))
    }

    fn archive_extension(&self) -> &'static str {
        "7z"
    }

    fn deploy_runtime(
        &self,
        executable: &str,
        policy: ImageFormatPolicy,
        cwd: &Path,
    ) -> Invocation {
        let inv = Invocation::new("windeployqt.exe", cwd)
            .arg(executable)
            .args(["--no-compiler-runtime", "--no-angle", "--no-opengl-sw"]);

        match policy {
            ImageFormatPolicy::KeepSvg => inv,
            ImageFormatPolicy::RemoveAll => inv.arg("--no-svg"),
        }
    }

    fn image_formats_dir(&self) -> &'static str {
        "imageformats"
    }

    fn svg_plugin_prefix(&self) -> &'static str {
        "qsvg"
    }

    fn compress(&self, archive: &Path, inputs: &[&Path], cwd: &Path) -> Invocation {
        Invocation::new("7z", cwd)
            .arg("a")
            .arg(format!("-mx={COMPRESSION_LEVEL}"))
            .arg(archive.to_string_lossy())
            .args(inputs.iter().map(|p| p.to_string_lossy().into_owned()))
    }
}

/// Packaging strategy for the OS this binary was built for.
pub fn current() -> Result<Box<dyn Platform>> {
    if cfg!(windows) {
        Ok(Box::new(Windows))
    } else {
        Err(CiError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_windows_file_names() {
        assert_eq!(Windows.executable("exotracker-qt"), "exotracker-qt.exe");
        assert_eq!(
            Windows.debug_symbols("exotracker-qt").as_deref(),
            Some("exotracker-qt.pdb")
        );
    }

    #[test]
    fn test_deploy_keep_svg() {
        let inv = Windows.deploy_runtime(
            "exotracker-qt.exe",
            ImageFormatPolicy::KeepSvg,
            Path::new("stage"),
        );
        assert_eq!(inv.program, "windeployqt.exe");
        assert_eq!(
            inv.args,
            vec![
                "exotracker-qt.exe",
                "--no-compiler-runtime",
                "--no-angle",
                "--no-opengl-sw"
            ]
        );
        assert_eq!(inv.cwd, PathBuf::from("stage"));
    }

    #[test]
    fn test_deploy_remove_all_skips_svg() {
        let inv = Windows.deploy_runtime(
            "exotracker-qt.exe",
            ImageFormatPolicy::RemoveAll,
            Path::new("stage"),
        );
        assert_eq!(inv.args.last().map(String::as_str), Some("--no-svg"));
    }

    #[test]
    fn test_compress_command_line() {
        let inv = Windows.compress(
            Path::new("/out/x.7z"),
            &[Path::new(".")],
            Path::new("stage"),
        );
        assert_eq!(inv.program, "7z");
        assert_eq!(inv.args, vec!["a", "-mx=3", "/out/x.7z", "."]);
    }

    #[test]
    fn test_current_platform() {
        let result = current();
        if cfg!(windows) {
            assert_eq!(result.unwrap().name(), "windows");
        } else {
            assert!(matches!(result, Err(CiError::UnsupportedPlatform(_))));
        }
    }
}
