//! Scoped working directory.
//!
//! The pipeline tracks its own notion of the current directory instead of
//! calling `std::env::set_current_dir`. Relative paths and child processes
//! are resolved against it. [`Workspace::push_dir`] returns a guard that puts
//! the previous directory back when dropped, so early returns through `?`
//! leave the workspace where they found it.

use crate::error::{CiError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Project root plus the current logical directory.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    cwd: Mutex<PathBuf>,
}

impl Workspace {
    /// Create a workspace rooted at `root`, which becomes the current directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let root = std::path::absolute(&root).map_err(CiError::io("resolve", &root))?;
        Ok(Self {
            cwd: Mutex::new(root.clone()),
            root,
        })
    }

    /// Workspace rooted at the process working directory.
    pub fn from_current_dir() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(CiError::io("read", "current directory"))?;
        Self::new(cwd)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current logical directory.
    pub fn cwd(&self) -> PathBuf {
        self.lock().clone()
    }

    /// Resolve `path` against the current directory.
    pub fn path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.lock().join(path)
    }

    /// Enter `dir` (relative to the current directory) until the guard drops.
    ///
    /// A missing directory is a not-found [`CiError::Io`]; nothing is
    /// created here.
    pub fn push_dir(&self, dir: impl AsRef<Path>) -> Result<PushDir<'_>> {
        let target = self.path(dir);
        if !target.is_dir() {
            return Err(CiError::Io {
                action: "enter",
                path: target,
                source: std::io::ErrorKind::NotFound.into(),
            });
        }

        let previous = std::mem::replace(&mut *self.lock(), target.clone());
        debug!(dir = %target.display(), "pushd");
        Ok(PushDir {
            workspace: self,
            previous: Some(previous),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PathBuf> {
        self.cwd.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Restores the previous directory of a [`Workspace`] on drop.
#[must_use = "the directory is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PushDir<'a> {
    workspace: &'a Workspace,
    previous: Option<PathBuf>,
}

impl Drop for PushDir<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            debug!(dir = %previous.display(), "popd");
            *self.workspace.lock() = previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_push_dir_restores_on_drop() {
        let root = tempdir().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        let ws = Workspace::new(root.path()).unwrap();

        {
            let _guard = ws.push_dir("sub").unwrap();
            assert_eq!(ws.cwd(), ws.root().join("sub"));
            assert_eq!(ws.path("file"), ws.root().join("sub").join("file"));
        }

        assert_eq!(ws.cwd(), ws.root());
    }

    #[test]
    fn test_push_dir_restores_on_error_path() {
        let root = tempdir().unwrap();
        std::fs::create_dir(root.path().join("sub")).unwrap();
        let ws = Workspace::new(root.path()).unwrap();

        let failing = || -> Result<()> {
            let _guard = ws.push_dir("sub")?;
            Err(CiError::MissingEnv("CC".to_string()))
        };
        assert!(failing().is_err());
        assert_eq!(ws.cwd(), ws.root());
    }

    #[test]
    fn test_nested_push_dir() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("a/b")).unwrap();
        let ws = Workspace::new(root.path()).unwrap();

        let outer = ws.push_dir("a").unwrap();
        {
            let _inner = ws.push_dir("b").unwrap();
            assert_eq!(ws.cwd(), ws.root().join("a").join("b"));
        }
        assert_eq!(ws.cwd(), ws.root().join("a"));
        drop(outer);
        assert_eq!(ws.cwd(), ws.root());
    }

    #[test]
    fn test_push_missing_dir_fails_without_creating() {
        let root = tempdir().unwrap();
        let ws = Workspace::new(root.path()).unwrap();

        let err = ws.push_dir("missing").unwrap_err();
        assert!(matches!(err, CiError::Io { action: "enter", .. }));
        assert!(!root.path().join("missing").exists());
        assert_eq!(ws.cwd(), ws.root());
    }
}
