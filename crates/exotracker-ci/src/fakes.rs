//! In-memory fakes for the process seam (testing only)
//!
//! `RecordingRunner` remembers every invocation instead of spawning it, and
//! can optionally run a hook to simulate the side effects a real tool would
//! have on disk.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CiError, Result};
use crate::process::{Invocation, ProcessRunner};

type Hook = Box<dyn Fn(&Invocation) -> Result<()> + Send + Sync>;

/// Process runner that records invocations and never spawns anything.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    hooks: HashMap<String, Hook>,
    failures: HashMap<String, i32>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` whenever `program` is invoked.
    pub fn on(
        mut self,
        program: &str,
        hook: impl Fn(&Invocation) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.insert(program.to_string(), Box::new(hook));
        self
    }

    /// Make `program` exit with `code`.
    pub fn failing(mut self, program: &str, code: i32) -> Self {
        self.failures.insert(program.to_string(), code);
        self
    }

    /// Snapshot of everything run so far, in order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    /// Program names run so far, in order.
    pub fn programs(&self) -> Vec<String> {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.program.clone())
            .collect()
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<()> {
        self.invocations.lock().unwrap().push(invocation.clone());

        if let Some(&code) = self.failures.get(&invocation.program) {
            return Err(CiError::CommandFailed {
                program: invocation.program.clone(),
                code: Some(code),
            });
        }

        if let Some(hook) = self.hooks.get(&invocation.program) {
            hook(invocation)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let runner = RecordingRunner::new();
        runner.run(&Invocation::new("cmake", ".")).await.unwrap();
        runner.run(&Invocation::new("ninja", ".")).await.unwrap();
        assert_eq!(runner.programs(), vec!["cmake", "ninja"]);
    }

    #[tokio::test]
    async fn test_failing_program() {
        let runner = RecordingRunner::new().failing("ninja", 2);
        let err = runner.run(&Invocation::new("ninja", ".")).await.unwrap_err();
        assert!(matches!(err, CiError::CommandFailed { code: Some(2), .. }));
        assert_eq!(runner.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_hook_runs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().on("7z", |inv| {
            std::fs::write(inv.cwd.join("out.7z"), b"7z").unwrap();
            Ok(())
        });
        runner.run(&Invocation::new("7z", dir.path())).await.unwrap();
        assert!(dir.path().join("out.7z").exists());
    }
}
