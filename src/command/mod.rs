pub mod process;
pub mod template;

use crate::error::ExecError;
use serde::Serialize;
use std::time::Duration;

pub use process::ProcessRunner;
pub use template::{ArgPattern, CommandTemplate, Placeholder, Segment, Substitution};

/// Outcome of one completed command invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

impl std::fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.exit_code {
            Some(code) => write!(f, "exit={code}")?,
            None => f.write_str("exit=signal")?,
        }
        write!(f, " stderr={:?}", self.stderr.trim())
    }
}

/// Seam to the operating system's process launcher.
pub trait CommandRunner: Send + Sync {
    /// Runs `template` with `subst` bound. `timeout` overrides the template's
    /// default; `None` falls back to it.
    fn run(
        &self,
        template: &CommandTemplate,
        subst: &Substitution,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecError>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(
        &self,
        template: &CommandTemplate,
        subst: &Substitution,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, ExecError> {
        (**self).run(template, subst, timeout)
    }
}
