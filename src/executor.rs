use crate::command::{CommandRunner, CommandTemplate, ExecutionResult, Substitution};
use crate::error::TransformError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error};

/// Suffix Tesseract appends to its output base name, even when the base
/// already ends in it.
pub const TOOL_OUTPUT_SUFFIX: &str = ".txt";

pub struct TransformExecutor<R: CommandRunner> {
    command: CommandTemplate,
    runner: R,
}

impl<R: CommandRunner> TransformExecutor<R> {
    pub fn new(command: CommandTemplate, runner: R) -> Self {
        Self { command, runner }
    }

    pub fn command(&self) -> &CommandTemplate {
        &self.command
    }

    /// Runs the OCR command from `source` into `target`, bounded by `timeout`.
    ///
    /// On success the text is at `target`. A missing tool output is only
    /// detected by whoever reads `target` next.
    pub fn transform(
        &self,
        source: &Path,
        target: &Path,
        timeout: Duration,
    ) -> Result<ExecutionResult, TransformError> {
        let source = absolute(source)?;
        let target = absolute(target)?;
        let subst = Substitution::files(&source, &target);
        clear_placeholder(&target)?;

        let result = self
            .runner
            .run(&self.command, &subst, Some(timeout))
            .map_err(|err| {
                error!("OCR command [{}] failed: {}", self.command, err);
                TransformError::from(err)
            })?;

        normalize_output(&target)?;

        if let Some(err) = classify(&result) {
            error!("OCR transform {} -> {} failed: {}", source.display(), target.display(), result);
            return Err(err);
        }
        debug!("transform executed: {}", result);
        Ok(result)
    }
}

fn absolute(path: &Path) -> Result<PathBuf, TransformError> {
    std::path::absolute(path)
        .map_err(|e| TransformError::io(format!("resolving {}", path.display()), e))
}

/// Temp-file providers reserve names by creating empty files. Remove an
/// empty one so that only the tool's own output can show up at `target`.
fn clear_placeholder(target: &Path) -> Result<(), TransformError> {
    match std::fs::metadata(target) {
        Ok(meta) if meta.is_file() && meta.len() == 0 => std::fs::remove_file(target)
            .map_err(|e| TransformError::io(format!("clearing {}", target.display()), e)),
        _ => Ok(()),
    }
}

/// `target` + `.txt`, appended to the full file name.
pub fn tool_output_path(target: &Path) -> PathBuf {
    let mut raw: OsString = target.as_os_str().to_owned();
    raw.push(TOOL_OUTPUT_SUFFIX);
    PathBuf::from(raw)
}

/// Moves the tool's suffixed output onto `target`. Absence is tolerated.
fn normalize_output(target: &Path) -> Result<(), TransformError> {
    let actual = tool_output_path(target);
    if !actual.exists() {
        debug!("no tool output at {}; leaving {} as is", actual.display(), target.display());
        return Ok(());
    }
    std::fs::rename(&actual, target).map_err(|e| {
        error!("moving {} onto {}: {}", actual.display(), target.display(), e);
        TransformError::OutputMissing {
            path: target.to_path_buf(),
        }
    })
}

/// A run fails only when it exits non-zero *and* wrote to stderr. Tesseract
/// exits non-zero on some warnings with nothing on stderr; those count as
/// success.
pub fn classify(result: &ExecutionResult) -> Option<TransformError> {
    if result.exit_code != Some(0) && !result.stderr.is_empty() {
        return Some(TransformError::ToolReportedFailure {
            exit_code: result.exit_code,
            stderr: result.stderr.clone(),
        });
    }
    None
}
