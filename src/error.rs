use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A command template that could not be parsed or resolved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder ${{{name}}} in argument {arg:?}")]
    UnknownPlaceholder { name: String, arg: String },

    #[error("unterminated placeholder in argument {0:?}")]
    Unterminated(String),

    #[error("no value supplied for ${{{0}}}")]
    MissingValue(&'static str),

    #[error("command executable is empty")]
    EmptyExecutable,
}

/// Failure to run an external command to completion.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exceeded timeout ({timeout:?}); stderr: {stderr}")]
    Timeout {
        program: String,
        timeout: Duration,
        stderr: String,
    },

    #[error("waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Classified failure of a single transform call.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("OCR process could not be started: {0}")]
    LaunchFailure(#[source] ExecError),

    #[error("OCR process timed out after {timeout:?}")]
    Timeout { timeout: Duration, stderr: String },

    #[error("failed to perform OCR transformation (exit code {exit_code:?}):\n{stderr}")]
    ToolReportedFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("OCR output missing: {}", path.display())]
    OutputMissing { path: PathBuf },

    #[error("transform {source_mime} -> {target_mime} is not supported")]
    Unsupported {
        source_mime: String,
        target_mime: String,
    },

    #[error("no file extension known for mimetype {0}")]
    UnknownMimetype(String),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl TransformError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TransformError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<ExecError> for TransformError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Timeout {
                timeout, stderr, ..
            } => TransformError::Timeout { timeout, stderr },
            ExecError::Template(t) => TransformError::Template(t),
            other => TransformError::LaunchFailure(other),
        }
    }
}
