use crate::{
    availability::{AvailabilityMonitor, Clock, SystemClock},
    command::{CommandRunner, CommandTemplate, ProcessRunner},
    config::Config,
    content::{ContentReader, ContentWriter, TempDirProvider, TempFileProvider},
    error::TransformError,
    executor::TransformExecutor,
    mimetype::{MimetypeService, OCR_SOURCE_MIMETYPES, StaticMimetypes, TEXT_PLAIN},
};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const TEMP_PREFIX: &str = "ocr-worker";

/// The host-facing image-to-text transformer.
///
/// Safe to share across threads; each `transform` call works on its own
/// temp files and child process.
pub struct TransformWorker<R: CommandRunner, C: Clock = SystemClock> {
    executor: TransformExecutor<R>,
    monitor: AvailabilityMonitor<R, C>,
    mimetypes: Box<dyn MimetypeService>,
    temp_files: Box<dyn TempFileProvider>,
    timeout: Duration,
}

impl TransformWorker<Arc<ProcessRunner>, SystemClock> {
    /// Wires a worker from config with the real process runner and the
    /// built-in collaborators.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let runner = Arc::new(ProcessRunner::new());
        let monitor = AvailabilityMonitor::new(
            cfg.check_template()?,
            runner.clone(),
            cfg.worker.check_frequency(),
        );
        let temp_dir = (!cfg.paths.temp_dir.is_empty()).then(|| PathBuf::from(&cfg.paths.temp_dir));
        Ok(Self::new(
            TransformExecutor::new(cfg.transform_template()?, runner),
            monitor,
            Box::new(StaticMimetypes),
            Box::new(TempDirProvider::new(temp_dir)),
            cfg.worker.timeout(),
        ))
    }
}

impl<R: CommandRunner, C: Clock> TransformWorker<R, C> {
    pub fn new(
        executor: TransformExecutor<R>,
        monitor: AvailabilityMonitor<R, C>,
        mimetypes: Box<dyn MimetypeService>,
        temp_files: Box<dyn TempFileProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            monitor,
            mimetypes,
            temp_files,
            timeout,
        }
    }

    /// Static compatibility table; says nothing about whether the tool works.
    pub fn is_transformable(&self, source_mimetype: &str, target_mimetype: &str) -> bool {
        target_mimetype == TEXT_PLAIN && OCR_SOURCE_MIMETYPES.contains(&source_mimetype)
    }

    pub fn is_available(&self) -> bool {
        self.monitor.is_available()
    }

    pub fn monitor(&self) -> &AvailabilityMonitor<R, C> {
        &self.monitor
    }

    pub fn transform_command(&self) -> &CommandTemplate {
        self.executor.command()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn version_string(&self) -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            self.executor.command().exe().display()
        )
    }

    /// Stages `reader` into a temp file, OCRs it, and hands the text to
    /// `writer`. Errors are logged here and returned unchanged.
    pub fn transform(
        &self,
        reader: &dyn ContentReader,
        writer: &mut dyn ContentWriter,
    ) -> Result<(), TransformError> {
        let described = reader.describe();
        self.transform_inner(reader, writer).map_err(|err| {
            error!("exception during transform of {}: {}", described, err);
            err
        })
    }

    fn transform_inner(
        &self,
        reader: &dyn ContentReader,
        writer: &mut dyn ContentWriter,
    ) -> Result<(), TransformError> {
        debug!("beginning transform for {}", reader.describe());
        let source_mimetype = reader.mimetype().to_string();
        let target_mimetype = writer.mimetype().to_string();
        if !self.is_transformable(&source_mimetype, &target_mimetype) {
            return Err(TransformError::Unsupported {
                source_mime: source_mimetype,
                target_mime: target_mimetype,
            });
        }

        let source_ext = self.extension(&source_mimetype)?;
        let target_ext = self.extension(&target_mimetype)?;
        let source_file = self.temp_file("source", &source_ext)?;
        let target_file = self.temp_file("target", &target_ext)?;
        debug!("temp files created");

        reader
            .get_content(&source_file)
            .map_err(|e| TransformError::io(format!("staging {}", reader.describe()), e))?;
        debug!("source file written: {}", source_file.display());

        self.executor.transform(&source_file, &target_file, self.timeout)?;

        put_output(writer, &target_file)?;
        info!("transform complete: {}", reader.describe());
        Ok(())
    }

    fn extension(&self, mimetype: &str) -> Result<String, TransformError> {
        self.mimetypes
            .extension(mimetype)
            .ok_or_else(|| TransformError::UnknownMimetype(mimetype.to_string()))
    }

    fn temp_file(&self, role: &str, ext: &str) -> Result<PathBuf, TransformError> {
        let prefix = format!("{TEMP_PREFIX}_{role}_");
        self.temp_files
            .create_temp_file(&prefix, &format!(".{ext}"))
            .map_err(|e| TransformError::io("allocating temp file", e))
    }
}

/// Hands the produced file to the sink. A tool that wrote nothing where we
/// expected surfaces here as `OutputMissing`.
fn put_output(writer: &mut dyn ContentWriter, target: &Path) -> Result<(), TransformError> {
    let missing = || TransformError::OutputMissing {
        path: target.to_path_buf(),
    };
    if !target.exists() {
        return Err(missing());
    }
    writer.put_content(target).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            missing()
        } else {
            TransformError::io(format!("writing result from {}", target.display()), e)
        }
    })
}
