use crate::{
    config::Config,
    content::{FileReader, FileWriter},
    mimetype::{StaticMimetypes, TEXT_PLAIN},
    util::{ensure_dir, now_rfc3339},
    worker::TransformWorker,
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ocr-worker")]
#[command(about = "Image-to-text transform worker driving an external OCR tool")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./ocr-worker.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the availability check and print the result as JSON.
    Doctor {},
    /// Print whether a mimetype pair is supported.
    Transformable {
        #[arg(long)]
        source_mime: String,
        #[arg(long, default_value = TEXT_PLAIN)]
        target_mime: String,
    },
    Transform {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Defaults to the mimetype implied by the input's extension.
        #[arg(long)]
        source_mime: Option<String>,
        #[arg(long, default_value = TEXT_PLAIN)]
        target_mime: String,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    let _guard = init_logging(&args, &cfg)?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Transformable {
            source_mime,
            target_mime,
        } => {
            let worker = TransformWorker::from_config(&cfg)?;
            println!("{}", worker.is_transformable(source_mime, target_mime));
            Ok(())
        }
        Command::Transform {
            input,
            output,
            source_mime,
            target_mime,
        } => transform(&cfg, input, output, source_mime.as_deref(), target_mime),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("ocr-worker.toml");
    default.exists().then_some(default)
}

fn init_logging(args: &Args, cfg: &Config) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command results; logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = match resolve_log_path(cfg) {
        Some(path) => {
            let parent = path.parent().unwrap_or_else(|| Path::new("."));
            ensure_dir(parent)?;
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file: {}", path.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(std::env::temp_dir().join("ocr-worker.log"))
}

fn doctor(cfg: &Config) -> Result<()> {
    let worker = TransformWorker::from_config(cfg)?;
    let available = worker.monitor().refresh();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "available": available,
            "checked_at": now_rfc3339(),
            "version": worker.version_string(),
            "transform_command": worker.transform_command().to_string(),
            "check_command": worker.monitor().check_command().to_string(),
            "check_frequency_seconds": worker.monitor().ttl().as_secs(),
            "timeout_ms": worker.timeout().as_millis() as u64,
        }))?
    );
    Ok(())
}

fn transform(
    cfg: &Config,
    input: &Path,
    output: &Path,
    source_mime: Option<&str>,
    target_mime: &str,
) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }
    let source_mime = match source_mime {
        Some(m) => m.to_string(),
        None => StaticMimetypes
            .mimetype_for_path(input)
            .ok_or_else(|| {
                anyhow!(
                    "cannot infer mimetype of {}; pass --source-mime",
                    input.display()
                )
            })?
            .to_string(),
    };

    let worker = TransformWorker::from_config(cfg)?;
    if !worker.is_transformable(&source_mime, target_mime) {
        return Err(anyhow!("unsupported transform: {source_mime} -> {target_mime}"));
    }
    if !worker.is_available() {
        warn!("OCR tool reported unavailable by [{}]", worker.monitor().check_command());
        return Err(anyhow!("OCR tool is not available"));
    }

    let reader = FileReader::new(input, source_mime);
    let mut writer = FileWriter::new(output, target_mime);
    worker
        .transform(&reader, &mut writer)
        .with_context(|| format!("transforming {}", input.display()))?;

    info!("wrote {}", output.display());
    Ok(())
}
