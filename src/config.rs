use crate::command::CommandTemplate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub worker: Worker,
    #[serde(default)]
    pub transform: TransformCommand,
    #[serde(default)]
    pub check: CheckCommand,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Both command templates must parse; everything else has a usable default.
    pub fn validate(&self) -> Result<()> {
        self.transform_template()?;
        self.check_template()?;
        Ok(())
    }

    pub fn transform_template(&self) -> Result<CommandTemplate> {
        CommandTemplate::parse(&self.transform.exe, &self.transform.args)
            .with_context(|| "invalid [transform] command")
    }

    pub fn check_template(&self) -> Result<CommandTemplate> {
        let timeout = (self.check.timeout_ms > 0).then(|| Duration::from_millis(self.check.timeout_ms));
        Ok(CommandTemplate::parse(&self.check.exe, &self.check.args)
            .with_context(|| "invalid [check] command")?
            .with_default_timeout(timeout))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    pub check_frequency_seconds: u64,
    pub timeout_ms: u64,
}
impl Default for Worker {
    fn default() -> Self {
        Self {
            check_frequency_seconds: 120,
            timeout_ms: 60_000,
        }
    }
}
impl Worker {
    pub fn check_frequency(&self) -> Duration {
        Duration::from_secs(self.check_frequency_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformCommand {
    pub exe: String,
    pub args: Vec<String>,
}
impl Default for TransformCommand {
    fn default() -> Self {
        Self {
            exe: "tesseract".into(),
            args: vec!["${source}".into(), "${target}".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckCommand {
    pub exe: String,
    pub args: Vec<String>,
    /// 0 disables the limit.
    pub timeout_ms: u64,
}
impl Default for CheckCommand {
    fn default() -> Self {
        Self {
            exe: "tesseract".into(),
            args: vec!["--version".into()],
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Empty means the OS temp dir.
    pub temp_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}
