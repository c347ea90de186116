use crate::error::TemplateError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

/// The closed set of values a command template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    Source,
    Target,
}

impl Placeholder {
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::Source => "source",
            Placeholder::Target => "target",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "source" => Some(Placeholder::Source),
            "target" => Some(Placeholder::Target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Var(Placeholder),
}

/// One argv entry, e.g. `${target}` or `--out=${target}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPattern {
    segments: Vec<Segment>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder regex"))
}

impl ArgPattern {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder_re().captures_iter(raw) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if whole.start() > last {
                segments.push(Segment::Literal(raw[last..whole.start()].to_string()));
            }
            let var = Placeholder::parse(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                name: name.to_string(),
                arg: raw.to_string(),
            })?;
            segments.push(Segment::Var(var));
            last = whole.end();
        }
        let tail = &raw[last..];
        if tail.contains("${") {
            return Err(TemplateError::Unterminated(raw.to_string()));
        }
        if !tail.is_empty() || segments.is_empty() {
            segments.push(Segment::Literal(tail.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    fn resolve(&self, subst: &Substitution) -> Result<OsString, TemplateError> {
        let mut out = OsString::new();
        for seg in &self.segments {
            match seg {
                Segment::Literal(s) => out.push(s),
                Segment::Var(p) => out.push(subst.get(*p)?),
            }
        }
        Ok(out)
    }
}

/// Values bound to the placeholders for a single invocation.
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    pub source: Option<PathBuf>,
    pub target: Option<PathBuf>,
}

impl Substitution {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn files(source: &Path, target: &Path) -> Self {
        Self {
            source: Some(source.to_path_buf()),
            target: Some(target.to_path_buf()),
        }
    }

    fn get(&self, p: Placeholder) -> Result<&Path, TemplateError> {
        let value = match p {
            Placeholder::Source => self.source.as_deref(),
            Placeholder::Target => self.target.as_deref(),
        };
        value.ok_or(TemplateError::MissingValue(p.name()))
    }
}

/// An executable plus argument patterns. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    exe: PathBuf,
    args: Vec<ArgPattern>,
    default_timeout: Option<Duration>,
}

impl CommandTemplate {
    pub fn parse<S: AsRef<str>>(exe: &str, args: &[S]) -> Result<Self, TemplateError> {
        let exe = exe.trim();
        if exe.is_empty() {
            return Err(TemplateError::EmptyExecutable);
        }
        let args = args
            .iter()
            .map(|a| ArgPattern::parse(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            exe: PathBuf::from(exe),
            args,
            default_timeout: None,
        })
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn exe(&self) -> &Path {
        &self.exe
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn program(&self) -> String {
        self.exe.display().to_string()
    }

    pub fn uses(&self, p: Placeholder) -> bool {
        self.args
            .iter()
            .flat_map(|a| a.segments())
            .any(|s| *s == Segment::Var(p))
    }

    /// Resolves every argument against `subst`, one argv entry per pattern.
    pub fn resolve_args(&self, subst: &Substitution) -> Result<Vec<OsString>, TemplateError> {
        self.args.iter().map(|a| a.resolve(subst)).collect()
    }
}

impl std::fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.exe.display())?;
        for arg in &self.args {
            f.write_str(" ")?;
            for seg in arg.segments() {
                match seg {
                    Segment::Literal(s) => f.write_str(s)?,
                    Segment::Var(p) => write!(f, "${{{}}}", p.name())?,
                }
            }
        }
        Ok(())
    }
}
