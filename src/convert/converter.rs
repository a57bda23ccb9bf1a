use crate::config::ConverterConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Turns one input file into one output file.
///
/// Implementations must write only to `output`; the runner takes care of
/// making the result visible atomically.
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    fn convert(&self, input: &Path, output: &Path) -> io::Result<()>;
}

/// Runs an external program once per file.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: PathBuf,
    args: Vec<String>,
    name: String,
}

impl CommandConverter {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        let program = program.into();
        let name = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.to_string_lossy().into_owned());
        Self {
            program,
            args,
            name,
        }
    }

    /// `None` when no program is configured.
    pub fn from_config(config: &ConverterConfig) -> Option<Self> {
        config
            .program
            .as_ref()
            .map(|program| Self::new(program.clone(), config.args.clone()))
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert(&self, input: &Path, output: &Path) -> io::Result<()> {
        let args = self.build_args(input, output);
        debug!(program = %self.program.display(), ?args, "running converter");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;

        if result.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&result.stderr);
        let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
        let message = match last_line {
            Some(line) => format!("{} failed ({}): {}", self.name, result.status, line.trim()),
            None => format!("{} failed ({})", self.name, result.status),
        };

        Err(io::Error::new(io::ErrorKind::Other, message))
    }
}
