use crate::config::{CliOverrides, Config};
use crate::error::Result;
use crate::ui::OutputMode;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stagehand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find, stage, convert and move batches of files")]
#[command(
    long_about = "Stagehand finds files of one extension under a directory tree, copies them \
                  into a staging directory for conversion, and puts the converted files back \
                  next to the originals. It can also move a searched set of files between \
                  directories."
)]
#[command(after_help = "EXAMPLES:\n  \
    stagehand search ~/Work/clients --ext indd\n  \
    stagehand gather --ext indd\n  \
    stagehand convert --from indd --to idml\n  \
    stagehand restore --from indd --to idml\n  \
    stagehand move --ext pdf --from-dir ~/Work/out --to-dir /Volumes/Archive/pdf")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file path
    #[arg(short, long, global = true, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Directory holding the staging directory and the saved search
    #[arg(long, global = true, env = "STAGEHAND_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Worker threads for per-file operations
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Follow symbolic links while scanning
    #[arg(long, global = true)]
    pub follow_symlinks: bool,

    /// Converter program, overriding the configuration
    #[arg(long, global = true)]
    pub converter: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find files with an extension under a directory and save the result
    Search {
        /// Directory to search
        dir: PathBuf,

        #[arg(short, long)]
        ext: String,
    },

    /// Copy files into the staging directory
    #[command(after_help = "Without --dir or FILE arguments the last saved search is gathered.")]
    Gather {
        #[arg(short, long, default_value = "indd")]
        ext: String,

        /// Search this directory first, then gather what it finds
        #[arg(long, conflicts_with = "files")]
        dir: Option<PathBuf>,

        /// Explicit files to gather
        files: Vec<PathBuf>,
    },

    /// Convert staged files with the configured converter
    Convert(ExtensionPair),

    /// Move converted files back next to their originals
    Restore(ExtensionPair),

    /// Move searched files from one directory into another
    Move {
        #[arg(short, long)]
        ext: String,

        #[arg(long)]
        from_dir: PathBuf,

        #[arg(long)]
        to_dir: PathBuf,
    },

    /// Print the saved search
    Scrape,

    /// Write a configuration file with the default settings
    InitConfig {
        #[arg(default_value = "stagehand.toml")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ExtensionPair {
    /// Extension of the staged inputs
    #[arg(long, default_value = "indd")]
    pub from: String,

    /// Extension of the converted outputs
    #[arg(long, default_value = "idml")]
    pub to: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// One JSON object per line
    Json,
    /// Plain text output
    Plain,
}

impl From<OutputFormat> for OutputMode {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.staging.make_absolute()?;
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_base_dir(self.base_dir.clone())
            .with_threads(self.threads)
            .with_follow_symlinks(self.follow_symlinks.then_some(true))
            .with_converter(self.converter.clone())
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_format.into()
    }

    /// Progress bars only make sense for a human at a terminal.
    pub fn shows_progress(&self) -> bool {
        matches!(self.output_format, OutputFormat::Human)
            && !self.quiet
            && console::Term::stderr().is_term()
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
