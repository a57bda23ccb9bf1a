pub mod batch;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod mover;
pub mod progress;
pub mod scanner;
pub mod staging;
pub mod store;
pub mod transfer;
pub mod ui;

// Public API re-exports
pub use batch::{BatchReport, CancelToken, FileFailure, Operation, WorkerPool};
pub use cli::{Cli, Command, OutputFormat};
pub use config::{CliOverrides, Config};
pub use error::{ErrorKind, Result, StagehandError, UserFriendlyError};

// Core functionality re-exports
pub use convert::{CommandConverter, ConversionRunner, Converter};
pub use mover::DirectoryMover;
pub use progress::{ProgressEmitter, ProgressEvent, ProgressListener};
pub use scanner::{DirectoryRef, ExtensionFilter, PathScanner, ScanOutput, SearchResult};
pub use staging::{StagingArea, StagingGatherer, StagingManifest};
pub use store::ManifestStore;
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use transfer::FileOperations;

/// Where `gather_files` takes its file list from.
#[derive(Debug, Clone)]
pub enum GatherSource {
    /// Search this directory first and gather the result.
    Directory(PathBuf),
    Files(Vec<PathBuf>),
    /// The search saved by the last `search_files`.
    LastSearch,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatherOutcome {
    /// Present when the gather started with a directory search.
    pub search: Option<ScanOutput>,
    pub report: BatchReport,
}

/// Main library interface: the batch commands plus their progress stream.
///
/// Every command is blocking and runs to a single outcome. Progress for the
/// running command is published on [`Stagehand::subscribe`].
pub struct Stagehand {
    config: Config,
    progress: ProgressEmitter,
    store: ManifestStore,
    staging: StagingArea,
    pool: WorkerPool,
    cancel: CancelToken,
    converter: Option<Box<dyn Converter>>,
}

impl Stagehand {
    pub fn new(mut config: Config) -> Result<Self> {
        config.validate()?;
        config.staging.make_absolute()?;

        let pool = WorkerPool::new(config.workers.threads)?;
        let store = ManifestStore::new(config.staging.scrape_path());
        let staging = StagingArea::new(config.staging.staging_dir());
        let converter = CommandConverter::from_config(&config.converter)
            .map(|c| Box::new(c) as Box<dyn Converter>);

        Ok(Self {
            config,
            progress: ProgressEmitter::new(),
            store,
            staging,
            pool,
            cancel: CancelToken::new(),
            converter,
        })
    }

    /// Create a Stagehand instance from CLI arguments
    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        Self::new(cli_args.load_config()?)
    }

    pub fn with_converter<C: Converter + 'static>(mut self, converter: C) -> Self {
        self.converter = Some(Box::new(converter));
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Search `path` for files with `extension` and save the result.
    pub fn search_files<P: AsRef<Path>>(&self, path: P, extension: &str) -> Result<ScanOutput> {
        let ext = ExtensionFilter::new(extension)?;
        let root = DirectoryRef::new(path)?;

        let output = self.scan(&root, &ext)?;
        self.store.save(&output.result)?;
        Ok(output)
    }

    /// Copy files into the staging directory.
    pub fn gather_files(&self, source: GatherSource, extension: &str) -> Result<GatherOutcome> {
        let ext = ExtensionFilter::new(extension)?;

        let (files, search) = match source {
            GatherSource::Files(files) => (files, None),
            GatherSource::Directory(dir) => {
                let output = self.search_files(dir, ext.as_str())?;
                (output.result.paths().map(Path::to_path_buf).collect(), Some(output))
            }
            GatherSource::LastSearch => {
                let saved = self.store.load()?.ok_or_else(|| {
                    StagehandError::invalid_input("no saved search; run a search first")
                })?;
                (saved.paths().map(Path::to_path_buf).collect(), None)
            }
        };

        let report = StagingGatherer::new(&self.staging, &self.pool, self.file_ops())
            .with_cancel_token(self.cancel.clone())
            .gather(&files, &ext, &self.progress)?;

        Ok(GatherOutcome { search, report })
    }

    /// Run the configured converter over the staged files.
    pub fn convert_files(&self, in_extension: &str, out_extension: &str) -> Result<BatchReport> {
        let in_ext = ExtensionFilter::new(in_extension)?;
        let out_ext = ExtensionFilter::new(out_extension)?;

        self.runner()
            .convert(self.converter.as_deref(), &in_ext, &out_ext, &self.progress)
    }

    /// Move converted files out of staging, back next to their originals.
    pub fn restore_files(&self, in_extension: &str, out_extension: &str) -> Result<BatchReport> {
        let in_ext = ExtensionFilter::new(in_extension)?;
        let out_ext = ExtensionFilter::new(out_extension)?;

        self.runner().restore(
            &in_ext,
            &out_ext,
            &self.config.staging.base_directory,
            &self.progress,
        )
    }

    /// Move the searched `extension` files under `input_dir` into
    /// `output_dir`.
    ///
    /// The file list comes from the saved search, narrowed to `input_dir`.
    /// Only when that search holds nothing under `input_dir` is the directory
    /// scanned first. Files added to `input_dir` after the saved search are
    /// therefore left alone; run `search_files` again to pick them up.
    pub fn move_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        extension: &str,
        input_dir: P,
        output_dir: Q,
    ) -> Result<BatchReport> {
        let ext = ExtensionFilter::new(extension)?;
        let input = DirectoryRef::new(input_dir)?;
        let output = DirectoryRef::new(output_dir)?;

        if input == output {
            return Err(StagehandError::invalid_input(
                "input and output directories are the same",
            ));
        }

        let listed: Vec<String> = self
            .store
            .load()?
            .map(|saved| saved.within(&input))
            .unwrap_or_default();

        let files = if listed.is_empty() {
            info!(dir = %input.path().display(), "no saved search for this directory, scanning");
            self.scan(&input, &ext)?.result.file_paths
        } else {
            listed
        };

        DirectoryMover::new(&self.pool, self.file_ops())
            .with_cancel_token(self.cancel.clone())
            .move_files(&files, &ext, &output, &self.progress)
    }

    /// Paths of the saved search, empty if there is none.
    pub fn read_scrape_file(&self) -> Result<Vec<String>> {
        self.store.read_paths()
    }

    pub fn subscribe(&self) -> ProgressListener {
        self.progress.subscribe()
    }

    pub fn progress(&self) -> &ProgressEmitter {
        &self.progress
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.root()
    }

    /// Generate sample configuration file
    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let path = output_path.as_ref();
        std::fs::write(path, Config::create_sample_config())
            .map_err(|e| StagehandError::at_path(path, e))
    }

    /// Scans report 0.0 on start and 1.0 when done; the total is unknown
    /// until the walk ends.
    fn scan(&self, root: &DirectoryRef, ext: &ExtensionFilter) -> Result<ScanOutput> {
        let operation = self.progress.begin(Operation::Scan, 0);
        let output = PathScanner::new(&self.config.scan)?
            .excluding(self.staging.root())
            .with_cancel_token(self.cancel.clone())
            .scan(root, ext)?;
        operation.finish();
        Ok(output)
    }

    fn runner(&self) -> ConversionRunner<'_> {
        ConversionRunner::new(&self.staging, &self.pool, self.file_ops())
            .with_cancel_token(self.cancel.clone())
    }

    fn file_ops(&self) -> FileOperations {
        FileOperations::new()
            .with_buffer_size(self.config.workers.buffer_size)
            .with_force_copy(self.config.workers.force_copy)
    }
}

/// Get version information
pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
