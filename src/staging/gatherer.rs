use crate::batch::{BatchReport, BatchTally, CancelToken, FileFailure, Operation, WorkerPool};
use crate::error::{Result, StagehandError};
use crate::progress::ProgressEmitter;
use crate::scanner::ExtensionFilter;
use crate::staging::area::StagingArea;
use crate::staging::manifest::StagingManifest;
use crate::transfer::{failure_reason, FileOperations, NameAllocator};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

struct CopyJob {
    source: PathBuf,
    dest: PathBuf,
}

/// Copies selected files into the staging directory and records where each
/// one went.
pub struct StagingGatherer<'a> {
    area: &'a StagingArea,
    pool: &'a WorkerPool,
    file_ops: FileOperations,
    cancel: CancelToken,
}

impl<'a> StagingGatherer<'a> {
    pub fn new(area: &'a StagingArea, pool: &'a WorkerPool, file_ops: FileOperations) -> Self {
        Self {
            area,
            pool,
            file_ops,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy `files` into staging.
    ///
    /// Files that cannot be staged are reported in the batch and do not stop
    /// the others. On cancellation the manifest still records everything that
    /// was copied before the stop.
    pub fn gather(
        &self,
        files: &[PathBuf],
        ext: &ExtensionFilter,
        progress: &ProgressEmitter,
    ) -> Result<BatchReport> {
        let mut tally = BatchTally::new(Operation::Gather);

        if files.is_empty() {
            progress.begin(Operation::Gather, 0).finish();
            return Ok(tally.finish());
        }

        self.area.ensure()?;
        let _lock = self.area.lock()?;

        let mut manifest = StagingManifest::load(self.area)?.unwrap_or_default();
        let mut names = NameAllocator::from_directory(self.area.root())
            .map_err(|e| StagehandError::at_path(self.area.root(), e))?;

        let jobs = self.plan(files, ext, &manifest, &mut names, &mut tally);
        info!(
            files = jobs.len(),
            staging = %self.area.root().display(),
            "gathering"
        );

        let operation = progress.begin(Operation::Gather, jobs.len());
        let results = self.pool.run(&jobs, &self.cancel, &operation, |job| {
            self.file_ops.copy_durable(&job.source, &job.dest)
        });

        let mut cancelled = false;
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Some(Ok(bytes)) => {
                    debug!(source = %job.source.display(), dest = %job.dest.display(), bytes, "staged");
                    manifest.insert(job.source, job.dest);
                    tally.success();
                }
                Some(Err(e)) => tally.failure(FileFailure::new(job.source, failure_reason(&e))),
                None => cancelled = true,
            }
        }

        if tally.completed() > 0 {
            manifest.save(self.area)?;
        }

        if cancelled {
            return Err(StagehandError::Cancelled {
                operation: Operation::Gather,
                completed: tally.completed(),
            });
        }

        let report = tally.finish().into_outcome()?;
        operation.finish();
        info!(
            staged = report.completed,
            failed = report.failures.len(),
            "gather complete"
        );
        Ok(report)
    }

    /// Decide a staging name for every eligible file, in input order.
    fn plan(
        &self,
        files: &[PathBuf],
        ext: &ExtensionFilter,
        manifest: &StagingManifest,
        names: &mut NameAllocator,
        tally: &mut BatchTally,
    ) -> Vec<CopyJob> {
        let mut seen: HashSet<&Path> = HashSet::new();
        let mut jobs = Vec::new();

        for source in files {
            if !seen.insert(source.as_path()) {
                debug!(path = %source.display(), "duplicate input ignored");
                continue;
            }

            if !source.is_absolute() {
                tally.failure(FileFailure::new(source, "not an absolute path"));
                continue;
            }

            if self.area.contains(source) {
                tally.failure(FileFailure::new(source, "already in staging"));
                continue;
            }

            if !ext.matches(source) {
                tally.failure(FileFailure::new(
                    source,
                    format!("extension is not .{}", ext),
                ));
                continue;
            }

            if manifest.contains_original(source) {
                tally.failure(FileFailure::new(source, "already staged"));
                continue;
            }

            let Some(file_name) = source.file_name().and_then(|n| n.to_str()) else {
                tally.failure(FileFailure::new(source, "file name is not valid UTF-8"));
                continue;
            };

            let staged_name = names.claim(file_name);
            jobs.push(CopyJob {
                source: source.clone(),
                dest: self.area.root().join(staged_name),
            });
        }

        jobs
    }
}
