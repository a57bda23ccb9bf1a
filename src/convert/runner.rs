use crate::batch::{BatchReport, BatchTally, CancelToken, FileFailure, Operation, WorkerPool};
use crate::convert::converter::Converter;
use crate::error::{Result, StagehandError};
use crate::progress::ProgressEmitter;
use crate::scanner::ExtensionFilter;
use crate::staging::{StagingArea, StagingManifest};
use crate::transfer::{failure_reason, FileOperations};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

struct ConvertJob {
    input: PathBuf,
    output: PathBuf,
}

struct RestoreJob {
    /// Key in the manifest, or the converted file itself when restoring
    /// without one.
    origin: PathBuf,
    converted: PathBuf,
    staged_input: PathBuf,
    dest: PathBuf,
}

/// Converts staged files and moves the results back out of staging.
///
/// The staging directory is the source of truth here, not the search that
/// fed the gather.
pub struct ConversionRunner<'a> {
    area: &'a StagingArea,
    pool: &'a WorkerPool,
    file_ops: FileOperations,
    cancel: CancelToken,
}

impl<'a> ConversionRunner<'a> {
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

    /// Convert every staged `in_ext` file that has no `out_ext` sibling yet.
    pub fn convert(
        &self,
        converter: Option<&dyn Converter>,
        in_ext: &ExtensionFilter,
        out_ext: &ExtensionFilter,
        progress: &ProgressEmitter,
    ) -> Result<BatchReport> {
        check_distinct(in_ext, out_ext)?;

        let converter = converter.ok_or_else(|| StagehandError::ConverterUnavailable {
            message: "no converter program is configured".to_string(),
        })?;

        if !self.area.exists() {
            return Err(StagehandError::NotFound {
                path: self.area.root().to_path_buf(),
            });
        }

        let _lock = self.area.lock()?;

        let jobs: Vec<ConvertJob> = self
            .area
            .staged_files(in_ext)?
            .into_iter()
            .filter_map(|input| {
                let output = out_ext.apply_to(&input);
                if output.exists() {
                    debug!(input = %input.display(), "already converted");
                    return None;
                }
                Some(ConvertJob { input, output })
            })
            .collect();

        info!(
            files = jobs.len(),
            converter = converter.name(),
            from = %in_ext,
            to = %out_ext,
            "converting"
        );

        let mut tally = BatchTally::new(Operation::Convert);
        let operation = progress.begin(Operation::Convert, jobs.len());
        let results = self.pool.run(&jobs, &self.cancel, &operation, |job| {
            convert_one(converter, job, out_ext)
        });

        let mut cancelled = false;
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Some(Ok(())) => tally.success(),
                Some(Err(e)) => tally.failure(FileFailure::new(job.input, e.to_string())),
                None => cancelled = true,
            }
        }

        if cancelled {
            return Err(StagehandError::Cancelled {
                operation: Operation::Convert,
                completed: tally.completed(),
            });
        }

        let report = tally.finish().into_outcome()?;
        operation.finish();
        info!(converted = report.completed, failed = report.failures.len(), "convert complete");
        Ok(report)
    }

    /// Move converted files back next to their originals.
    ///
    /// Without a manifest the original locations are unknown, so converted
    /// files go to `fallback_dir` instead. Running restore again once
    /// everything is back is a no-op.
    pub fn restore(
        &self,
        in_ext: &ExtensionFilter,
        out_ext: &ExtensionFilter,
        fallback_dir: &Path,
        progress: &ProgressEmitter,
    ) -> Result<BatchReport> {
        check_distinct(in_ext, out_ext)?;

        let mut tally = BatchTally::new(Operation::Restore);

        if !self.area.exists() {
            debug!(staging = %self.area.root().display(), "nothing staged");
            progress.begin(Operation::Restore, 0).finish();
            return Ok(tally.finish());
        }

        let _lock = self.area.lock()?;
        let mut manifest = StagingManifest::load(self.area)?;

        let jobs = match &manifest {
            Some(manifest) => plan_from_manifest(manifest, in_ext, out_ext, &mut tally),
            None => self.plan_fallback(in_ext, out_ext, fallback_dir)?,
        };

        info!(files = jobs.len(), from = %in_ext, to = %out_ext, "restoring");

        let operation = progress.begin(Operation::Restore, jobs.len());
        let results = self.pool.run(&jobs, &self.cancel, &operation, |job| {
            self.restore_one(job)
        });

        let mut cancelled = false;
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Some(Ok(())) => {
                    if let Some(manifest) = manifest.as_mut() {
                        manifest.remove_original(&job.origin);
                    }
                    tally.success();
                }
                Some(Err(reason)) => tally.failure(FileFailure::new(job.origin, reason)),
                None => cancelled = true,
            }
        }

        match &manifest {
            Some(manifest) if manifest.is_empty() => StagingManifest::discard(self.area)?,
            Some(manifest) if tally.completed() > 0 => manifest.save(self.area)?,
            _ => {}
        }

        if cancelled {
            return Err(StagehandError::Cancelled {
                operation: Operation::Restore,
                completed: tally.completed(),
            });
        }

        let report = tally.finish().into_outcome()?;
        operation.finish();
        info!(restored = report.completed, failed = report.failures.len(), "restore complete");
        Ok(report)
    }

    fn plan_fallback(
        &self,
        in_ext: &ExtensionFilter,
        out_ext: &ExtensionFilter,
        fallback_dir: &Path,
    ) -> Result<Vec<RestoreJob>> {
        let converted = self.area.staged_files(out_ext)?;
        if converted.is_empty() {
            return Ok(Vec::new());
        }

        if !fallback_dir.is_dir() {
            return Err(StagehandError::NotFound {
                path: fallback_dir.to_path_buf(),
            });
        }

        warn!(
            files = converted.len(),
            dest = %fallback_dir.display(),
            "no staging manifest, original locations unknown; restoring to base directory"
        );

        Ok(converted
            .into_iter()
            .filter_map(|converted| {
                let file_name = converted.file_name()?.to_owned();
                Some(RestoreJob {
                    origin: converted.clone(),
                    staged_input: in_ext.apply_to(&converted),
                    dest: fallback_dir.join(file_name),
                    converted,
                })
            })
            .collect())
    }

    fn restore_one(&self, job: &RestoreJob) -> std::result::Result<(), String> {
        if !job.dest.parent().is_some_and(Path::is_dir) {
            return Err("original directory no longer exists".to_string());
        }

        self.file_ops
            .move_file(&job.converted, &job.dest)
            .map_err(|e| failure_reason(&e))?;

        match fs::remove_file(&job.staged_input) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %job.staged_input.display(), error = %e, "could not remove staged input");
            }
        }

        debug!(dest = %job.dest.display(), "restored");
        Ok(())
    }
}

fn check_distinct(in_ext: &ExtensionFilter, out_ext: &ExtensionFilter) -> Result<()> {
    if in_ext == out_ext {
        return Err(StagehandError::invalid_input(format!(
            "input and output extensions are both .{}",
            in_ext
        )));
    }
    Ok(())
}

fn plan_from_manifest(
    manifest: &StagingManifest,
    in_ext: &ExtensionFilter,
    out_ext: &ExtensionFilter,
    tally: &mut BatchTally,
) -> Vec<RestoreJob> {
    let mut jobs = Vec::new();

    for entry in manifest.entries() {
        if !in_ext.matches(&entry.staged) {
            continue;
        }

        let converted = out_ext.apply_to(&entry.staged);
        if !converted.is_file() {
            tally.failure(FileFailure::new(&entry.original, "not converted yet"));
            continue;
        }

        jobs.push(RestoreJob {
            origin: entry.original.clone(),
            converted,
            staged_input: entry.staged.clone(),
            dest: out_ext.apply_to(&entry.original),
        });
    }

    jobs
}

fn convert_one(converter: &dyn Converter, job: &ConvertJob, out_ext: &ExtensionFilter) -> io::Result<()> {
    let partial = partial_output(&job.input, out_ext);
    let _ = fs::remove_file(&partial);

    let result = converter.convert(&job.input, &partial).and_then(|()| {
        if !partial.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} produced no output", converter.name()),
            ));
        }
        if job.output.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "output already exists",
            ));
        }
        fs::rename(&partial, &job.output)
    });

    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

/// Hidden in-progress name that still carries the output extension, since
/// some converters pick their format from it.
fn partial_output(input: &Path, out_ext: &ExtensionFilter) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!(".{}.partial.{}", stem, out_ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::StagingGatherer;
    use tempfile::TempDir;

    /// Writes the input bytes uppercased, or fails for inputs named `bad.*`.
    struct UppercaseConverter;

    impl Converter for UppercaseConverter {
        fn name(&self) -> &str {
            "uppercase"
        }

        fn convert(&self, input: &Path, output: &Path) -> io::Result<()> {
            if input.file_stem().is_some_and(|s| s == "bad") {
                return Err(io::Error::new(io::ErrorKind::Other, "unsupported layout"));
            }
            let content = fs::read_to_string(input)?;
            fs::write(output, content.to_uppercase())
        }
    }

    struct Fixture {
        temp: TempDir,
        area: StagingArea,
        pool: WorkerPool,
        progress: ProgressEmitter,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let area = StagingArea::new(temp.path().join("to_convert"));
            Self {
                temp,
                area,
                pool: WorkerPool::new(2).unwrap(),
                progress: ProgressEmitter::new(),
            }
        }

        fn original(&self, rel: &str, content: &str) -> PathBuf {
            let path = self.temp.path().join("work").join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, content).unwrap();
            path
        }

        fn gather(&self, files: &[PathBuf]) {
            StagingGatherer::new(&self.area, &self.pool, FileOperations::new())
                .gather(files, &ext("indd"), &self.progress)
                .unwrap();
        }

        fn runner(&self) -> ConversionRunner<'_> {
            ConversionRunner::new(&self.area, &self.pool, FileOperations::new())
        }
    }

    fn ext(raw: &str) -> ExtensionFilter {
        ExtensionFilter::new(raw).unwrap()
    }

    #[test]
    fn test_convert_writes_outputs_and_skips_converted() {
        let fx = Fixture::new();
        let a = fx.original("a.indd", "alpha");
        let b = fx.original("b.indd", "beta");
        fx.gather(&[a, b]);

        let report = fx
            .runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress)
            .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(
            fs::read_to_string(fx.area.root().join("a.idml")).unwrap(),
            "ALPHA"
        );
        assert_eq!(fx.progress.latest().fraction, 1.0);

        let again = fx
            .runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress)
            .unwrap();
        assert_eq!(again.completed, 0);
    }

    #[test]
    fn test_converter_failure_does_not_abort_batch() {
        let fx = Fixture::new();
        let good = fx.original("good.indd", "ok");
        let bad = fx.original("bad.indd", "??");
        fx.gather(&[good, bad]);

        let report = fx
            .runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress)
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].reason.contains("unsupported layout"));
        assert!(!fx.area.root().join("bad.idml").exists());
        assert!(!fx.area.root().join(".bad.partial.idml").exists());
    }

    #[test]
    fn test_convert_without_converter() {
        let fx = Fixture::new();
        let result = fx
            .runner()
            .convert(None, &ext("indd"), &ext("idml"), &fx.progress);
        assert!(matches!(
            result,
            Err(StagehandError::ConverterUnavailable { .. })
        ));
    }

    #[test]
    fn test_convert_missing_staging_is_not_found() {
        let fx = Fixture::new();
        let result = fx
            .runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress);
        assert!(matches!(result, Err(StagehandError::NotFound { .. })));
    }

    #[test]
    fn test_same_extensions_rejected() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.runner()
                .restore(&ext("indd"), &ext("INDD"), fx.temp.path(), &fx.progress),
            Err(StagehandError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_restore_returns_files_next_to_originals() {
        let fx = Fixture::new();
        let a = fx.original("jobs/a.indd", "alpha");
        let b = fx.original("other/b.indd", "beta");
        fx.gather(&[a.clone(), b.clone()]);
        fx.runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress)
            .unwrap();

        let report = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress)
            .unwrap();

        assert_eq!(report.completed, 2);
        assert_eq!(fs::read_to_string(a.with_extension("idml")).unwrap(), "ALPHA");
        assert_eq!(fs::read_to_string(b.with_extension("idml")).unwrap(), "BETA");
        assert!(a.exists());
        assert!(StagingManifest::load(&fx.area).unwrap().is_none());
        assert!(fx.area.staged_files(&ext("indd")).unwrap().is_empty());
        assert!(fx.area.staged_files(&ext("idml")).unwrap().is_empty());

        let again = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress)
            .unwrap();
        assert_eq!(again.completed, 0);
        assert!(again.is_clean());
    }

    #[test]
    fn test_restore_skips_existing_destination() {
        let fx = Fixture::new();
        let a = fx.original("a.indd", "alpha");
        let b = fx.original("b.indd", "beta");
        fs::write(b.with_extension("idml"), "keep me").unwrap();
        fx.gather(&[a, b.clone()]);
        fx.runner()
            .convert(Some(&UppercaseConverter), &ext("indd"), &ext("idml"), &fx.progress)
            .unwrap();

        let report = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress)
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failures[0].path, b);
        assert_eq!(report.failures[0].reason, "destination already exists");
        assert_eq!(fs::read_to_string(b.with_extension("idml")).unwrap(), "keep me");

        let manifest = StagingManifest::load(&fx.area).unwrap().unwrap();
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_original(&b));
    }

    #[test]
    fn test_restore_without_manifest_falls_back_to_base() {
        let fx = Fixture::new();
        fx.area.ensure().unwrap();
        fs::write(fx.area.root().join("lost.idml"), "converted").unwrap();
        fs::write(fx.area.root().join("lost.indd"), "input").unwrap();

        let report = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress)
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(
            fs::read_to_string(fx.temp.path().join("lost.idml")).unwrap(),
            "converted"
        );
        assert!(!fx.area.root().join("lost.indd").exists());
    }

    #[test]
    fn test_restore_without_staging_is_noop() {
        let fx = Fixture::new();
        let report = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress)
            .unwrap();
        assert_eq!(report.completed, 0);
        assert_eq!(fx.progress.latest().fraction, 1.0);
    }

    #[test]
    fn test_unconverted_files_stay_staged() {
        let fx = Fixture::new();
        let a = fx.original("a.indd", "alpha");
        fx.gather(&[a.clone()]);

        let result = fx
            .runner()
            .restore(&ext("indd"), &ext("idml"), fx.temp.path(), &fx.progress);

        assert!(matches!(result, Err(StagehandError::PartialFailure { .. })));
        assert!(StagingManifest::load(&fx.area).unwrap().unwrap().contains_original(&a));
        assert!(fx.area.root().join("a.indd").exists());
    }

    #[test]
    fn test_partial_output_name() {
        assert_eq!(
            partial_output(Path::new("/s/cover.indd"), &ext("idml")),
            PathBuf::from("/s/.cover.partial.idml")
        );
    }
}
