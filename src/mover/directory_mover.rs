use crate::batch::{BatchReport, BatchTally, CancelToken, FileFailure, Operation, WorkerPool};
use crate::error::{Result, StagehandError};
use crate::progress::ProgressEmitter;
use crate::scanner::{DirectoryRef, ExtensionFilter};
use crate::transfer::{failure_reason, FileOperations};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

struct MoveJob {
    source: PathBuf,
    dest: PathBuf,
}

/// Relocates files into one directory without staging them. Existing files
/// in the destination are never overwritten.
pub struct DirectoryMover<'a> {
    pool: &'a WorkerPool,
    file_ops: FileOperations,
    cancel: CancelToken,
}

impl<'a> DirectoryMover<'a> {
    pub fn new(pool: &'a WorkerPool, file_ops: FileOperations) -> Self {
        Self {
            pool,
            file_ops,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Move the files in `files` whose extension is `ext` into `out_dir`.
    ///
    /// A non-empty list where nothing matches `ext` is rejected, since the
    /// extension is supposed to agree with the search that produced the list.
    pub fn move_files<P: AsRef<Path>>(
        &self,
        files: &[P],
        ext: &ExtensionFilter,
        out_dir: &DirectoryRef,
        progress: &ProgressEmitter,
    ) -> Result<BatchReport> {
        out_dir.revalidate()?;

        let candidates: Vec<&Path> = files
            .iter()
            .map(AsRef::as_ref)
            .filter(|p| ext.matches(p))
            .collect();

        if !files.is_empty() && candidates.is_empty() {
            return Err(StagehandError::invalid_input(format!(
                "none of the {} selected files has extension .{}",
                files.len(),
                ext
            )));
        }

        let mut tally = BatchTally::new(Operation::Move);
        let jobs = plan(&candidates, out_dir, &mut tally);
        info!(files = jobs.len(), dest = %out_dir.path().display(), "moving");

        let operation = progress.begin(Operation::Move, jobs.len());
        let results = self.pool.run(&jobs, &self.cancel, &operation, |job| {
            self.file_ops.move_file(&job.source, &job.dest)
        });

        let mut cancelled = false;
        for (job, result) in jobs.into_iter().zip(results) {
            match result {
                Some(Ok(())) => {
                    debug!(source = %job.source.display(), dest = %job.dest.display(), "moved");
                    tally.success();
                }
                Some(Err(e)) => tally.failure(FileFailure::new(job.source, failure_reason(&e))),
                None => cancelled = true,
            }
        }

        if cancelled {
            return Err(StagehandError::Cancelled {
                operation: Operation::Move,
                completed: tally.completed(),
            });
        }

        let report = tally.finish().into_outcome()?;
        operation.finish();
        info!(moved = report.completed, failed = report.failures.len(), "move complete");
        Ok(report)
    }
}

/// First file with a given name wins; later ones would overwrite it.
fn plan(candidates: &[&Path], out_dir: &DirectoryRef, tally: &mut BatchTally) -> Vec<MoveJob> {
    let mut seen_sources: HashSet<&Path> = HashSet::new();
    let mut claimed_names: HashSet<String> = HashSet::new();
    let mut jobs = Vec::new();

    for &source in candidates {
        if !seen_sources.insert(source) {
            continue;
        }

        if source.parent() == Some(out_dir.path()) {
            debug!(path = %source.display(), "already in destination directory");
            continue;
        }

        let Some(file_name) = source.file_name() else {
            tally.failure(FileFailure::new(source, "not a file path"));
            continue;
        };

        if !claimed_names.insert(file_name.to_string_lossy().to_lowercase()) {
            tally.failure(FileFailure::new(source, "destination already exists"));
            continue;
        }

        jobs.push(MoveJob {
            source: source.to_path_buf(),
            dest: out_dir.path().join(file_name),
        });
    }

    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, DirectoryRef) {
        let temp = TempDir::new().unwrap();
        let src = fs::canonicalize(temp.path()).unwrap().join("src");
        let out = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&out).unwrap();
        let out = DirectoryRef::new(&out).unwrap();
        (temp, src, out)
    }

    fn file(path: PathBuf, content: &str) -> PathBuf {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn indd() -> ExtensionFilter {
        ExtensionFilter::new("indd").unwrap()
    }

    #[test]
    fn test_moves_matching_files() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(2).unwrap();
        let progress = ProgressEmitter::new();
        let a = file(src.join("a.indd"), "a");
        let b = file(src.join("nested/b.indd"), "b");
        let notes = file(src.join("notes.txt"), "n");

        let report = DirectoryMover::new(&pool, FileOperations::new())
            .move_files(&[a.clone(), b.clone(), notes.clone()], &indd(), &out, &progress)
            .unwrap();

        assert_eq!(report.completed, 2);
        assert!(!a.exists() && !b.exists());
        assert!(notes.exists());
        assert_eq!(fs::read_to_string(out.path().join("b.indd")).unwrap(), "b");
        assert_eq!(progress.latest().fraction, 1.0);
    }

    #[test]
    fn test_never_overwrites() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(2).unwrap();
        let a = file(src.join("a.indd"), "new");
        let b = file(src.join("b.indd"), "b");
        fs::write(out.path().join("a.indd"), "old").unwrap();

        let report = DirectoryMover::new(&pool, FileOperations::new())
            .move_files(&[a.clone(), b], &indd(), &out, &ProgressEmitter::new())
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failures[0].path, a);
        assert_eq!(report.failures[0].reason, "destination already exists");
        assert!(a.exists());
        assert_eq!(fs::read_to_string(out.path().join("a.indd")).unwrap(), "old");
    }

    #[test]
    fn test_same_basename_first_wins() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(1).unwrap();
        let first = file(src.join("x/cover.indd"), "1");
        let second = file(src.join("y/cover.indd"), "2");

        let report = DirectoryMover::new(&pool, FileOperations::new())
            .move_files(&[first, second.clone()], &indd(), &out, &ProgressEmitter::new())
            .unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failures[0].path, second);
        assert!(second.exists());
        assert_eq!(fs::read_to_string(out.path().join("cover.indd")).unwrap(), "1");
    }

    #[test]
    fn test_no_matching_extension_is_invalid_input() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(1).unwrap();
        let notes = file(src.join("notes.txt"), "n");

        let result = DirectoryMover::new(&pool, FileOperations::new()).move_files(
            &[notes],
            &indd(),
            &out,
            &ProgressEmitter::new(),
        );

        assert!(matches!(result, Err(StagehandError::InvalidInput { .. })));
    }

    #[test]
    fn test_empty_list_moves_nothing() {
        let (_temp, _src, out) = setup();
        let pool = WorkerPool::new(1).unwrap();
        let none: [PathBuf; 0] = [];

        let report = DirectoryMover::new(&pool, FileOperations::new())
            .move_files(&none, &indd(), &out, &ProgressEmitter::new())
            .unwrap();

        assert_eq!(report.completed, 0);
    }

    #[test]
    fn test_vanished_destination_is_not_found() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(1).unwrap();
        let a = file(src.join("a.indd"), "a");
        fs::remove_dir(out.path()).unwrap();

        let result = DirectoryMover::new(&pool, FileOperations::new()).move_files(
            &[a.clone()],
            &indd(),
            &out,
            &ProgressEmitter::new(),
        );

        assert!(matches!(result, Err(StagehandError::NotFound { .. })));
        assert!(a.exists());
    }

    #[test]
    fn test_copy_fallback_moves_every_file_exactly_once() {
        let (_temp, src, out) = setup();
        let pool = WorkerPool::new(3).unwrap();
        let files: Vec<PathBuf> = (0..6)
            .map(|i| file(src.join(format!("f{}.indd", i)), "x"))
            .collect();

        let report = DirectoryMover::new(&pool, FileOperations::new().with_force_copy(true))
            .move_files(&files, &indd(), &out, &ProgressEmitter::new())
            .unwrap();

        assert_eq!(report.completed, 6);
        for source in &files {
            assert!(!source.exists());
            assert!(out.path().join(source.file_name().unwrap()).exists());
        }
    }
}
