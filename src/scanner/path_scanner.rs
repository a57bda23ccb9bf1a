use crate::batch::{CancelToken, FileFailure, Operation};
use crate::config::ScanConfig;
use crate::error::{Result, StagehandError};
use crate::scanner::directory::DirectoryRef;
use crate::scanner::file_filter::{ExtensionFilter, FileFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Files found by one scan, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_paths: Vec<String>,
    pub total_size: u64,
}

impl SearchResult {
    pub fn new(file_paths: Vec<String>, total_size: u64) -> Self {
        Self {
            file_paths,
            total_size,
        }
    }

    pub fn len(&self) -> usize {
        self.file_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.file_paths.iter().map(Path::new)
    }

    /// The files that live under `dir`.
    pub fn within(&self, dir: &DirectoryRef) -> Vec<String> {
        self.file_paths
            .iter()
            .filter(|p| dir.contains(Path::new(p.as_str())))
            .cloned()
            .collect()
    }

    pub fn format_total_size(&self) -> String {
        format_bytes(self.total_size)
    }
}

/// A search result plus the subtrees and files the scan had to skip.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanOutput {
    pub result: SearchResult,
    pub skipped: Vec<FileFailure>,
}

pub struct PathScanner {
    filter: FileFilter,
    max_depth: usize,
    follow_symlinks: bool,
    excluded: Vec<PathBuf>,
    cancel: Option<CancelToken>,
}

impl PathScanner {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        Ok(Self {
            filter: FileFilter::new(config)?,
            max_depth: config.max_depth,
            follow_symlinks: config.follow_symlinks,
            excluded: Vec::new(),
            cancel: None,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Never walk into `dir`. Used to keep the staging directory out of
    /// searches that cover it.
    pub fn excluding<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        if let Ok(canonical) = std::fs::canonicalize(dir) {
            self.excluded.push(canonical);
        }
        self.excluded.push(dir.to_path_buf());
        self
    }

    /// Walk `root` depth-first, siblings in file-name order, collecting every
    /// regular file whose extension matches `ext`.
    ///
    /// Unreadable subtrees and files that disappear mid-scan do not fail the
    /// scan; only an unreadable root does.
    pub fn scan(&self, root: &DirectoryRef, ext: &ExtensionFilter) -> Result<ScanOutput> {
        root.revalidate()?;
        info!(root = %root.path().display(), ext = %ext, "scanning");

        let mut output = ScanOutput::default();
        let mut seen: HashSet<PathBuf> = HashSet::new();

        let walker = WalkDir::new(root.path())
            .max_depth(self.max_depth)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_traverse(e));

        for entry in walker {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                return Err(StagehandError::Cancelled {
                    operation: Operation::Scan,
                    completed: output.result.len(),
                });
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.record_walk_error(err, root, &mut output)?;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                let truncated = entry.depth() > 0 && entry.depth() == self.max_depth;
                if truncated && has_entries(entry.path()) {
                    warn!(path = %entry.path().display(), "maximum depth reached, subtree skipped");
                    output
                        .skipped
                        .push(FileFailure::new(entry.path(), "maximum depth reached"));
                }
                continue;
            }

            if !entry.file_type().is_file() || !ext.matches(entry.path()) {
                continue;
            }

            match self.process_file(&entry, &mut seen) {
                Ok(Some((path, size))) => {
                    output.result.file_paths.push(path);
                    output.result.total_size += size;
                }
                Ok(None) => {}
                Err(failure) => output.skipped.push(failure),
            }
        }

        info!(
            files = output.result.len(),
            total_size = output.result.total_size,
            skipped = output.skipped.len(),
            "scan complete"
        );

        Ok(output)
    }

    fn should_traverse(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 || !entry.file_type().is_dir() {
            return true;
        }
        if self.excluded.iter().any(|dir| entry.path() == dir) {
            debug!(path = %entry.path().display(), "excluded directory not walked");
            return false;
        }
        self.filter.should_traverse_directory(entry.path())
    }

    fn record_walk_error(
        &self,
        err: walkdir::Error,
        root: &DirectoryRef,
        output: &mut ScanOutput,
    ) -> Result<()> {
        let path = err
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.path().to_path_buf());

        if err.depth() == 0 {
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::new(ErrorKind::Other, "cannot read root"));
            return Err(StagehandError::at_path(path, source));
        }

        if let Some(ancestor) = err.loop_ancestor() {
            warn!(path = %path.display(), ancestor = %ancestor.display(), "symlink cycle skipped");
            output
                .skipped
                .push(FileFailure::new(path, "symbolic link cycle"));
            return Ok(());
        }

        match err.io_error().map(|e| e.kind()) {
            Some(ErrorKind::NotFound) => {
                debug!(path = %path.display(), "entry vanished during scan");
            }
            Some(ErrorKind::PermissionDenied) => {
                warn!(path = %path.display(), "permission denied, subtree skipped");
                output
                    .skipped
                    .push(FileFailure::new(path, "permission denied"));
            }
            _ => {
                warn!(path = %path.display(), error = %err, "scan error");
                output.skipped.push(FileFailure::new(path, err.to_string()));
            }
        }

        Ok(())
    }

    fn process_file(
        &self,
        entry: &DirEntry,
        seen: &mut HashSet<PathBuf>,
    ) -> std::result::Result<Option<(String, u64)>, FileFailure> {
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                if err.io_error().is_some_and(|e| e.kind() == ErrorKind::NotFound) {
                    debug!(path = %path.display(), "file vanished during scan");
                    return Ok(None);
                }
                return Err(FileFailure::new(path, err.to_string()));
            }
        };

        // Following links can reach one file through several paths.
        if self.follow_symlinks {
            let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
            if !seen.insert(canonical) {
                return Ok(None);
            }
        }

        let path_string = path
            .to_str()
            .ok_or_else(|| FileFailure::new(path, "path is not valid UTF-8"))?
            .to_string();

        Ok(Some((path_string, metadata.len())))
    }
}

fn has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanner() -> PathScanner {
        PathScanner::new(&ScanConfig::default()).unwrap()
    }

    fn indd() -> ExtensionFilter {
        ExtensionFilter::new("indd").unwrap()
    }

    fn write_sized(path: &Path, size: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![b'x'; size]).unwrap();
    }

    #[test]
    fn test_three_files_total_size() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("a.indd"), 100);
        write_sized(&root.join("jobs/b.indd"), 200);
        write_sized(&root.join("jobs/deep/c.INDD"), 300);
        write_sized(&root.join("jobs/notes.txt"), 999);

        let dir = DirectoryRef::new(root).unwrap();
        let output = scanner().scan(&dir, &indd()).unwrap();

        assert_eq!(output.result.len(), 3);
        assert_eq!(output.result.total_size, 600);
        assert!(output.skipped.is_empty());
        assert!(output.result.paths().all(Path::is_absolute));
    }

    #[test]
    fn test_total_size_matches_stat() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for (i, name) in ["x/1.indd", "x/y/2.indd", "3.indd", "z/4.indd"].iter().enumerate() {
            write_sized(&root.join(name), 17 * (i + 1));
        }

        let dir = DirectoryRef::new(root).unwrap();
        let result = scanner().scan(&dir, &indd()).unwrap().result;

        let summed: u64 = result
            .paths()
            .map(|p| fs::metadata(p).unwrap().len())
            .sum();
        assert_eq!(result.total_size, summed);
    }

    #[test]
    fn test_depth_first_name_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("b.indd"), 1);
        write_sized(&root.join("a/z.indd"), 1);
        write_sized(&root.join("a/m/k.indd"), 1);
        write_sized(&root.join("c.indd"), 1);

        let dir = DirectoryRef::new(root).unwrap();
        let first = scanner().scan(&dir, &indd()).unwrap().result;
        let second = scanner().scan(&dir, &indd()).unwrap().result;

        let relative: Vec<String> = first
            .paths()
            .map(|p| p.strip_prefix(dir.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(
            relative,
            vec!["a/m/k.indd", "a/z.indd", "b.indd", "c.indd"]
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_tree_is_empty_result() {
        let temp_dir = TempDir::new().unwrap();
        let dir = DirectoryRef::new(temp_dir.path()).unwrap();
        let output = scanner().scan(&dir, &indd()).unwrap();
        assert!(output.result.is_empty());
        assert_eq!(output.result.total_size, 0);
    }

    #[test]
    fn test_excluded_directories_not_walked() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("keep/a.indd"), 10);
        write_sized(&root.join("Backup/b.indd"), 10);

        let config = ScanConfig {
            exclude_dirs: vec!["backup".to_string()],
            ..ScanConfig::default()
        };
        let dir = DirectoryRef::new(root).unwrap();
        let result = PathScanner::new(&config)
            .unwrap()
            .scan(&dir, &indd())
            .unwrap()
            .result;

        assert_eq!(result.len(), 1);
        assert!(result.file_paths[0].ends_with("a.indd"));
    }

    #[test]
    fn test_excluded_directory_skipped_silently() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("jobs/cover.indd"), 10);
        write_sized(&root.join("to_convert/cover.indd"), 10);

        let dir = DirectoryRef::new(root).unwrap();
        let output = scanner()
            .excluding(root.join("to_convert"))
            .scan(&dir, &indd())
            .unwrap();

        assert_eq!(output.result.len(), 1);
        assert!(output.result.file_paths[0].contains("jobs"));
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_depth_limit_reports_truncated_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("a/x.indd"), 1);
        write_sized(&root.join("a/b/c.indd"), 1);
        fs::create_dir_all(root.join("a/empty")).unwrap();

        let config = ScanConfig {
            max_depth: 2,
            ..ScanConfig::default()
        };
        let dir = DirectoryRef::new(root).unwrap();
        let output = PathScanner::new(&config)
            .unwrap()
            .scan(&dir, &indd())
            .unwrap();

        assert_eq!(output.result.len(), 1);
        assert!(output.result.file_paths[0].ends_with("x.indd"));
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].path, dir.path().join("a/b"));
        assert_eq!(output.skipped[0].reason, "maximum depth reached");
    }

    #[test]
    fn test_removed_root_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let sub = temp_dir.path().join("gone");
        fs::create_dir(&sub).unwrap();
        let dir = DirectoryRef::new(&sub).unwrap();
        fs::remove_dir(&sub).unwrap();

        assert!(matches!(
            scanner().scan(&dir, &indd()),
            Err(StagehandError::NotFound { .. })
        ));
    }

    #[test]
    fn test_cancelled_scan() {
        let temp_dir = TempDir::new().unwrap();
        write_sized(&temp_dir.path().join("a.indd"), 1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let dir = DirectoryRef::new(temp_dir.path()).unwrap();
        let result = scanner().with_cancel_token(cancel).scan(&dir, &indd());
        assert!(matches!(result, Err(StagehandError::Cancelled { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_cyclic_symlink_terminates_without_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("loop/a.indd"), 5);
        std::os::unix::fs::symlink(root.join("loop"), root.join("loop/again")).unwrap();

        let dir = DirectoryRef::new(root).unwrap();

        let plain = scanner().scan(&dir, &indd()).unwrap();
        assert_eq!(plain.result.len(), 1);

        let following = PathScanner::new(&ScanConfig {
            follow_symlinks: true,
            ..ScanConfig::default()
        })
        .unwrap();
        let output = following.scan(&dir, &indd()).unwrap();
        assert_eq!(output.result.len(), 1);
        assert_eq!(output.result.total_size, 5);
        assert!(output
            .skipped
            .iter()
            .any(|f| f.reason == "symbolic link cycle"));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write_sized(&root.join("open/a.indd"), 10);
        write_sized(&root.join("locked/b.indd"), 10);
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores permission bits; nothing to assert there.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let dir = DirectoryRef::new(root).unwrap();
        let output = scanner().scan(&dir, &indd()).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(output.result.len(), 1);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].reason, "permission denied");
    }

    #[test]
    fn test_within_filters_by_directory() {
        let temp_dir = TempDir::new().unwrap();
        let inside = temp_dir.path().join("in");
        fs::create_dir(&inside).unwrap();
        let dir = DirectoryRef::new(&inside).unwrap();
        let inside_file = dir.path().join("a.indd").display().to_string();
        let result = SearchResult::new(
            vec![
                inside_file.clone(),
                dir.path().join("b.pdf").display().to_string(),
                "/elsewhere/c.indd".to_string(),
            ],
            0,
        );

        assert_eq!(
            result.within(&dir),
            vec![inside_file, dir.path().join("b.pdf").display().to_string()]
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1048576), "1.0 MB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.0 GB");
    }
}
