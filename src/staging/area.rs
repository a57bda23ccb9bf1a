use crate::error::{Result, StagehandError};
use crate::scanner::ExtensionFilter;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = ".stagehand.lock";
pub const MANIFEST_FILE_NAME: &str = ".stagehand-manifest.json";

/// The working directory files are staged into between gather and restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| StagehandError::IoAt {
            path: self.root.clone(),
            source: e,
        })
    }

    /// Whether `path` lies inside the staging directory, also when the root
    /// was configured through a symlink.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
            || fs::canonicalize(&self.root).is_ok_and(|root| path.starts_with(root))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn lock(&self) -> Result<StagingLock> {
        StagingLock::acquire(&self.root)
    }

    /// Regular staged files with extension `ext`, sorted by name. Bookkeeping
    /// and in-progress files are hidden and never listed.
    pub fn staged_files(&self, ext: &ExtensionFilter) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.root).map_err(|e| StagehandError::at_path(&self.root, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StagehandError::at_path(&self.root, e))?;
            let path = entry.path();

            if is_hidden(&path) || !ext.matches(&path) {
                continue;
            }
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// Exclusive claim on a staging directory, released on drop.
#[derive(Debug)]
pub struct StagingLock {
    path: PathBuf,
}

impl StagingLock {
    fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE_NAME);

        match Self::create(&path) {
            Err(StagehandError::StagingBusy { .. }) if Self::is_stale(&path) => {
                warn!(lock = %path.display(), "removing lock left by a dead process");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(StagehandError::at_path(&path, e)),
                }
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self> {
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(lock = %path.display(), "staging directory is locked");
                return Err(StagehandError::StagingBusy {
                    path: path.parent().unwrap_or(path).to_path_buf(),
                });
            }
            Err(e) => return Err(StagehandError::at_path(path, e)),
        };

        let _ = writeln!(file, "{}", std::process::id());
        debug!(lock = %path.display(), "staging lock acquired");

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// A lock is stale only when it names a process that no longer exists.
    /// Unreadable or half-written lock files count as held.
    fn is_stale(path: &Path) -> bool {
        let Ok(content) = fs::read_to_string(path) else {
            return false;
        };
        match content.trim().parse::<u32>() {
            Ok(pid) => !process_alive(pid),
            Err(_) => false,
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0 only checks that the process exists and may be signalled.
    let res = unsafe { libc::kill(pid, 0) };
    res == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

impl Drop for StagingLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release staging lock");
        }
    }
}
