use crate::error::{Result, StagehandError};
use std::fs;
use std::path::{Path, PathBuf};

/// An absolute path that was an existing directory when it was selected.
///
/// Directories can disappear between selection and use, so operations call
/// [`DirectoryRef::revalidate`] before touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRef {
    path: PathBuf,
}

impl DirectoryRef {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.as_os_str().is_empty() {
            return Err(StagehandError::invalid_input("no directory selected"));
        }

        let canonical = fs::canonicalize(path).map_err(|e| StagehandError::at_path(path, e))?;

        if !canonical.is_dir() {
            return Err(StagehandError::invalid_input(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        Ok(Self { path: canonical })
    }

    pub fn revalidate(&self) -> Result<()> {
        let metadata =
            fs::metadata(&self.path).map_err(|e| StagehandError::at_path(&self.path, e))?;

        if !metadata.is_dir() {
            return Err(StagehandError::NotFound {
                path: self.path.clone(),
            });
        }

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }
}

impl AsRef<Path> for DirectoryRef {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}
