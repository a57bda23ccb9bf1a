use crate::error::{Result, StagehandError};
use crate::staging::area::StagingArea;
use crate::transfer::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub original: PathBuf,
    pub staged: PathBuf,
}

/// Original path to staged copy, for one gather/convert/restore cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingManifest {
    pub created_at: DateTime<Utc>,
    entries: Vec<ManifestEntry>,
}

impl StagingManifest {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    /// `None` when no cycle is active. Entries staged outside `area` mean the
    /// file was tampered with and are rejected as corrupt.
    pub fn load(area: &StagingArea) -> Result<Option<Self>> {
        let path = area.manifest_path();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StagehandError::at_path(&path, e)),
        };

        let manifest: StagingManifest =
            serde_json::from_str(&content).map_err(|e| StagehandError::ManifestCorrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if let Some(entry) = manifest
            .entries
            .iter()
            .find(|e| e.staged.parent() != Some(area.root()))
        {
            return Err(StagehandError::ManifestCorrupt {
                path,
                message: format!(
                    "staged path {} is outside the staging directory",
                    entry.staged.display()
                ),
            });
        }

        Ok(Some(manifest))
    }

    pub fn save(&self, area: &StagingArea) -> Result<()> {
        let path = area.manifest_path();
        let json = serde_json::to_vec_pretty(self).map_err(|e| StagehandError::ManifestCorrupt {
            path: path.clone(),
            message: e.to_string(),
        })?;

        write_atomic(&path, &json).map_err(|e| StagehandError::IoAt { path, source: e })
    }

    /// Drop the manifest file; the cycle is over.
    pub fn discard(area: &StagingArea) -> Result<()> {
        let path = area.manifest_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StagehandError::at_path(&path, e)),
        }
    }

    pub fn insert(&mut self, original: PathBuf, staged: PathBuf) {
        self.entries.push(ManifestEntry { original, staged });
    }

    pub fn contains_original(&self, original: &Path) -> bool {
        self.entries.iter().any(|e| e.original == original)
    }

    pub fn remove_original(&mut self, original: &Path) -> Option<ManifestEntry> {
        let index = self.entries.iter().position(|e| e.original == original)?;
        Some(self.entries.remove(index))
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StagingManifest {
    fn default() -> Self {
        Self::new()
    }
}
