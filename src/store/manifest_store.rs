use crate::error::{Result, StagehandError};
use crate::scanner::SearchResult;
use crate::transfer::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct ScrapeRecord {
    saved_at: DateTime<Utc>,
    #[serde(flatten)]
    result: SearchResult,
}

/// The scrape file: the most recent search, kept across runs.
///
/// Single writer, last write wins. Writes go through a temp file and a
/// rename, so an interrupted save leaves the previous record intact.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, result: &SearchResult) -> Result<()> {
        let record = ScrapeRecord {
            saved_at: Utc::now(),
            result: result.clone(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| StagehandError::ManifestCorrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })?;

        write_atomic(&self.path, &json).map_err(|e| StagehandError::IoAt {
            path: self.path.clone(),
            source: e,
        })?;

        info!(path = %self.path.display(), files = result.len(), "search saved");
        Ok(())
    }

    /// `None` if nothing has been saved yet.
    ///
    /// Older scrape files are plain newline-separated path lists; those load
    /// too, with the total size taken from whichever files still exist.
    pub fn load(&self) -> Result<Option<SearchResult>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StagehandError::at_path(&self.path, e)),
        };

        if content.trim_start().starts_with('{') {
            let record: ScrapeRecord =
                serde_json::from_str(&content).map_err(|e| StagehandError::ManifestCorrupt {
                    path: self.path.clone(),
                    message: e.to_string(),
                })?;
            debug!(saved_at = %record.saved_at, files = record.result.len(), "loaded saved search");
            return Ok(Some(record.result));
        }

        Ok(Some(parse_path_list(&content)))
    }

    pub fn read_paths(&self) -> Result<Vec<String>> {
        Ok(self.load()?.map(|r| r.file_paths).unwrap_or_default())
    }
}

fn parse_path_list(content: &str) -> SearchResult {
    let file_paths: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    let total_size = file_paths
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum();

    SearchResult::new(file_paths, total_size)
}
