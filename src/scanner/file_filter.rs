use crate::config::ScanConfig;
use crate::error::{Result, StagehandError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Case-insensitive file extension, stored lowercase without a leading dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtensionFilter(String);

impl ExtensionFilter {
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let ext = trimmed.strip_prefix('.').unwrap_or(trimmed);

        if ext.is_empty() {
            return Err(StagehandError::invalid_input(
                "file extension must not be empty",
            ));
        }

        if ext.contains(['/', '\\', '.']) || ext.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(StagehandError::invalid_input(format!(
                "file extension contains invalid characters: {}",
                raw
            )));
        }

        Ok(Self(ext.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.to_lowercase() == self.0)
    }

    /// `path` with its extension replaced by this one.
    pub fn apply_to(&self, path: &Path) -> PathBuf {
        path.with_extension(&self.0)
    }
}

impl fmt::Display for ExtensionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ExtensionFilter {
    type Err = StagehandError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ExtensionFilter {
    type Error = StagehandError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<ExtensionFilter> for String {
    fn from(filter: ExtensionFilter) -> Self {
        filter.0
    }
}

/// Directory exclusion rules applied while walking a tree.
pub struct FileFilter {
    exclude_dirs: Vec<String>,
    exclude_patterns: Vec<Regex>,
    skip_hidden: bool,
}

impl FileFilter {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let exclude_patterns = config
            .exclude_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| StagehandError::Config {
                    message: format!("Invalid exclude pattern '{}': {}", pattern, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            exclude_dirs: config
                .exclude_dirs
                .iter()
                .map(|d| d.to_lowercase())
                .collect(),
            exclude_patterns,
            skip_hidden: config.skip_hidden,
        })
    }

    pub fn should_traverse_directory(&self, path: &Path) -> bool {
        let Some(dir_name) = path.file_name().and_then(|s| s.to_str()) else {
            return true;
        };
        let dir_name_lower = dir_name.to_lowercase();

        if self.exclude_dirs.iter().any(|d| *d == dir_name_lower) {
            return false;
        }

        if self.matches_any_pattern(&path.to_string_lossy()) {
            return false;
        }

        if self.skip_hidden && dir_name.starts_with('.') && dir_name != "." && dir_name != ".." {
            return false;
        }

        true
    }

    pub fn matches_any_pattern(&self, text: &str) -> bool {
        self.exclude_patterns
            .iter()
            .any(|pattern| pattern.is_match(text))
    }
}

impl Default for FileFilter {
    fn default() -> Self {
        Self {
            exclude_dirs: Vec::new(),
            exclude_patterns: Vec::new(),
            skip_hidden: false,
        }
    }
}
