use crate::batch::{FileFailure, Operation};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StagehandError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Path not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("{operation} failed for all {} files", .failures.len())]
    PartialFailure {
        operation: Operation,
        failures: Vec<FileFailure>,
    },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO operation failed on {}: {source}", .path.display())]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Staging directory is busy: {}", .path.display())]
    StagingBusy { path: PathBuf },

    #[error("Manifest {} is corrupt: {message}", .path.display())]
    ManifestCorrupt { path: PathBuf, message: String },

    #[error("No converter available: {message}")]
    ConverterUnavailable { message: String },

    #[error("{operation} was cancelled after {completed} files")]
    Cancelled { operation: Operation, completed: usize },
}

/// Coarse classification of failures, used for exit codes and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    PermissionDenied,
    PartialFailure,
    IoFailure,
    Busy,
    Cancelled,
}

impl StagehandError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StagehandError::InvalidInput { .. }
            | StagehandError::Config { .. }
            | StagehandError::ConverterUnavailable { .. } => ErrorKind::InvalidInput,
            StagehandError::NotFound { .. } => ErrorKind::NotFound,
            StagehandError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            StagehandError::PartialFailure { .. } => ErrorKind::PartialFailure,
            StagehandError::Io(_)
            | StagehandError::IoAt { .. }
            | StagehandError::ManifestCorrupt { .. } => ErrorKind::IoFailure,
            StagehandError::StagingBusy { .. } => ErrorKind::Busy,
            StagehandError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        StagehandError::InvalidInput {
            message: message.into(),
        }
    }

    /// Attach a path to an IO error, mapping the kinds callers care about.
    pub fn at_path<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => StagehandError::NotFound { path },
            std::io::ErrorKind::PermissionDenied => StagehandError::PermissionDenied { path },
            _ => StagehandError::IoAt { path, source },
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for StagehandError {
    fn user_message(&self) -> String {
        match self {
            StagehandError::InvalidInput { message } => format!("Invalid input: {}", message),
            StagehandError::NotFound { path } => {
                format!("Directory or file no longer exists: {}", path.display())
            }
            StagehandError::PermissionDenied { path } => {
                format!("Permission denied accessing: {}", path.display())
            }
            StagehandError::PartialFailure {
                operation,
                failures,
            } => {
                let mut message = format!("{} failed for every file:", operation);
                for failure in failures.iter().take(10) {
                    message.push_str(&format!(
                        "\n  - {}: {}",
                        failure.path.display(),
                        failure.reason
                    ));
                }
                if failures.len() > 10 {
                    message.push_str(&format!("\n  ... and {} more", failures.len() - 10));
                }
                message
            }
            StagehandError::StagingBusy { path } => {
                format!(
                    "Another operation is using the staging directory: {}",
                    path.display()
                )
            }
            StagehandError::Cancelled {
                operation,
                completed,
            } => format!(
                "{} was cancelled by user ({} files completed)",
                operation, completed
            ),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            StagehandError::InvalidInput { .. } => Some(
                "Check the directory and extension arguments (e.g., `stagehand search ~/Work --ext indd`).".to_string()
            ),
            StagehandError::NotFound { .. } => Some(
                "The directory may have been moved, deleted or unmounted since it was selected. Select it again and retry.".to_string()
            ),
            StagehandError::PermissionDenied { .. } => Some(
                "Ensure you have the necessary read/write permissions for the directory.".to_string()
            ),
            StagehandError::Config { .. } => Some(
                "Check your configuration file syntax or regenerate one with `stagehand init-config`.".to_string()
            ),
            StagehandError::StagingBusy { path } => Some(format!(
                "Wait for the other operation to finish. If none is running, remove the stale lock file in {}.",
                path.display()
            )),
            StagehandError::ManifestCorrupt { .. } => Some(
                "Restore will fall back to moving converted files to the base directory once the manifest is removed.".to_string()
            ),
            StagehandError::ConverterUnavailable { .. } => Some(
                "Set `[converter] program` in the configuration or pass --converter, or convert the staged files manually and run `stagehand restore`.".to_string()
            ),
            StagehandError::PartialFailure { .. } => Some(
                "Run with -vv to see per-file details in the log.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for StagehandError {
    fn from(error: toml::de::Error) -> Self {
        StagehandError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StagehandError>;
