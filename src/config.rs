use crate::error::{Result, StagehandError};
use crate::scanner::FileFilter;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub staging: StagingConfig,
    pub workers: WorkerConfig,
    pub converter: ConverterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    pub max_depth: usize,
    pub follow_symlinks: bool,
    pub skip_hidden: bool,
    pub exclude_dirs: Vec<String>,
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Parent of the staging directory and home of the scrape file.
    pub base_directory: PathBuf,
    pub directory_name: String,
    pub scrape_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub threads: usize,
    pub buffer_size: usize,
    /// Always copy-then-delete when moving, even within one volume.
    pub force_copy: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConverterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// `{input}` and `{output}` are replaced with the file paths.
    pub args: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            follow_symlinks: false,
            skip_hidden: false,
            exclude_dirs: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            base_directory: default_base_directory(),
            directory_name: "to_convert".to_string(),
            scrape_file: "scraped_files.json".to_string(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus::get().clamp(1, 8),
            buffer_size: 64 * 1024, // 64KB
            force_copy: false,
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["{input}".to_string(), "{output}".to_string()],
        }
    }
}

fn default_base_directory() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

impl StagingConfig {
    pub fn staging_dir(&self) -> PathBuf {
        self.base_directory.join(&self.directory_name)
    }

    pub fn scrape_path(&self) -> PathBuf {
        self.base_directory.join(&self.scrape_file)
    }

    /// Anchor a relative base directory at the current directory. The
    /// manifest records staged paths under it, and those must stay valid
    /// when a later run starts somewhere else.
    pub fn make_absolute(&mut self) -> Result<()> {
        if self.base_directory.is_absolute() {
            return Ok(());
        }

        let cwd = std::env::current_dir()?;
        self.base_directory = self
            .base_directory
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .fold(cwd, |path, c| path.join(c));
        Ok(())
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(StagehandError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| StagehandError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| StagehandError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["stagehand.toml", ".stagehand.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref base_dir) = cli_args.base_dir {
            self.staging.base_directory = base_dir.clone();
        }

        if let Some(threads) = cli_args.threads {
            self.workers.threads = threads;
        }

        if let Some(follow) = cli_args.follow_symlinks {
            self.scan.follow_symlinks = follow;
        }

        if let Some(ref program) = cli_args.converter {
            self.converter.program = Some(program.clone());
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| StagehandError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| StagehandError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan.max_depth == 0 {
            return Err(StagehandError::Config {
                message: "Maximum directory depth must be greater than 0".to_string(),
            });
        }

        // Compiles the exclude patterns.
        FileFilter::new(&self.scan)?;

        if self.workers.threads == 0 {
            return Err(StagehandError::Config {
                message: "Worker thread count must be greater than 0".to_string(),
            });
        }

        if self.workers.buffer_size < 4096 {
            return Err(StagehandError::Config {
                message: "Copy buffer size must be at least 4096 bytes".to_string(),
            });
        }

        let name = self.staging.directory_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StagehandError::Config {
                message: format!(
                    "Staging directory name must be a single path component: '{}'",
                    self.staging.directory_name
                ),
            });
        }

        if self.staging.scrape_file.trim().is_empty() {
            return Err(StagehandError::Config {
                message: "Scrape file name must not be empty".to_string(),
            });
        }

        if self.converter.program.is_some()
            && !self.converter.args.iter().any(|a| a.contains("{input}"))
        {
            return Err(StagehandError::Config {
                message: "Converter arguments must reference {input}".to_string(),
            });
        }

        Ok(())
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub base_dir: Option<PathBuf>,
    pub threads: Option<usize>,
    pub follow_symlinks: Option<bool>,
    pub converter: Option<PathBuf>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(mut self, base_dir: Option<PathBuf>) -> Self {
        self.base_dir = base_dir;
        self
    }

    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_follow_symlinks(mut self, follow: Option<bool>) -> Self {
        self.follow_symlinks = follow;
        self
    }

    pub fn with_converter(mut self, converter: Option<PathBuf>) -> Self {
        self.converter = converter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.staging.directory_name, "to_convert");
        assert!(config.workers.threads >= 1 && config.workers.threads <= 8);
        assert!(!config.scan.follow_symlinks);
        assert!(config.converter.program.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.workers.threads = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.staging.directory_name = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scan.exclude_patterns = vec!["[".to_string()];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.converter.program = Some(PathBuf::from("convert"));
        config.converter.args = vec!["--out".to_string(), "{output}".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_file_operations() {
        let mut config = Config::default();
        config.converter.program = Some(PathBuf::from("/usr/bin/true"));
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.workers.threads, loaded_config.workers.threads);
        assert_eq!(loaded_config.converter.program, config.converter.program);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[workers]\nthreads = 3\n\n[staging]\ndirectory_name = \"inbox\"").unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.workers.threads, 3);
        assert_eq!(config.workers.buffer_size, 64 * 1024);
        assert_eq!(config.staging.directory_name, "inbox");
        assert_eq!(config.staging.scrape_file, "scraped_files.json");
        assert_eq!(config.scan.max_depth, 64);
    }

    #[test]
    fn test_missing_config_file() {
        let result = Config::load_from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(StagehandError::Config { .. })));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_base_dir(Some(PathBuf::from("/tmp/desk")))
            .with_threads(Some(2))
            .with_follow_symlinks(Some(true));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.workers.threads, 2);
        assert!(config.scan.follow_symlinks);
        assert_eq!(
            config.staging.staging_dir(),
            PathBuf::from("/tmp/desk/to_convert")
        );
        assert_eq!(
            config.staging.scrape_path(),
            PathBuf::from("/tmp/desk/scraped_files.json")
        );
    }

    #[test]
    fn test_relative_base_directory_made_absolute() {
        let mut config = Config::default();
        config.merge_with_cli_args(
            &CliOverrides::new().with_base_dir(Some(PathBuf::from("./desk/inbox"))),
        );

        config.staging.make_absolute().unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.staging.base_directory, cwd.join("desk").join("inbox"));
        assert!(config.staging.staging_dir().is_absolute());

        let mut absolute = Config::default();
        absolute.staging.base_directory = PathBuf::from("/tmp/desk");
        absolute.staging.make_absolute().unwrap();
        assert_eq!(absolute.staging.base_directory, PathBuf::from("/tmp/desk"));
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(!sample.is_empty());
        assert!(sample.contains("[scan]"));
        assert!(sample.contains("[staging]"));
        assert!(sample.contains("[workers]"));
        assert!(sample.contains("[converter]"));
    }
}
