use crate::batch::BatchReport;
use crate::error::{StagehandError, UserFriendlyError};
use crate::scanner::ScanOutput;
use console::{style, Emoji, Term};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");

/// How many per-file failures human output lists before summarising.
const MAX_LISTED_FAILURES: usize = 20;

/// Renders command results. JSON mode writes one object per line.
pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &StagehandError) {
        let user_message = error.user_message();
        let suggestion = error.suggestion();

        match self.mode {
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "error",
                    "kind": error.kind(),
                    "message": user_message,
                    "suggestion": suggestion,
                    "timestamp": chrono::Utc::now().to_rfc3339()
                }));
            }
            OutputMode::Human => {
                self.error(&user_message);
                if let Some(suggestion) = suggestion {
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
            }
            OutputMode::Plain => {
                self.error(&user_message);
                if let Some(suggestion) = suggestion {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    pub fn print_search_result(&self, output: &ScanOutput) {
        let result = &output.result;
        match self.mode {
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "search_result",
                    "file_paths": result.file_paths,
                    "total_size": result.total_size,
                    "skipped": output.skipped,
                }));
            }
            OutputMode::Plain => {
                for path in &result.file_paths {
                    println!("{}", path);
                }
                println!("TOTAL: {} files, {} bytes", result.len(), result.total_size);
                for skipped in &output.skipped {
                    eprintln!("SKIPPED: {}: {}", skipped.path.display(), skipped.reason);
                }
            }
            OutputMode::Human => {
                if self.verbose_level >= 1 {
                    for path in &result.file_paths {
                        println!("  {}", path);
                    }
                }
                let summary = format!(
                    "Found {} files ({})",
                    result.len(),
                    result.format_total_size()
                );
                self.success(&summary);
                if !output.skipped.is_empty() {
                    self.warning(&format!(
                        "{} paths could not be read and were skipped",
                        output.skipped.len()
                    ));
                    if !self.quiet {
                        for skipped in output.skipped.iter().take(MAX_LISTED_FAILURES) {
                            println!("  - {}: {}", skipped.path.display(), skipped.reason);
                        }
                    }
                }
            }
        }
    }

    pub fn print_batch_report(&self, report: &BatchReport) {
        match self.mode {
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "batch_report",
                    "operation": report.operation,
                    "completed": report.completed,
                    "failures": report.failures,
                    "duration_ms": report.elapsed.as_millis() as u64,
                }));
            }
            OutputMode::Plain => {
                println!(
                    "COMPLETED: {} {} files in {}",
                    report.operation,
                    report.completed,
                    format_duration(report.elapsed)
                );
                for failure in &report.failures {
                    println!("FAILED: {}: {}", failure.path.display(), failure.reason);
                }
            }
            OutputMode::Human => self.print_human_report(report),
        }
    }

    pub fn print_file_list(&self, paths: &[String]) {
        match self.mode {
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "file_list",
                    "file_paths": paths,
                }));
            }
            OutputMode::Plain | OutputMode::Human => {
                for path in paths {
                    println!("{}", path);
                }
                if self.mode == OutputMode::Human && paths.is_empty() {
                    self.info("No saved search");
                }
            }
        }
    }

    fn print_human_report(&self, report: &BatchReport) {
        let summary = format!(
            "{}: {} files in {}",
            report.operation,
            report.completed,
            format_duration(report.elapsed)
        );

        if report.is_clean() {
            self.success(&summary);
            return;
        }

        self.warning(&format!("{} ({} failed)", summary, report.failures.len()));
        if self.quiet {
            return;
        }
        for failure in report.failures.iter().take(MAX_LISTED_FAILURES) {
            if self.use_colors {
                println!(
                    "  - {}: {}",
                    failure.path.display(),
                    style(&failure.reason).yellow()
                );
            } else {
                println!("  - {}: {}", failure.path.display(), failure.reason);
            }
        }
        if report.failures.len() > MAX_LISTED_FAILURES {
            println!(
                "  ... and {} more",
                report.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        if self.use_colors {
            let styled = match msg_type {
                MessageType::Success => format!("{}{}", CHECKMARK, style(message).green().bold()),
                MessageType::Error => format!("{}{}", CROSS, style(message).red().bold()),
                MessageType::Warning => format!("{}{}", WARNING, style(message).yellow().bold()),
                MessageType::Info => format!("{}{}", INFO, style(message).cyan()),
            };
            match msg_type {
                MessageType::Error => eprintln!("{}", styled),
                _ => println!("{}", styled),
            }
            return;
        }

        let prefix = match msg_type {
            MessageType::Success => "✓",
            MessageType::Error => "✗",
            MessageType::Warning => "!",
            MessageType::Info => "i",
        };

        match msg_type {
            MessageType::Error => eprintln!("{} {}", prefix, message),
            _ => println!("{} {}", prefix, message),
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(!formatter.should_show_message(0));
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(!formatter.should_show_message(2));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::ZERO), "0ms");
    }
}
