use crate::progress::{ProgressEvent, ProgressListener};
use crate::ui::output::format_duration;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Resolution of the bar; fractions are mapped onto `0..=BAR_SCALE`.
const BAR_SCALE: u64 = 1000;

pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    pub fn create_fraction_progress(&self) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(ProgressBar::new(BAR_SCALE));
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message("Starting...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Drive a bar from `listener` until the returned renderer is finished.
    /// Must be called from within a tokio runtime.
    pub fn track(&self, mut listener: ProgressListener) -> ProgressRenderer {
        let bar = self.create_fraction_progress();
        apply_event(&bar, &listener.latest());

        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = listener.changed().await {
                apply_event(&task_bar, &event);
            }
        });

        ProgressRenderer {
            bar,
            task,
            started: Instant::now(),
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            self.multi_progress.clear().ok();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new(true)
    }
}

/// A bar being fed from the progress stream.
pub struct ProgressRenderer {
    bar: ProgressBar,
    task: JoinHandle<()>,
    started: Instant,
}

impl ProgressRenderer {
    pub fn finish_with_summary(self, message: &str) {
        self.task.abort();
        let final_message = format!(
            "{} (completed in {})",
            message,
            format_duration(self.started.elapsed())
        );
        self.bar.finish_with_message(final_message);
    }

    pub fn abandon(self) {
        self.task.abort();
        self.bar.finish_and_clear();
    }
}

fn apply_event(pb: &ProgressBar, event: &ProgressEvent) {
    if let Some(operation) = event.operation {
        pb.set_message(operation.to_string());
    }
    pb.set_position(bar_position(event.fraction));
}

fn bar_position(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * BAR_SCALE as f64).round() as u64
}
