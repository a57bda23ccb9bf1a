use crate::batch::CancelToken;
use crate::error::{Result, StagehandError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Exit status used when a second Ctrl+C forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Turns Ctrl+C into a cancellation request for the running operation.
///
/// A second Ctrl+C exits immediately. Any staging lock left behind by that
/// exit is reclaimed by the next run, since it names a dead process.
pub struct GracefulShutdown;

impl GracefulShutdown {
    pub fn new(cancel: CancelToken) -> Result<Self> {
        let interrupted = AtomicBool::new(false);

        ctrlc::set_handler(move || {
            if handle_interrupt(&cancel, &interrupted) {
                eprintln!("\n💀 Force stopping...");
                std::process::exit(FORCED_EXIT_CODE);
            }
            eprintln!("\n🛑 Stopping after the files in progress... (press Ctrl+C again to force exit)");
        })
        .map_err(|e| StagehandError::Config {
            message: format!("Failed to set signal handler: {}", e),
        })?;

        Ok(Self)
    }
}

/// Cancel the running operation. Returns true when an earlier interrupt was
/// already seen and the process should stop now.
fn handle_interrupt(cancel: &CancelToken, interrupted: &AtomicBool) -> bool {
    cancel.cancel();
    interrupted.swap(true, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_cancels_second_forces_exit() {
        let token = CancelToken::new();
        let interrupted = AtomicBool::new(false);

        assert!(!handle_interrupt(&token, &interrupted));
        assert!(token.is_cancelled());

        assert!(handle_interrupt(&token, &interrupted));
    }
}
