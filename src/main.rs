use clap::Parser;
use stagehand::{
    logging, BatchReport, Cli, Command, ErrorKind, GatherSource, GracefulShutdown, OutputFormatter,
    OutputMode, ProgressManager, Stagehand, StagehandError,
};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::task;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

/// Result of one command, ready for printing.
enum CommandOutput {
    Search(stagehand::ScanOutput),
    Gather(stagehand::GatherOutcome),
    Batch(BatchReport),
    Paths(Vec<String>),
}

async fn run() -> i32 {
    let cli = Cli::parse();
    logging::init(cli.verbosity_level(), cli.quiet);

    if let Command::InitConfig { path } = &cli.command {
        return handle_init_config(path);
    }

    let formatter = OutputFormatter::new(cli.output_mode(), cli.verbose, cli.quiet);

    let stagehand = match Stagehand::from_cli(&cli) {
        Ok(stagehand) => Arc::new(stagehand),
        Err(e) => {
            formatter.print_user_friendly_error(&e);
            return exit_code_for(&e);
        }
    };

    // Without a handler Ctrl+C still ends the process, just not gracefully.
    let _shutdown = match GracefulShutdown::new(stagehand.cancel_token()) {
        Ok(shutdown) => Some(shutdown),
        Err(e) => {
            tracing::warn!(error = %e, "graceful shutdown unavailable");
            None
        }
    };

    let progress_manager = ProgressManager::new(cli.shows_progress());
    let renderer = progress_manager.track(stagehand.subscribe());

    let worker = Arc::clone(&stagehand);
    let command = cli.command;
    let outcome = task::spawn_blocking(move || execute(&worker, command))
        .await
        .unwrap_or_else(|e| {
            Err(StagehandError::Config {
                message: format!("Operation task failed: {}", e),
            })
        });

    match outcome {
        Ok(output) => {
            renderer.finish_with_summary("Done");
            progress_manager.clear();
            print_output(&formatter, &output)
        }
        Err(e) => {
            renderer.abandon();
            progress_manager.clear();
            formatter.print_user_friendly_error(&e);
            exit_code_for(&e)
        }
    }
}

fn execute(stagehand: &Stagehand, command: Command) -> stagehand::Result<CommandOutput> {
    match command {
        Command::Search { dir, ext } => stagehand.search_files(dir, &ext).map(CommandOutput::Search),
        Command::Gather { ext, dir, files } => {
            let source = match dir {
                Some(dir) => GatherSource::Directory(dir),
                None if files.is_empty() => GatherSource::LastSearch,
                None => GatherSource::Files(files.iter().map(|f| absolutize(f.as_path())).collect()),
            };
            stagehand
                .gather_files(source, &ext)
                .map(CommandOutput::Gather)
        }
        Command::Convert(pair) => stagehand
            .convert_files(&pair.from, &pair.to)
            .map(CommandOutput::Batch),
        Command::Restore(pair) => stagehand
            .restore_files(&pair.from, &pair.to)
            .map(CommandOutput::Batch),
        Command::Move {
            ext,
            from_dir,
            to_dir,
        } => stagehand
            .move_files(&ext, from_dir, to_dir)
            .map(CommandOutput::Batch),
        Command::Scrape => stagehand.read_scrape_file().map(CommandOutput::Paths),
        Command::InitConfig { .. } => Err(StagehandError::invalid_input(
            "init-config does not run as a batch command",
        )),
    }
}

fn print_output(formatter: &OutputFormatter, output: &CommandOutput) -> i32 {
    match output {
        CommandOutput::Search(search) => {
            formatter.print_search_result(search);
            0
        }
        CommandOutput::Gather(outcome) => {
            if let Some(search) = &outcome.search {
                formatter.print_search_result(search);
            }
            formatter.print_batch_report(&outcome.report);
            report_exit_code(&outcome.report)
        }
        CommandOutput::Batch(report) => {
            formatter.print_batch_report(report);
            report_exit_code(report)
        }
        CommandOutput::Paths(paths) => {
            formatter.print_file_list(paths);
            0
        }
    }
}

fn report_exit_code(report: &BatchReport) -> i32 {
    if report.is_clean() {
        0 // Success
    } else {
        2 // Success with per-file failures
    }
}

fn exit_code_for(error: &StagehandError) -> i32 {
    match error.kind() {
        ErrorKind::Cancelled => 130, // Interrupted (SIGINT)
        ErrorKind::InvalidInput => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::PermissionDenied => 5,
        ErrorKind::PartialFailure => 6,
        ErrorKind::Busy => 7,
        ErrorKind::IoFailure => 1, // General error
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn handle_init_config(path: &Path) -> i32 {
    match Stagehand::generate_sample_config(path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", path.display());
            println!("\nTo use this configuration:");
            println!("  stagehand --config {} search <DIR> --ext <EXT>", path.display());
            println!("\nEdit the file to customize settings for your needs.");
            0
        }
        Err(e) => {
            let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
            formatter.print_user_friendly_error(&e);
            exit_code_for(&e)
        }
    }
}
