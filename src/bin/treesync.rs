//! treesync CLI - synchronize two local directories.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use treesync::{
    sync, CopyStrategy, DeltaStrategy, SyncAction, SyncError, SyncOptions, DEFAULT_BLOCK_SIZE,
};

/// Synchronise two local directories.
#[derive(Parser)]
#[command(name = "treesync")]
#[command(version)]
#[command(about = "Synchronise two local directories")]
struct Cli {
    /// Path to the source directory
    source: PathBuf,

    /// Path to the destination directory
    destination: PathBuf,

    /// Copy files wholesale (default) or send rolling deltas
    #[arg(long, value_enum, default_value_t = StrategyChoice::Copy)]
    strategy: StrategyChoice,

    /// Block size (bytes) for the delta strategy
    #[arg(long)]
    block_size: Option<u32>,

    /// Preview sync actions without modifying the destination
    #[arg(long)]
    dry_run: bool,

    /// Log each action as it occurs
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyChoice {
    /// Whole-file copies.
    Copy,
    /// Rolling-checksum deltas against the existing destination.
    Delta,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ SyncError::Argument(_)) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> treesync::Result<()> {
    let options = SyncOptions {
        dry_run: cli.dry_run,
        verbose: cli.verbose,
    };

    let mut reporter_fn;
    let reporter: Option<&mut dyn FnMut(&SyncAction)> = if cli.dry_run || cli.verbose {
        reporter_fn = console_reporter(&cli.source, &cli.destination, cli.dry_run);
        Some(&mut reporter_fn)
    } else {
        None
    };

    match cli.strategy {
        StrategyChoice::Copy => {
            if cli.block_size.is_some() {
                return Err(SyncError::Argument(
                    "--block-size can only be used with --strategy delta".into(),
                ));
            }
            let mut strategy = CopyStrategy::new();
            sync(&cli.source, &cli.destination, &mut strategy, options, reporter)?;
        }
        StrategyChoice::Delta => {
            let block_size = cli.block_size.unwrap_or(DEFAULT_BLOCK_SIZE);
            let mut strategy = DeltaStrategy::new(block_size)?;
            sync(&cli.source, &cli.destination, &mut strategy, options, reporter)?;
            if !cli.dry_run {
                print_delta_stats(&strategy, &cli.destination);
            }
        }
    }

    if cli.dry_run {
        println!("Dry run complete; no changes were made.");
    }

    Ok(())
}

/// Reporter printing one labeled line per action.
fn console_reporter<'a>(
    source_root: &'a Path,
    dest_root: &'a Path,
    dry_run: bool,
) -> impl FnMut(&SyncAction) + 'a {
    let prefix = if dry_run { "DRY RUN: " } else { "" };
    move |action: &SyncAction| {
        let mut line = format!(
            "{prefix}{}: {}",
            action.kind.label(),
            display_relative(&action.path, dest_root)
        );
        if let Some(source) = &action.source {
            line.push_str(&format!(" (from {})", display_relative(source, source_root)));
        }
        if let Some(reason) = action.reason {
            line.push_str(&format!(" [{reason}]"));
        }
        println!("{line}");
    }
}

/// Path relative to `root` when possible, `.` for the root itself.
fn display_relative(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => path.display().to_string(),
    }
}

/// Per-file transfer accounting after a delta run.
fn print_delta_stats(strategy: &DeltaStrategy, dest_root: &Path) {
    let stats = strategy.stats();
    if stats.is_empty() {
        println!("Delta transfer stats: no files processed.");
        return;
    }

    let mut transferred = 0u64;
    let mut reused = 0u64;
    let mut saved = 0u64;

    println!("Delta transfer stats:");
    for (path, entry) in &stats {
        transferred += entry.bytes_transferred();
        reused += entry.matched_bytes;
        saved += entry.bytes_saved();
        println!(
            "  {}: transferred {} B, reused {} B, saved {} B",
            display_relative(path, dest_root),
            entry.bytes_transferred(),
            entry.matched_bytes,
            entry.bytes_saved()
        );
    }
    println!("Total: transferred {transferred} bytes | reused {reused} bytes | saved {saved} bytes");
}
