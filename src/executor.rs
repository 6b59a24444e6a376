//! Run a planned synchronization against the destination tree.
//!
//! The executor drives the planner one action at a time, dispatches file
//! work to the configured strategy, and reports each materialized action.
//! In dry-run mode the destination is never touched: no directories, no
//! temp files, no renames.

use std::fs;
use std::path::{Path, PathBuf};

use crate::action::{ActionKind, SyncAction};
use crate::error::{Result, SyncError};
use crate::strategy::{copy_metadata, FileSyncStrategy};
use crate::walk::{PlannedKind, Planner};

/// Run-wide options.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Compute and report actions without mutating the destination.
    pub dry_run: bool,
    /// Also report skipped entries.
    pub verbose: bool,
}

/// Mirror the contents of `source` into `destination`.
///
/// Missing directories are created, files are created or updated through
/// `strategy`, and unchanged files are skipped. Entries present only in the
/// destination are preserved. The reporter, when given, is invoked
/// synchronously after each action in traversal order; skip actions are
/// reported only in verbose mode.
///
/// # Errors
///
/// Returns an `Argument` error when `source` is not an existing directory
/// or `destination` exists and is not a directory; any I/O or strategy
/// failure aborts the run and is returned as-is.
pub fn sync<S: FileSyncStrategy>(
    source: &Path,
    destination: &Path,
    strategy: &mut S,
    options: SyncOptions,
    mut reporter: Option<&mut dyn FnMut(&SyncAction)>,
) -> Result<()> {
    let source_meta = match fs::metadata(source) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SyncError::Argument(format!(
                "source directory does not exist: {}",
                source.display()
            )));
        }
        Err(e) => return Err(SyncError::source_io(source, e)),
    };
    if !source_meta.is_dir() {
        return Err(SyncError::Argument(format!(
            "source path is not a directory: {}",
            source.display()
        )));
    }
    match fs::metadata(destination) {
        Ok(meta) if !meta.is_dir() => {
            return Err(SyncError::Argument(format!(
                "destination path is not a directory: {}",
                destination.display()
            )));
        }
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            return Err(SyncError::dest_io(destination, e));
        }
        _ => {}
    }

    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        dry_run = options.dry_run,
        "starting sync"
    );

    // Directories whose metadata is refreshed after their contents settle,
    // in traversal order (parents first).
    let mut dir_metadata: Vec<(PathBuf, PathBuf)> = Vec::new();

    for planned in Planner::new(source, destination) {
        let planned = planned?;

        let kind = match planned.kind {
            PlannedKind::CreateDir => {
                if !options.dry_run {
                    fs::create_dir_all(&planned.destination)
                        .map_err(|e| SyncError::dest_io(&planned.destination, e))?;
                }
                dir_metadata.push((planned.destination.clone(), planned.source.clone()));
                ActionKind::CreateDir
            }
            PlannedKind::SkipDir => {
                dir_metadata.push((planned.destination.clone(), planned.source.clone()));
                ActionKind::SkipDir
            }
            PlannedKind::CreateFile => {
                if !options.dry_run {
                    strategy.sync_file(&planned.source, &planned.destination)?;
                }
                ActionKind::CreateFile
            }
            PlannedKind::UpdateFile => {
                if !options.dry_run {
                    strategy.sync_file(&planned.source, &planned.destination)?;
                }
                strategy.update_action()
            }
            PlannedKind::SkipFile => ActionKind::SkipFile,
        };

        tracing::trace!(kind = %kind, path = %planned.destination.display(), "action");

        if !kind.is_skip() || options.verbose {
            if let Some(report) = reporter.as_mut() {
                let action = SyncAction {
                    kind,
                    path: planned.destination,
                    source: Some(planned.source),
                    reason: planned.reason,
                };
                report(&action);
            }
        }
    }

    // Children settle before their parents: replaying the traversal order
    // backwards guarantees it.
    if !options.dry_run {
        for (dir_dest, dir_source) in dir_metadata.iter().rev() {
            copy_metadata(dir_source, dir_dest)?;
        }
    }

    Ok(())
}
