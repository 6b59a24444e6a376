//! Action events reported while synchronizing a tree.

use std::path::PathBuf;

/// What was done (or would be done, in dry-run mode) for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// A destination directory was created.
    CreateDir,
    /// A destination file was created from scratch.
    CreateFile,
    /// A destination file was rewritten by whole-file copy.
    CopyFile,
    /// A destination file was rebuilt from a delta against its previous
    /// content.
    DeltaFile,
    /// A file was left untouched.
    SkipFile,
    /// A directory already existed.
    SkipDir,
}

impl ActionKind {
    /// Whether this action leaves the destination untouched.
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::SkipFile | Self::SkipDir)
    }

    /// Human-readable label, as printed by the CLI reporter.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateDir => "create dir",
            Self::CreateFile => "create file",
            Self::CopyFile => "copy file",
            Self::DeltaFile => "delta file",
            Self::SkipFile => "skip file",
            Self::SkipDir => "skip dir",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One materialized (or planned, in dry-run) synchronization action.
///
/// Handed to the reporter immediately after the action completes; skip
/// actions are only reported in verbose mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    /// What happened.
    pub kind: ActionKind,
    /// Destination path the action applied to.
    pub path: PathBuf,
    /// Source path the action derived from, when there is one.
    pub source: Option<PathBuf>,
    /// Why the entry was skipped, for skips that need explaining.
    pub reason: Option<&'static str>,
}

impl SyncAction {
    /// Action without a skip reason.
    #[must_use]
    pub fn new(kind: ActionKind, path: impl Into<PathBuf>, source: Option<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            source,
            reason: None,
        }
    }
}
