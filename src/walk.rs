//! Deterministic traversal and classification of the source tree.
//!
//! The planner walks the source depth-first with entries sorted per
//! directory, compares each entry against the destination, and yields a
//! stream of planned actions: parents before children, siblings in
//! lexicographic order, identical across runs for identical trees.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::error::{Result, SyncError};

/// Classification of one source entry against the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlannedKind {
    /// Destination directory is missing and must be created.
    CreateDir,
    /// Destination directory already exists.
    SkipDir,
    /// Destination file is missing; created by wholesale copy.
    CreateFile,
    /// Destination file exists but differs; updated per the configured
    /// strategy.
    UpdateFile,
    /// Destination file agrees on size and mtime; left untouched.
    SkipFile,
}

/// One entry's worth of planned work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlannedAction {
    pub kind: PlannedKind,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub reason: Option<&'static str>,
}

impl PlannedAction {
    fn new(kind: PlannedKind, source: PathBuf, destination: PathBuf) -> Self {
        Self {
            kind,
            source,
            destination,
            reason: None,
        }
    }
}

/// Depth-first planner over the source tree.
///
/// Symlinks are followed and treated as their referents; directory symlink
/// cycles are broken with a set of canonicalized visited directories.
pub(crate) struct Planner {
    pending_root: Option<(PathBuf, PathBuf)>,
    stack: Vec<DirState>,
    visited: HashSet<PathBuf>,
    finished: bool,
}

impl Planner {
    /// Plan synchronizing `source` into `destination`.
    ///
    /// The caller has already validated that `source` is a directory and
    /// that `destination`, if present, is one too.
    pub(crate) fn new(source: &Path, destination: &Path) -> Self {
        Self {
            pending_root: Some((source.to_path_buf(), destination.to_path_buf())),
            stack: Vec::new(),
            visited: HashSet::new(),
            finished: false,
        }
    }

    fn enter_directory(&mut self, source: PathBuf, destination: PathBuf) -> Result<()> {
        let canonical =
            fs::canonicalize(&source).map_err(|e| SyncError::source_io(&source, e))?;
        if !self.visited.insert(canonical) {
            tracing::debug!(source = %source.display(), "directory already visited, not recursing");
            return Ok(());
        }
        self.stack.push(DirState::new(source, destination)?);
        Ok(())
    }

    fn plan_root(&mut self, source: PathBuf, destination: PathBuf) -> Result<PlannedAction> {
        let kind = classify_dir(&destination)?;
        let action = PlannedAction::new(kind, source.clone(), destination.clone());
        self.enter_directory(source, destination)?;
        Ok(action)
    }

    fn plan_entry(&mut self, source: PathBuf, destination: PathBuf) -> Result<PlannedAction> {
        // Follows symlinks, so a link is classified as its referent.
        let metadata =
            fs::metadata(&source).map_err(|e| SyncError::source_io(&source, e))?;

        if metadata.is_dir() {
            let kind = classify_dir(&destination)?;
            let action = PlannedAction::new(kind, source.clone(), destination.clone());
            self.enter_directory(source, destination)?;
            return Ok(action);
        }

        if metadata.is_file() {
            let kind = classify_file(&metadata, &destination)?;
            return Ok(PlannedAction::new(kind, source, destination));
        }

        // Fifos, sockets, devices.
        let mut action = PlannedAction::new(PlannedKind::SkipFile, source, destination);
        action.reason = Some("unsupported");
        Ok(action)
    }
}

impl Iterator for Planner {
    type Item = Result<PlannedAction>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Some((source, destination)) = self.pending_root.take() {
            return match self.plan_root(source, destination) {
                Ok(action) => Some(Ok(action)),
                Err(error) => {
                    self.finished = true;
                    Some(Err(error))
                }
            };
        }

        loop {
            let (source, destination) = {
                let state = self.stack.last_mut()?;
                if let Some(name) = state.next_name() {
                    (state.source.join(&name), state.destination.join(&name))
                } else {
                    self.stack.pop();
                    continue;
                }
            };

            return match self.plan_entry(source, destination) {
                Ok(action) => Some(Ok(action)),
                Err(error) => {
                    self.finished = true;
                    Some(Err(error))
                }
            };
        }
    }
}

/// One directory being traversed: its entries, sorted, and a cursor.
struct DirState {
    source: PathBuf,
    destination: PathBuf,
    entries: Vec<OsString>,
    index: usize,
}

impl DirState {
    fn new(source: PathBuf, destination: PathBuf) -> Result<Self> {
        let mut entries = Vec::new();
        let read_dir = fs::read_dir(&source).map_err(|e| SyncError::source_io(&source, e))?;
        for entry in read_dir {
            let entry = entry.map_err(|e| SyncError::source_io(&source, e))?;
            entries.push(entry.file_name());
        }
        entries.sort();

        Ok(Self {
            source,
            destination,
            entries,
            index: 0,
        })
    }

    fn next_name(&mut self) -> Option<OsString> {
        let name = self.entries.get(self.index)?.clone();
        self.index += 1;
        Some(name)
    }
}

fn classify_dir(destination: &Path) -> Result<PlannedKind> {
    match fs::metadata(destination) {
        Ok(meta) if meta.is_dir() => Ok(PlannedKind::SkipDir),
        Ok(_) => Err(SyncError::strategy(
            destination,
            "a non-directory exists where a directory is required",
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PlannedKind::CreateDir),
        Err(e) => Err(SyncError::dest_io(destination, e)),
    }
}

fn classify_file(source_meta: &fs::Metadata, destination: &Path) -> Result<PlannedKind> {
    match fs::metadata(destination) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PlannedKind::CreateFile),
        Err(e) => Err(SyncError::dest_io(destination, e)),
        Ok(dest_meta) => {
            if !dest_meta.is_file() {
                // A directory or special file in the way; the strategy will
                // surface the conflict when it tries to replace it.
                return Ok(PlannedKind::UpdateFile);
            }
            if source_meta.len() == dest_meta.len()
                && mtime_seconds(source_meta) == mtime_seconds(&dest_meta)
            {
                Ok(PlannedKind::SkipFile)
            } else {
                Ok(PlannedKind::UpdateFile)
            }
        }
    }
}

/// Modification time truncated to whole seconds, the comparison resolution.
fn mtime_seconds(meta: &fs::Metadata) -> i64 {
    FileTime::from_last_modification_time(meta).unix_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    fn write_file(path: &Path, contents: &[u8]) {
        File::create(path).unwrap().write_all(contents).unwrap();
    }

    fn plan(source: &Path, destination: &Path) -> Vec<PlannedAction> {
        Planner::new(source, destination)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn empty_source_plans_only_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, PlannedKind::CreateDir);
        assert_eq!(actions[0].destination, dst);
    }

    #[test]
    fn existing_root_is_a_skip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions[0].kind, PlannedKind::SkipDir);
    }

    #[test]
    fn parents_before_children_siblings_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("sub")).unwrap();
        write_file(&src.join("a"), b"a");
        write_file(&src.join("sub/b"), b"b");

        let actions = plan(&src, &dst);
        let kinds_and_paths: Vec<_> = actions
            .iter()
            .map(|a| (a.kind, a.destination.clone()))
            .collect();

        assert_eq!(
            kinds_and_paths,
            vec![
                (PlannedKind::CreateDir, dst.clone()),
                (PlannedKind::CreateFile, dst.join("a")),
                (PlannedKind::CreateDir, dst.join("sub")),
                (PlannedKind::CreateFile, dst.join("sub/b")),
            ]
        );
    }

    #[test]
    fn sibling_order_is_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        for name in ["zeta", "alpha", "midway"] {
            write_file(&src.join(name), b"x");
        }

        let actions = plan(&src, &dst);
        let names: Vec<_> = actions[1..]
            .iter()
            .map(|a| a.source.file_name().unwrap().to_os_string())
            .collect();
        assert_eq!(names, vec!["alpha", "midway", "zeta"]);
    }

    #[test]
    fn matching_size_and_mtime_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&src.join("f"), b"same");
        write_file(&dst.join("f"), b"same");

        let stamp = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(src.join("f"), stamp).unwrap();
        filetime::set_file_mtime(dst.join("f"), stamp).unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions[1].kind, PlannedKind::SkipFile);
    }

    #[test]
    fn subsecond_mtime_difference_still_skips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&src.join("f"), b"same");
        write_file(&dst.join("f"), b"same");

        filetime::set_file_mtime(src.join("f"), FileTime::from_unix_time(1_700_000_000, 1)).unwrap();
        filetime::set_file_mtime(
            dst.join("f"),
            FileTime::from_unix_time(1_700_000_000, 999_000_000),
        )
        .unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions[1].kind, PlannedKind::SkipFile);
    }

    #[test]
    fn size_mismatch_plans_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&src.join("f"), b"longer contents");
        write_file(&dst.join("f"), b"short");

        let stamp = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(src.join("f"), stamp).unwrap();
        filetime::set_file_mtime(dst.join("f"), stamp).unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions[1].kind, PlannedKind::UpdateFile);
    }

    #[test]
    fn mtime_mismatch_plans_an_update() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&src.join("f"), b"same");
        write_file(&dst.join("f"), b"same");

        filetime::set_file_mtime(src.join("f"), FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        filetime::set_file_mtime(dst.join("f"), FileTime::from_unix_time(1_700_000_005, 0)).unwrap();

        let actions = plan(&src, &dst);
        assert_eq!(actions[1].kind, PlannedKind::UpdateFile);
    }

    #[test]
    fn missing_destination_file_is_a_create() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&src.join("f"), b"new");

        let actions = plan(&src, &dst);
        assert_eq!(actions[1].kind, PlannedKind::CreateFile);
    }

    #[test]
    fn file_in_place_of_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::create_dir(&dst).unwrap();
        write_file(&dst.join("sub"), b"in the way");

        let result: Result<Vec<_>> = Planner::new(&src, &dst).collect();
        assert!(matches!(result.unwrap_err(), SyncError::Strategy { .. }));
    }

    #[test]
    fn deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("d1")).unwrap();
        fs::create_dir_all(src.join("d2")).unwrap();
        write_file(&src.join("d1/x"), b"x");
        write_file(&src.join("d2/y"), b"y");
        write_file(&src.join("top"), b"t");

        assert_eq!(plan(&src, &dst), plan(&src, &dst));
    }

    #[cfg(unix)]
    #[test]
    fn file_symlink_is_followed_as_its_referent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        write_file(&src.join("real"), b"pointed at");
        std::os::unix::fs::symlink(src.join("real"), src.join("link")).unwrap();

        let actions = plan(&src, &dst);
        let link_action = actions
            .iter()
            .find(|a| a.source.file_name().unwrap() == "link")
            .unwrap();
        assert_eq!(link_action.kind, PlannedKind::CreateFile);
    }

    #[cfg(unix)]
    #[test]
    fn directory_symlink_cycle_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(src.join("sub")).unwrap();
        std::os::unix::fs::symlink(&src, src.join("sub/loop")).unwrap();

        // Must terminate; the cycle directory is planned once and not
        // recursed into again.
        let actions = plan(&src, &dst);
        assert!(actions.len() >= 3);
    }

    #[cfg(unix)]
    #[test]
    fn special_files_are_skipped_as_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir(&src).unwrap();
        std::os::unix::net::UnixListener::bind(src.join("socket")).unwrap();

        let actions = plan(&src, &dst);
        let socket_action = actions
            .iter()
            .find(|a| a.source.file_name().unwrap() == "socket")
            .unwrap();
        assert_eq!(socket_action.kind, PlannedKind::SkipFile);
        assert_eq!(socket_action.reason, Some("unsupported"));
    }
}
