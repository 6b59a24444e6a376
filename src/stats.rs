//! Per-file transfer accounting for the delta strategy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Transfer accounting for one synchronized file.
///
/// Invariant: `matched_bytes + literal_bytes == total_bytes`. Instruction
/// overhead is excluded from the accounting, so the transferred figure is
/// exactly the literal byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    /// Size of the source file.
    pub total_bytes: u64,
    /// Bytes that had to be taken from the source.
    pub literal_bytes: u64,
    /// Bytes reused from blocks of the previous destination copy.
    pub matched_bytes: u64,
}

impl SyncStats {
    /// Accounting for a whole-file transfer with nothing reused.
    #[must_use]
    pub const fn whole_copy(size: u64) -> Self {
        Self {
            total_bytes: size,
            literal_bytes: size,
            matched_bytes: 0,
        }
    }

    /// Accounting for a file whose content was fully reused.
    #[must_use]
    pub const fn fully_matched(size: u64) -> Self {
        Self {
            total_bytes: size,
            literal_bytes: 0,
            matched_bytes: size,
        }
    }

    /// Bytes that actually moved from source to destination.
    #[must_use]
    pub const fn bytes_transferred(&self) -> u64 {
        self.literal_bytes
    }

    /// Bytes that did not need to move.
    #[must_use]
    pub const fn bytes_saved(&self) -> u64 {
        self.matched_bytes
    }
}

/// Per-destination-path stats, owned by a delta strategy for one run.
///
/// Append-only while a run is in progress; callers obtain snapshots, never
/// live views. The ordered map keeps reporting deterministic.
#[derive(Debug, Default)]
pub struct StatsRegistry {
    entries: BTreeMap<PathBuf, SyncStats>,
}

impl StatsRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the accounting for one destination path.
    pub fn record(&mut self, destination: impl Into<PathBuf>, stats: SyncStats) {
        self.entries.insert(destination.into(), stats);
    }

    /// Stats for one destination path, if it was processed.
    #[must_use]
    pub fn get_for(&self, destination: &Path) -> Option<SyncStats> {
        self.entries.get(destination).copied()
    }

    /// Snapshot of all recorded stats.
    #[must_use]
    pub fn all(&self) -> BTreeMap<PathBuf, SyncStats> {
        self.entries.clone()
    }

    /// Whether anything was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_copy_accounting() {
        let stats = SyncStats::whole_copy(1000);
        assert_eq!(stats.total_bytes, 1000);
        assert_eq!(stats.bytes_transferred(), 1000);
        assert_eq!(stats.bytes_saved(), 0);
        assert_eq!(stats.matched_bytes + stats.literal_bytes, stats.total_bytes);
    }

    #[test]
    fn fully_matched_accounting() {
        let stats = SyncStats::fully_matched(1000);
        assert_eq!(stats.bytes_transferred(), 0);
        assert_eq!(stats.bytes_saved(), 1000);
        assert_eq!(stats.matched_bytes + stats.literal_bytes, stats.total_bytes);
    }

    #[test]
    fn registry_round_trip() {
        let mut registry = StatsRegistry::new();
        assert!(registry.is_empty());

        registry.record("/dst/a", SyncStats::whole_copy(10));
        registry.record("/dst/b", SyncStats::fully_matched(20));

        assert_eq!(
            registry.get_for(Path::new("/dst/a")),
            Some(SyncStats::whole_copy(10))
        );
        assert_eq!(registry.get_for(Path::new("/dst/missing")), None);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn snapshot_is_detached() {
        let mut registry = StatsRegistry::new();
        registry.record("/dst/a", SyncStats::whole_copy(10));
        let snapshot = registry.all();

        registry.record("/dst/b", SyncStats::whole_copy(5));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn snapshot_iterates_in_path_order() {
        let mut registry = StatsRegistry::new();
        registry.record("/dst/b", SyncStats::default());
        registry.record("/dst/a", SyncStats::default());

        let paths: Vec<_> = registry.all().into_keys().collect();
        assert_eq!(paths, vec![PathBuf::from("/dst/a"), PathBuf::from("/dst/b")]);
    }
}
