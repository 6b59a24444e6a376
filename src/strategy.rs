//! File synchronization strategies.
//!
//! A strategy decides how to bring one destination file into agreement with
//! its source: [`CopyStrategy`] transfers the whole file, [`DeltaStrategy`]
//! reuses blocks already present in the previous destination copy. Both
//! write through a temporary file in the destination's directory that
//! atomically replaces the target, so a failure never leaves a half-written
//! destination behind.

use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use tempfile::NamedTempFile;

use crate::action::ActionKind;
use crate::apply::Applier;
use crate::engine::encode;
use crate::error::{Result, SyncError};
use crate::hash::StrongHash;
use crate::signature::BlockIndex;
use crate::stats::{StatsRegistry, SyncStats};

/// Default delta block size: 64 KiB.
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;

/// Largest accepted delta block size: 1 GiB.
pub const MAX_BLOCK_SIZE: u32 = 1 << 30;

/// Default ceiling on the in-memory size of a basis block index: 256 MiB.
pub const DEFAULT_MAX_INDEX_BYTES: u64 = 256 * 1024 * 1024;

/// Capability for updating an individual destination file.
pub trait FileSyncStrategy {
    /// Bring `destination` into byte-for-byte agreement with `source`.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O or strategy failure; the run aborts.
    fn sync_file(&mut self, source: &Path, destination: &Path) -> Result<()>;

    /// Action kind reported when this strategy updates an existing file.
    fn update_action(&self) -> ActionKind;
}

/// Strategy that mirrors files via whole-file copies.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyStrategy;

impl CopyStrategy {
    /// New copy strategy.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FileSyncStrategy for CopyStrategy {
    fn sync_file(&mut self, source: &Path, destination: &Path) -> Result<()> {
        copy_file(source, destination)?;
        Ok(())
    }

    fn update_action(&self) -> ActionKind {
        ActionKind::CopyFile
    }
}

/// Strategy that transfers only changed blocks.
///
/// Owns the per-run [`SyncStats`] registry; a new strategy starts with an
/// empty one.
#[derive(Debug)]
pub struct DeltaStrategy {
    block_size: u32,
    max_index_bytes: u64,
    registry: StatsRegistry,
}

impl DeltaStrategy {
    /// New delta strategy with the given block size.
    ///
    /// # Errors
    ///
    /// Returns an `Argument` error when the block size is zero or exceeds
    /// [`MAX_BLOCK_SIZE`].
    pub fn new(block_size: u32) -> Result<Self> {
        validate_block_size(block_size)?;
        Ok(Self {
            block_size,
            max_index_bytes: DEFAULT_MAX_INDEX_BYTES,
            registry: StatsRegistry::new(),
        })
    }

    /// Override the block-index memory ceiling.
    #[must_use]
    pub const fn with_max_index_bytes(mut self, bytes: u64) -> Self {
        self.max_index_bytes = bytes;
        self
    }

    /// Configured block size.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Snapshot of all recorded per-file stats.
    #[must_use]
    pub fn stats(&self) -> std::collections::BTreeMap<PathBuf, SyncStats> {
        self.registry.all()
    }

    /// Stats for one destination path, if it was processed.
    #[must_use]
    pub fn get_stats_for(&self, destination: &Path) -> Option<SyncStats> {
        self.registry.get_for(destination)
    }

    /// Rebuild `destination` from its own blocks plus literals from
    /// `source`, through a temp file that atomically replaces the target.
    fn delta_file(
        &self,
        source: &Path,
        destination: &Path,
        basis_len: u64,
        source_len: u64,
    ) -> Result<SyncStats> {
        let estimated = BlockIndex::estimated_size(basis_len, self.block_size);
        if estimated > self.max_index_bytes {
            return Err(SyncError::strategy(
                destination,
                format!(
                    "block index would need {estimated} bytes, exceeding the {} byte ceiling; \
                     use a larger block size",
                    self.max_index_bytes
                ),
            ));
        }

        let basis_reader = File::open(destination)
            .map(BufReader::new)
            .map_err(|e| SyncError::dest_io(destination, e))?;
        let index = BlockIndex::build(basis_reader, self.block_size)
            .map_err(|e| SyncError::dest_io(destination, e))?;

        let source_file = File::open(source)
            .map(BufReader::new)
            .map_err(|e| SyncError::source_io(source, e))?;

        let mut tmp = temp_file_beside(destination)?;
        // A second basis handle: the applier seeks it freely while the
        // index above was built from a sequential read.
        let basis = File::open(destination).map_err(|e| SyncError::dest_io(destination, e))?;
        let mut applier = Applier::new(basis, basis_len, tmp.as_file_mut(), destination);
        let stats = encode(source_file, source, &index, &mut applier)?;
        applier.finish(source_len)?;

        persist_temp(tmp, destination)?;
        copy_metadata(source, destination)?;
        tracing::debug!(
            destination = %destination.display(),
            matched = stats.matched_bytes,
            literal = stats.literal_bytes,
            "applied delta"
        );
        Ok(stats)
    }
}

impl FileSyncStrategy for DeltaStrategy {
    fn sync_file(&mut self, source: &Path, destination: &Path) -> Result<()> {
        // A delta needs an existing basis; fresh files are copied wholesale.
        let basis_len = match fs::metadata(destination) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let size = copy_file(source, destination)?;
                self.registry.record(destination, SyncStats::whole_copy(size));
                return Ok(());
            }
            Err(e) => return Err(SyncError::dest_io(destination, e)),
        };

        let source_len = fs::metadata(source)
            .map_err(|e| SyncError::source_io(source, e))?
            .len();

        if source_len == 0 {
            let tmp = temp_file_beside(destination)?;
            persist_temp(tmp, destination)?;
            copy_metadata(source, destination)?;
            self.registry.record(destination, SyncStats::default());
            return Ok(());
        }

        // Identical content needs no rewrite, only a metadata refresh.
        if source_len == basis_len && files_identical(source, destination)? {
            copy_metadata(source, destination)?;
            self.registry
                .record(destination, SyncStats::fully_matched(source_len));
            return Ok(());
        }

        let stats = self.delta_file(source, destination, basis_len, source_len)?;
        self.registry.record(destination, stats);
        Ok(())
    }

    fn update_action(&self) -> ActionKind {
        ActionKind::DeltaFile
    }
}

/// Validate a delta block size against the accepted range.
pub(crate) fn validate_block_size(block_size: u32) -> Result<()> {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return Err(SyncError::Argument(format!(
            "block size must be between 1 and {MAX_BLOCK_SIZE}, got {block_size}"
        )));
    }
    Ok(())
}

/// Copy `source` to `destination` byte for byte through a temp file, then
/// replicate mode bits and mtime. Returns the number of bytes copied.
pub(crate) fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    let mut reader = File::open(source)
        .map(BufReader::new)
        .map_err(|e| SyncError::source_io(source, e))?;

    let mut tmp = temp_file_beside(destination)?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut copied: u64 = 0;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| SyncError::source_io(source, e))?;
        if n == 0 {
            break;
        }
        tmp.as_file_mut()
            .write_all(&buf[..n])
            .map_err(|e| SyncError::dest_io(destination, e))?;
        copied += n as u64;
    }

    persist_temp(tmp, destination)?;
    copy_metadata(source, destination)?;
    Ok(copied)
}

/// Create a uniquely named temp file next to the destination, so the final
/// rename stays within one filesystem.
fn temp_file_beside(destination: &Path) -> Result<NamedTempFile> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    NamedTempFile::new_in(parent).map_err(|e| SyncError::dest_io(destination, e))
}

/// Fsync the temp file and atomically rename it over the destination.
fn persist_temp(tmp: NamedTempFile, destination: &Path) -> Result<()> {
    tmp.as_file()
        .sync_all()
        .map_err(|e| SyncError::dest_io(destination, e))?;
    tmp.persist(destination)
        .map_err(|e| SyncError::dest_io(destination, e.error))?;
    Ok(())
}

/// Replicate mode bits and mtime from `source` onto `destination`.
pub(crate) fn copy_metadata(source: &Path, destination: &Path) -> Result<()> {
    let meta = fs::metadata(source).map_err(|e| SyncError::source_io(source, e))?;
    fs::set_permissions(destination, meta.permissions())
        .map_err(|e| SyncError::dest_io(destination, e))?;
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(destination, mtime)
        .map_err(|e| SyncError::dest_io(destination, e))?;
    Ok(())
}

/// Whether two files hold identical bytes, judged by streaming strong
/// digests.
fn files_identical(source: &Path, destination: &Path) -> Result<bool> {
    let mut src = File::open(source)
        .map(BufReader::new)
        .map_err(|e| SyncError::source_io(source, e))?;
    let mut dst = File::open(destination)
        .map(BufReader::new)
        .map_err(|e| SyncError::dest_io(destination, e))?;

    let src_hash =
        StrongHash::compute_streaming(&mut src).map_err(|e| SyncError::source_io(source, e))?;
    let dst_hash = StrongHash::compute_streaming(&mut dst)
        .map_err(|e| SyncError::dest_io(destination, e))?;
    Ok(src_hash == dst_hash)
}
