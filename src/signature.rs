//! Block fingerprinting and the weak-checksum index over a basis file.
//!
//! The basis (the existing destination file) is partitioned into fixed-size
//! blocks; each block gets a weak rolling checksum and a strong digest. The
//! index groups signatures by weak value so the encoder can cheaply probe
//! candidate matches while sliding over the source.

use std::io::Read;

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::checksum::RollingChecksum;
use crate::hash::StrongHash;

/// Bytes of basis data fingerprinted per read batch.
const FINGERPRINT_BATCH: usize = 8 * 1024 * 1024;

/// Batches below this size are fingerprinted sequentially; spawning rayon
/// tasks costs more than it saves on tiny inputs.
const PARALLEL_THRESHOLD: usize = 64 * 1024;

/// Fingerprint of a single basis block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSignature {
    /// Rolling checksum of the block.
    pub weak: u32,
    /// Strong digest of the block.
    pub strong: StrongHash,
    /// Ordinal position of the block in the basis file.
    pub index: u64,
    /// Block length; equals the block size except possibly for the final
    /// short block.
    pub length: u32,
}

impl BlockSignature {
    /// Fingerprint one block.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn compute(index: u64, block: &[u8]) -> Self {
        Self {
            weak: RollingChecksum::new(block).digest(),
            strong: StrongHash::compute(block),
            index,
            length: block.len() as u32,
        }
    }
}

/// Index of basis block signatures keyed by weak checksum.
///
/// Candidates within a bucket keep ascending block order, so the first
/// strong-digest match is always the one at the smallest basis offset.
/// Given the same basis content and block size the index is deterministic.
#[derive(Debug)]
pub struct BlockIndex {
    buckets: FxHashMap<u32, Vec<BlockSignature>>,
    block_size: u32,
    basis_len: u64,
    block_count: u64,
    full_blocks: u64,
}

impl BlockIndex {
    /// Estimated in-memory size of an index over `basis_len` bytes with the
    /// given block size. Used to fail fast before building an index that
    /// would blow the memory ceiling.
    #[must_use]
    pub fn estimated_size(basis_len: u64, block_size: u32) -> u64 {
        let blocks = basis_len.div_ceil(u64::from(block_size.max(1)));
        blocks.saturating_mul(std::mem::size_of::<BlockSignature>() as u64)
    }

    /// Build the index by streaming the basis in batches.
    ///
    /// Blocks within a batch are fingerprinted in parallel; the batch buffer
    /// keeps memory bounded regardless of basis size.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading the basis fails.
    pub fn build<R: Read>(mut basis: R, block_size: u32) -> std::io::Result<Self> {
        let block_len = block_size as usize;
        let batch_blocks = (FINGERPRINT_BATCH / block_len).max(1);
        let mut buffer = vec![0u8; batch_blocks * block_len];

        let mut buckets: FxHashMap<u32, Vec<BlockSignature>> = FxHashMap::default();
        let mut basis_len: u64 = 0;
        let mut block_count: u64 = 0;
        let mut full_blocks: u64 = 0;

        loop {
            let filled = fill_buffer(&mut basis, &mut buffer)?;
            if filled == 0 {
                break;
            }

            let batch = &buffer[..filled];
            let base_index = block_count;

            let signatures: Vec<BlockSignature> = if filled > PARALLEL_THRESHOLD {
                batch
                    .par_chunks(block_len)
                    .enumerate()
                    .map(|(i, chunk)| BlockSignature::compute(base_index + i as u64, chunk))
                    .collect()
            } else {
                batch
                    .chunks(block_len)
                    .enumerate()
                    .map(|(i, chunk)| BlockSignature::compute(base_index + i as u64, chunk))
                    .collect()
            };

            for signature in signatures {
                basis_len += u64::from(signature.length);
                block_count += 1;
                if signature.length == block_size {
                    full_blocks += 1;
                }
                buckets.entry(signature.weak).or_default().push(signature);
            }

            if filled < buffer.len() {
                break;
            }
        }

        tracing::debug!(
            basis_len,
            block_count,
            buckets = buckets.len(),
            "built block index"
        );

        Ok(Self {
            buckets,
            block_size,
            basis_len,
            block_count,
            full_blocks,
        })
    }

    /// Find the basis block matching a source window.
    ///
    /// The weak checksum narrows the candidates; a match then requires an
    /// equal strong digest and an equal length. Ties resolve to the
    /// smallest basis offset.
    #[must_use]
    pub fn find_match(&self, weak: u32, window: &[u8]) -> Option<&BlockSignature> {
        let candidates = self.buckets.get(&weak)?;
        let strong = StrongHash::compute(window);

        candidates
            .iter()
            .find(|sig| sig.length as usize == window.len() && sig.strong == strong)
    }

    /// Whether any candidate exists for a weak checksum.
    #[must_use]
    pub fn has_weak_match(&self, weak: u32) -> bool {
        self.buckets.contains_key(&weak)
    }

    /// Basis byte offset of an indexed block.
    #[must_use]
    pub fn offset_of(&self, signature: &BlockSignature) -> u64 {
        signature.index * u64::from(self.block_size)
    }

    /// Block size the index was built with.
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Total length of the indexed basis.
    #[must_use]
    pub const fn basis_len(&self) -> u64 {
        self.basis_len
    }

    /// Number of indexed blocks.
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Whether the index holds at least one full-length block.
    ///
    /// Without one, no source window can ever match (the encoder's window
    /// is always full-length) and the whole source is literal.
    #[must_use]
    pub const fn has_full_blocks(&self) -> bool {
        self.full_blocks > 0
    }

    /// Whether the basis was empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }
}

/// Read until the buffer is full or the reader is exhausted.
fn fill_buffer<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let n = reader.read(&mut buffer[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    proptest! {
        /// Block count is ceiling division and lengths sum to the basis.
        #[test]
        fn partition_invariants(
            data in prop::collection::vec(any::<u8>(), 0..8192),
            block_size in 1u32..512
        ) {
            let index = BlockIndex::build(Cursor::new(&data), block_size).unwrap();
            let expected = (data.len() as u64).div_ceil(u64::from(block_size));
            prop_assert_eq!(index.block_count(), expected);
            prop_assert_eq!(index.basis_len(), data.len() as u64);
        }

        /// Every full-length basis block can be found through the index.
        #[test]
        fn every_block_is_findable(
            data in prop::collection::vec(any::<u8>(), 1..4096),
            block_size in 1u32..256
        ) {
            let index = BlockIndex::build(Cursor::new(&data), block_size).unwrap();
            let size = block_size as usize;

            for (i, chunk) in data.chunks(size).enumerate() {
                let weak = RollingChecksum::new(chunk).digest();
                let found = index.find_match(weak, chunk);
                prop_assert!(found.is_some(), "block {i} not found");
                let found = found.unwrap();
                prop_assert_eq!(found.length as usize, chunk.len());
                // Ties go to the smallest offset, so the found block's
                // offset is at most this block's position.
                prop_assert!(index.offset_of(found) <= (i * size) as u64);
            }
        }
    }
}
