//! Strong digest used to confirm candidate block matches.
//!
//! BLAKE3 confirms matches that the rolling checksum merely suggests.
//! Digest equality is treated as byte equality; there is no second
//! byte-by-byte verification. One digest algorithm is used for an entire
//! run, never mixed.

use std::io::Read;

/// 256-bit BLAKE3 digest of a block.
///
/// # Example
///
/// ```rust
/// use treesync::StrongHash;
///
/// let one = StrongHash::compute(b"hello world");
/// let two = StrongHash::compute(b"hello world");
/// assert_eq!(one, two);
/// assert_ne!(one, StrongHash::compute(b"different"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrongHash([u8; 32]);

impl StrongHash {
    /// Digest a block held in memory.
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest a stream without loading it into memory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading fails.
    pub fn compute_streaming<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = [0u8; 8192];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self(*hasher.finalize().as_bytes()))
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// All-zero digest, distinct from any real BLAKE3 output.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }
}

impl std::fmt::Debug for StrongHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "StrongHash({:016x}...)",
            u64::from_be_bytes(self.0[..8].try_into().unwrap_or([0u8; 8]))
        )
    }
}

impl std::fmt::Display for StrongHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl AsRef<[u8]> for StrongHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
