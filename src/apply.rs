//! Instruction applier: materializes a reconstruction script.
//!
//! The applier consumes instructions as the encoder produces them and
//! writes the reconstructed file. `Copy` instructions read from the basis
//! at arbitrary offsets, so the basis handle must be seekable; the output
//! is written strictly sequentially.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::delta::{Instruction, InstructionSink};
use crate::error::{Result, SyncError};

/// Chunk size for copying basis ranges through a fixed buffer.
const COPY_CHUNK: usize = 64 * 1024;

/// Writes a reconstruction script against a basis file.
///
/// Implements [`InstructionSink`], so it can be plugged directly under the
/// encoder to stream instructions into the output without collecting them.
pub struct Applier<R: Read + Seek, W: Write> {
    basis: R,
    basis_len: u64,
    out: W,
    destination: PathBuf,
    written: u64,
    buf: Vec<u8>,
}

impl<R: Read + Seek, W: Write> Applier<R, W> {
    /// Create an applier over `basis` writing to `out`.
    ///
    /// `basis_len` bounds `Copy` instructions; `destination` is used for
    /// error context only.
    pub fn new(basis: R, basis_len: u64, out: W, destination: &Path) -> Self {
        Self {
            basis,
            basis_len,
            out,
            destination: destination.to_path_buf(),
            written: 0,
            buf: vec![0u8; COPY_CHUNK],
        }
    }

    /// Bytes written to the output so far.
    #[must_use]
    pub const fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Flush the output and verify the reconstructed length.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the stream did not reconstruct exactly
    /// `expected_len` bytes, or `DestinationIo` if the flush fails.
    pub fn finish(mut self, expected_len: u64) -> Result<()> {
        self.out
            .flush()
            .map_err(|e| SyncError::dest_io(&self.destination, e))?;
        if self.written != expected_len {
            return Err(SyncError::Internal(format!(
                "instruction stream for {} reconstructed {} bytes, expected {}",
                self.destination.display(),
                self.written,
                expected_len
            )));
        }
        Ok(())
    }

    fn apply_copy(&mut self, offset: u64, len: u32) -> Result<()> {
        let end = offset.saturating_add(u64::from(len));
        if end > self.basis_len {
            return Err(SyncError::Internal(format!(
                "copy range {offset}..{end} exceeds basis length {} for {}",
                self.basis_len,
                self.destination.display()
            )));
        }

        self.basis
            .seek(SeekFrom::Start(offset))
            .map_err(|e| SyncError::dest_io(&self.destination, e))?;

        let mut remaining = len as usize;
        while remaining > 0 {
            let take = remaining.min(self.buf.len());
            self.basis
                .read_exact(&mut self.buf[..take])
                .map_err(|e| SyncError::dest_io(&self.destination, e))?;
            self.out
                .write_all(&self.buf[..take])
                .map_err(|e| SyncError::dest_io(&self.destination, e))?;
            remaining -= take;
        }

        self.written += u64::from(len);
        Ok(())
    }

    fn apply_literal(&mut self, bytes: &[u8]) -> Result<()> {
        self.out
            .write_all(bytes)
            .map_err(|e| SyncError::dest_io(&self.destination, e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}

impl<R: Read + Seek, W: Write> InstructionSink for Applier<R, W> {
    fn emit(&mut self, instruction: Instruction) -> Result<()> {
        match instruction {
            Instruction::Copy { offset, len } => self.apply_copy(offset, len),
            Instruction::Literal(bytes) => self.apply_literal(&bytes),
        }
    }
}

/// Apply a collected instruction stream to a basis, writing to `out`.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// Returns `Internal` for copy ranges outside the basis, or `DestinationIo`
/// for I/O failures.
pub fn apply<R: Read + Seek, W: Write>(
    basis: R,
    basis_len: u64,
    instructions: &[Instruction],
    out: W,
    destination: &Path,
) -> Result<u64> {
    let mut applier = Applier::new(basis, basis_len, out, destination);
    for instruction in instructions {
        applier.emit(instruction.clone())?;
    }
    let written = applier.bytes_written();
    applier.finish(written)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn apply_ops(basis: &[u8], ops: &[Instruction]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        apply(
            Cursor::new(basis),
            basis.len() as u64,
            ops,
            &mut out,
            Path::new("dest"),
        )?;
        Ok(out)
    }

    #[test]
    fn empty_stream_writes_nothing() {
        let out = apply_ops(b"basis", &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn literal_only() {
        let out = apply_ops(b"", &[Instruction::literal(b"fresh content")]).unwrap();
        assert_eq!(out, b"fresh content");
    }

    #[test]
    fn copy_only() {
        let out = apply_ops(b"0123456789", &[Instruction::copy(2, 5)]).unwrap();
        assert_eq!(out, b"23456");
    }

    #[test]
    fn interleaved_instructions_preserve_order() {
        let out = apply_ops(
            b"0123456789",
            &[
                Instruction::literal(b">>"),
                Instruction::copy(0, 3),
                Instruction::literal(b"--"),
                Instruction::copy(7, 3),
            ],
        )
        .unwrap();
        assert_eq!(out, b">>012--789");
    }

    #[test]
    fn copies_tolerate_backwards_seeks() {
        let out = apply_ops(
            b"abcdef",
            &[
                Instruction::copy(4, 2),
                Instruction::copy(0, 2),
                Instruction::copy(2, 2),
            ],
        )
        .unwrap();
        assert_eq!(out, b"efabcd");
    }

    #[test]
    fn copy_past_basis_end_is_rejected() {
        let err = apply_ops(b"short", &[Instruction::copy(3, 10)]).unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }

    #[test]
    fn copy_offset_overflow_is_rejected() {
        let err = apply_ops(b"short", &[Instruction::copy(u64::MAX, 10)]).unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }

    #[test]
    fn copy_larger_than_chunk_buffer() {
        let basis = vec![5u8; 200_000];
        let out = apply_ops(&basis, &[Instruction::copy(0, 200_000)]).unwrap();
        assert_eq!(out, basis);
    }

    #[test]
    fn finish_rejects_length_mismatch() {
        let mut out = Vec::new();
        let mut applier = Applier::new(Cursor::new(b"basis"), 5, &mut out, Path::new("dest"));
        applier.emit(Instruction::literal(b"abc")).unwrap();

        let err = applier.finish(4).unwrap_err();
        assert!(matches!(err, SyncError::Internal(_)));
    }

    #[test]
    fn finish_accepts_exact_length() {
        let mut out = Vec::new();
        let mut applier = Applier::new(Cursor::new(b"basis"), 5, &mut out, Path::new("dest"));
        applier.emit(Instruction::copy(0, 5)).unwrap();
        applier.finish(5).unwrap();
        assert_eq!(out, b"basis");
    }

    #[test]
    fn bytes_written_tracks_output() {
        let mut out = Vec::new();
        let mut applier = Applier::new(Cursor::new(b"0123456789"), 10, &mut out, Path::new("d"));
        applier.emit(Instruction::copy(0, 4)).unwrap();
        applier.emit(Instruction::literal(b"xy")).unwrap();
        assert_eq!(applier.bytes_written(), 6);
    }
}
