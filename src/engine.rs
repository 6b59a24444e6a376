//! Streaming delta encoder.
//!
//! The encoder slides a block-sized window over the source, probing the
//! basis index with a rolling weak checksum and confirming candidates with
//! the strong digest. Matches become `Copy` instructions; bytes that never
//! participate in a match accumulate in a literal buffer. The source is
//! never fully resident: the window lives in a bounded buffer that is
//! compacted and refilled as the encoder advances, and literals are flushed
//! to the sink once they reach the flush threshold.

use std::io::Read;
use std::path::Path;

use crate::checksum::RollingChecksum;
use crate::delta::{Instruction, InstructionSink};
use crate::error::{Result, SyncError};
use crate::signature::BlockIndex;
use crate::stats::SyncStats;

/// Literal runs are flushed to the sink once they reach this many bytes
/// (or one block size, whichever is larger).
const LITERAL_FLUSH: usize = 1024 * 1024;

/// Granularity of source reads feeding the window buffer.
const IO_CHUNK: usize = 64 * 1024;

/// Encode `source` against an index of the existing destination.
///
/// Instructions are handed to `sink` in source order as they are produced;
/// concatenating their output reconstructs the source exactly. Returns the
/// transfer accounting for the file.
///
/// `source_path` is used for error context only.
///
/// # Errors
///
/// Returns `SourceIo` if reading the source fails, or whatever error the
/// sink reports.
pub fn encode<R: Read, S: InstructionSink>(
    mut source: R,
    source_path: &Path,
    index: &BlockIndex,
    sink: &mut S,
) -> Result<SyncStats> {
    let block_len = index.block_size() as usize;
    let mut stats = SyncStats::default();
    let mut literal = LiteralBuffer::new(block_len.max(LITERAL_FLUSH));

    // Without a single full-length basis block no window can match, so the
    // whole source is literal. Covers the empty and short basis cases.
    if !index.has_full_blocks() {
        let mut chunk = vec![0u8; IO_CHUNK];
        loop {
            let n = source
                .read(&mut chunk)
                .map_err(|e| SyncError::source_io(source_path, e))?;
            if n == 0 {
                break;
            }
            literal.extend(&chunk[..n], sink)?;
            stats.literal_bytes += n as u64;
        }
        literal.flush(sink)?;
        stats.total_bytes = stats.literal_bytes;
        return Ok(stats);
    }

    let mut window = WindowBuf::new(block_len + IO_CHUNK.max(block_len));
    window
        .fill(&mut source)
        .map_err(|e| SyncError::source_io(source_path, e))?;

    if window.available() >= block_len {
        let mut checksum = RollingChecksum::new(window.window(block_len));

        loop {
            let digest = checksum.digest();
            let matched = if index.has_weak_match(digest) {
                index.find_match(digest, window.window(block_len))
            } else {
                None
            };

            if let Some(signature) = matched {
                literal.flush(sink)?;
                sink.emit(Instruction::copy(index.offset_of(signature), signature.length))?;
                stats.matched_bytes += u64::from(signature.length);

                // The window jumps past the matched block; the checksum is
                // re-seeded at the new position, not rolled.
                window.advance(block_len);
                if window.available() < block_len && !window.is_eof() {
                    window
                        .fill(&mut source)
                        .map_err(|e| SyncError::source_io(source_path, e))?;
                }
                if window.available() < block_len {
                    break;
                }
                checksum = RollingChecksum::new(window.window(block_len));
                continue;
            }

            // No match here; we need one byte of lookahead to roll.
            if window.available() == block_len {
                if window.is_eof() {
                    break;
                }
                window
                    .fill(&mut source)
                    .map_err(|e| SyncError::source_io(source_path, e))?;
                if window.available() == block_len {
                    break;
                }
            }

            let outgoing = window.byte(0);
            let incoming = window.byte(block_len);
            literal.push(outgoing, sink)?;
            stats.literal_bytes += 1;
            checksum.roll(outgoing, incoming);
            window.advance(1);
        }
    }

    // Fewer than a block remains (or the last window never matched); it all
    // goes out as trailing literal.
    loop {
        let rest = window.available();
        if rest > 0 {
            literal.extend(window.window(rest), sink)?;
            stats.literal_bytes += rest as u64;
            window.advance(rest);
        }
        if window.is_eof() {
            break;
        }
        window
            .fill(&mut source)
            .map_err(|e| SyncError::source_io(source_path, e))?;
    }
    literal.flush(sink)?;

    stats.total_bytes = stats.matched_bytes + stats.literal_bytes;
    tracing::debug!(
        total = stats.total_bytes,
        matched = stats.matched_bytes,
        literal = stats.literal_bytes,
        "encoded delta"
    );
    Ok(stats)
}

/// Bounded sliding buffer over the source stream.
///
/// The window is always contiguous at `buf[start..]`; `fill` compacts the
/// unconsumed tail to the front and tops the buffer up from the reader.
struct WindowBuf {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
}

impl WindowBuf {
    fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity],
            start: 0,
            end: 0,
            eof: false,
        }
    }

    fn fill<R: Read>(&mut self, reader: &mut R) -> std::io::Result<()> {
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        while !self.eof && self.end < self.buf.len() {
            let n = reader.read(&mut self.buf[self.end..])?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.end += n;
        }
        Ok(())
    }

    fn available(&self) -> usize {
        self.end - self.start
    }

    fn window(&self, len: usize) -> &[u8] {
        &self.buf[self.start..self.start + len]
    }

    fn byte(&self, offset: usize) -> u8 {
        self.buf[self.start + offset]
    }

    fn advance(&mut self, n: usize) {
        self.start += n;
    }

    const fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Accumulates unmatched bytes and emits them as `Literal` instructions.
struct LiteralBuffer {
    bytes: Vec<u8>,
    limit: usize,
}

impl LiteralBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    fn push<S: InstructionSink>(&mut self, byte: u8, sink: &mut S) -> Result<()> {
        self.bytes.push(byte);
        if self.bytes.len() >= self.limit {
            self.flush(sink)?;
        }
        Ok(())
    }

    fn extend<S: InstructionSink>(&mut self, data: &[u8], sink: &mut S) -> Result<()> {
        for chunk in data.chunks(self.limit) {
            self.bytes.extend_from_slice(chunk);
            if self.bytes.len() >= self.limit {
                self.flush(sink)?;
            }
        }
        Ok(())
    }

    fn flush<S: InstructionSink>(&mut self, sink: &mut S) -> Result<()> {
        if !self.bytes.is_empty() {
            sink.emit(Instruction::Literal(std::mem::take(&mut self.bytes)))?;
        }
        Ok(())
    }
}
