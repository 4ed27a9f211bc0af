//! The sparse index mapping uncompressed offsets to the compressed frame that contains them.
//!
//! A [`JumpTable`] is built either eagerly, by parsing a Zstandard seekable-format footer
//! ([`parse_seekable_footer`]), or lazily, by walking frame headers one at a time
//! ([`scan`]). Both paths converge on the same record layout, so a [`super::Context`] does not
//! need to know which one produced its table.

use alloc::vec;
use alloc::vec::Vec;

use zstd_safe::zstd_sys::ZSTD_MAGIC_SKIPPABLE_START;

use crate::{
    SEEKABLE_MAGIC_NUMBER, SEEKABLE_MAX_FRAMES, SEEK_TABLE_FOOTER_SIZE, SKIPPABLE_HEADER_SIZE,
    error::{Error, Result},
    frame,
};

const SKIPPABLE_MAGIC_NUMBER: u32 = ZSTD_MAGIC_SKIPPABLE_START | 0xE;

fn read_le32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// A single boundary between frames: `compressed_pos` is the byte offset of the frame's first
/// byte, `uncompressed_pos` is the logical offset of its first decompressed byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpTableRecord {
    pub(crate) compressed_pos: u64,
    pub(crate) uncompressed_pos: u64,
}

impl JumpTableRecord {
    /// Creates a record directly, for manual jump table construction.
    pub fn new(compressed_pos: u64, uncompressed_pos: u64) -> Self {
        Self {
            compressed_pos,
            uncompressed_pos,
        }
    }

    /// The byte offset of this frame's first byte in the compressed stream.
    pub fn compressed_pos(&self) -> u64 {
        self.compressed_pos
    }

    /// The logical offset of this frame's first decompressed byte.
    pub fn uncompressed_pos(&self) -> u64 {
        self.uncompressed_pos
    }
}

/// A transient position derived from a logical offset: which record to start decoding from, and
/// how many decoded bytes to discard before the requested offset is reached.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JumpCoordinate {
    pub(crate) compressed_offset: u64,
    pub(crate) uncompressed_offset: u64,
    pub(crate) record_index: usize,
}

/// The sparse, ordered index of frame boundaries for one compressed stream.
#[derive(Debug, Clone, Default)]
pub struct JumpTable {
    records: Vec<JumpTableRecord>,
    fully_initialized: bool,
}

impl JumpTable {
    /// Creates an empty jump table. Until frames are discovered, [`Self::is_fully_initialized`]
    /// is `false`.
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            fully_initialized: false,
        }
    }

    /// Builds a jump table from caller-supplied records, bypassing footer parsing and scanning
    /// entirely. The caller is responsible for the records being correctly ordered and for the
    /// last record being the sentinel.
    pub fn from_records(records: Vec<JumpTableRecord>) -> Self {
        Self {
            records,
            fully_initialized: true,
        }
    }

    pub(crate) fn append(&mut self, compressed_pos: u64, uncompressed_pos: u64) {
        self.records.push(JumpTableRecord {
            compressed_pos,
            uncompressed_pos,
        });
    }

    /// Marks the table as holding every frame boundary in the stream, without appending a
    /// record. Used when the read engine itself discovers end-of-stream incrementally.
    pub(crate) fn mark_fully_initialized(&mut self) {
        self.fully_initialized = true;
    }

    /// Whether every frame in the stream has been discovered and a sentinel record appended.
    pub fn is_fully_initialized(&self) -> bool {
        self.fully_initialized
    }

    /// All records discovered so far, in ascending order.
    pub fn records(&self) -> &[JumpTableRecord] {
        &self.records
    }

    /// The uncompressed size reported by the last known record. Only the true total once
    /// [`Self::is_fully_initialized`] is `true`.
    pub fn last_known_uncompressed_size(&self) -> u64 {
        self.records.last().map_or(0, |r| r.uncompressed_pos)
    }

    /// The compressed size reported by the last known record.
    pub fn last_known_compressed_size(&self) -> u64 {
        self.records.last().map_or(0, |r| r.compressed_pos)
    }

    /// Looks up the jump coordinate for a logical offset: the greatest record whose
    /// `uncompressed_pos` does not exceed `pos`, plus the remaining discard distance.
    ///
    /// An empty table returns the degenerate coordinate `(0, pos, 0)`, which the read/seek engine
    /// treats as "start decoding from the very beginning of the stream".
    pub(crate) fn lookup(&self, pos: u64) -> JumpCoordinate {
        if self.records.is_empty() {
            return JumpCoordinate {
                compressed_offset: 0,
                uncompressed_offset: pos,
                record_index: 0,
            };
        }

        let mut low = 0usize;
        let mut high = self.records.len() - 1;
        while low < high {
            let mid = low + (high - low + 1) / 2;
            if self.records[mid].uncompressed_pos <= pos {
                low = mid;
            } else {
                high = mid - 1;
            }
        }

        let rec = self.records[low];
        JumpCoordinate {
            compressed_offset: rec.compressed_pos,
            uncompressed_offset: pos - rec.uncompressed_pos,
            record_index: low,
        }
    }
}

/// Attempts to parse a Zstandard seekable-format footer from the tail of `bytes`.
///
/// Returns `Ok(None)` (not `Err`) for anything that doesn't look like a valid footer, so the
/// caller can fall back to [`scan`] without treating a plain concatenation of frames as an
/// error.
///
/// # Errors
///
/// Only on integer conversions that cannot fail in practice; kept fallible for symmetry with the
/// rest of the crate.
pub(crate) fn parse_seekable_footer(bytes: &[u8]) -> Result<Option<JumpTable>> {
    let total = bytes.len();
    if total < SEEK_TABLE_FOOTER_SIZE {
        return Ok(None);
    }

    let footer = &bytes[total - SEEK_TABLE_FOOTER_SIZE..];
    if read_le32(footer, 5) != SEEKABLE_MAGIC_NUMBER {
        return Ok(None);
    }

    let descriptor = footer[4];
    if (descriptor >> 2) & 0x1f != 0 {
        return Ok(None);
    }
    let with_checksum = descriptor & 0x80 != 0;
    let num_frames = read_le32(footer, 0);
    if num_frames > SEEKABLE_MAX_FRAMES {
        return Ok(None);
    }
    let num_frames = num_frames as usize;

    let size_per_entry = if with_checksum { 12 } else { 8 };
    let seek_table_size = SKIPPABLE_HEADER_SIZE + SEEK_TABLE_FOOTER_SIZE + num_frames * size_per_entry;
    if seek_table_size > total {
        return Ok(None);
    }

    let skippable_start = total - seek_table_size;
    let skip_header = &bytes[skippable_start..skippable_start + SKIPPABLE_HEADER_SIZE];
    if read_le32(skip_header, 0) != SKIPPABLE_MAGIC_NUMBER {
        return Ok(None);
    }
    let skip_len = read_le32(skip_header, 4) as usize;
    if skip_len + SKIPPABLE_HEADER_SIZE != seek_table_size {
        return Ok(None);
    }

    let entries_start = skippable_start + SKIPPABLE_HEADER_SIZE;
    let mut records = Vec::with_capacity(num_frames + 1);
    let mut c_offset = 0u64;
    let mut d_offset = 0u64;
    for i in 0..num_frames {
        records.push(JumpTableRecord {
            compressed_pos: c_offset,
            uncompressed_pos: d_offset,
        });
        let off = entries_start + i * size_per_entry;
        c_offset += read_le32(bytes, off) as u64;
        d_offset += read_le32(bytes, off + 4) as u64;
    }
    records.push(JumpTableRecord {
        compressed_pos: c_offset,
        uncompressed_pos: d_offset,
    });

    Ok(Some(JumpTable {
        records,
        fully_initialized: true,
    }))
}

/// Extends `table` by walking frame headers starting from its last known record, stopping once
/// either every frame has been discovered (terminal) or the uncompressed cursor reaches
/// `up_until_uncompressed`.
///
/// # Errors
///
/// Fails if a frame header is truncated or otherwise malformed, or if a dummy decompression (for
/// frames with unknown content size) fails.
pub(crate) fn scan(bytes: &[u8], table: &mut JumpTable, up_until_uncompressed: u64) -> Result<()> {
    if table.records.is_empty() {
        table.records.push(JumpTableRecord {
            compressed_pos: 0,
            uncompressed_pos: 0,
        });
    }

    let mut last = *table.records.last().expect("just ensured non-empty");
    loop {
        if !table.fully_initialized && last.uncompressed_pos >= up_until_uncompressed {
            break;
        }

        let c_pos = last.compressed_pos as usize;
        if c_pos >= bytes.len() {
            table.fully_initialized = true;
            break;
        }

        let remaining = &bytes[c_pos..];
        let frame_size = match frame::frame_size(remaining) {
            Ok(size) if size > 0 && size <= remaining.len() => size,
            _ => {
                table.fully_initialized = true;
                break;
            }
        };

        let frame_bytes = &remaining[..frame_size];
        let magic = read_le32(frame_bytes, 0);
        let d_size = if frame::is_skippable_magic(magic) {
            0
        } else {
            match frame::content_size(frame_bytes)? {
                Some(size) => size,
                None => dummy_decompressed_size(frame_bytes)?,
            }
        };

        let next = JumpTableRecord {
            compressed_pos: last.compressed_pos + frame_size as u64,
            uncompressed_pos: last.uncompressed_pos + d_size,
        };
        // Zero-length frames contribute no new uncompressed boundary; the cursor still advances
        // in `last`, only the record is skipped.
        if next.uncompressed_pos > last.uncompressed_pos {
            table.records.push(next);
        }
        last = next;
    }

    Ok(())
}

fn dummy_decompressed_size(frame_bytes: &[u8]) -> Result<u64> {
    let mut dctx = zstd_safe::DCtx::create();
    let mut scratch = vec![0u8; zstd_safe::DCtx::out_size()];
    let mut in_buffer = zstd_safe::InBuffer::around(frame_bytes);
    let mut total = 0u64;

    loop {
        let mut out_buffer = zstd_safe::OutBuffer::around(&mut scratch);
        let remaining_hint = dctx
            .decompress_stream(&mut out_buffer, &mut in_buffer)
            .map_err(Error::from)?;
        total += out_buffer.pos() as u64;
        if remaining_hint == 0 {
            break;
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_on_empty_table_is_degenerate() {
        let table = JumpTable::new();
        let coord = table.lookup(42);
        assert_eq!(coord.compressed_offset, 0);
        assert_eq!(coord.uncompressed_offset, 42);
    }

    #[test]
    fn lookup_finds_containing_record() {
        let mut table = JumpTable::new();
        table.append(0, 0);
        table.append(10, 100);
        table.append(25, 250);
        table.fully_initialized = true;

        let coord = table.lookup(150);
        assert_eq!(coord.compressed_offset, 10);
        assert_eq!(coord.uncompressed_offset, 50);
        assert_eq!(coord.record_index, 1);

        let coord = table.lookup(0);
        assert_eq!(coord.compressed_offset, 0);
        assert_eq!(coord.uncompressed_offset, 0);

        let coord = table.lookup(249);
        assert_eq!(coord.compressed_offset, 10);
        assert_eq!(coord.uncompressed_offset, 149);
    }

    fn compress_frame(input: &[u8]) -> Vec<u8> {
        let mut cctx = zstd_safe::CCtx::create();
        let bound = zstd_safe::compress_bound(input.len());
        let mut buf = vec![0u8; bound];
        let n = cctx.compress(&mut buf, input, 3).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn scan_discovers_concatenated_frames() {
        let a = compress_frame(&b"aaaaaaaaaa".repeat(4));
        let b = compress_frame(&b"bbbbbbbbbbbbbbbbb".repeat(4));
        let mut bytes = a.clone();
        bytes.extend_from_slice(&b);

        let mut table = JumpTable::new();
        scan(&bytes, &mut table, u64::MAX).unwrap();

        assert!(table.is_fully_initialized());
        let recs = table.records();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].uncompressed_pos(), 0);
        assert_eq!(recs[1].compressed_pos(), a.len() as u64);
        assert_eq!(recs[1].uncompressed_pos(), 40);
        assert_eq!(recs[2].uncompressed_pos(), 40 + 68);
    }

    #[test]
    fn parses_no_footer_as_none() {
        let a = compress_frame(&b"just one frame, no footer".repeat(3));
        assert!(parse_seekable_footer(&a).unwrap().is_none());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn scan_produces_a_monotone_table(frame_lens in prop::collection::vec(1usize..40, 1..8)) {
            let mut bytes = Vec::new();
            for len in &frame_lens {
                let payload: Vec<u8> = (0..*len).map(|i| (i % 251) as u8).collect();
                bytes.extend_from_slice(&compress_frame(&payload));
            }

            let mut table = JumpTable::new();
            scan(&bytes, &mut table, u64::MAX).unwrap();

            prop_assert!(table.is_fully_initialized());
            let recs = table.records();
            for w in recs.windows(2) {
                prop_assert!(w[0].uncompressed_pos() < w[1].uncompressed_pos());
                prop_assert!(w[0].compressed_pos() < w[1].compressed_pos());
            }
            let total: usize = frame_lens.iter().sum();
            prop_assert_eq!(recs.last().unwrap().uncompressed_pos(), total as u64);
            prop_assert_eq!(recs.last().unwrap().compressed_pos(), bytes.len() as u64);

            for target in 0..total as u64 {
                let coord = table.lookup(target);
                let rec = recs[coord.record_index];
                prop_assert!(rec.uncompressed_pos() <= target);
                if let Some(next) = recs.get(coord.record_index + 1) {
                    prop_assert!(next.uncompressed_pos() > target);
                }
                prop_assert_eq!(rec.uncompressed_pos() + coord.uncompressed_offset, target);
            }
        }
    }
}
