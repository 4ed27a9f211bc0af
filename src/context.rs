//! The stateful core: translates logical seek/read calls into jump table lookups, decoder
//! resets, and frame-by-frame decompression.

use crate::{
    dbg_log,
    decoder::DecoderWrapper,
    error::{Error, Result},
    frame,
    jump_table::{JumpCoordinate, JumpTable},
    source::Source,
};

#[cfg(all(feature = "std", unix))]
use std::os::unix::io::RawFd;
#[cfg(feature = "std")]
use std::path::Path;

fn read_le32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// A position to seek to, relative to one of three fixed origins.
///
/// Distinct from [`std::io::SeekFrom`] only in that `Start` carries a signed offset: a negative
/// absolute offset is a reachable, typed error ([`Error::is_negative_seek`]) rather than a
/// construction that cannot occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekFrom {
    /// An absolute offset from the beginning of the uncompressed stream.
    Start(i64),
    /// An offset relative to the current position.
    Current(i64),
    /// An offset relative to the end of the uncompressed stream. Forces full jump table
    /// initialization to determine the true end.
    End(i64),
}

/// Options for constructing a [`Context`], including a manually-supplied jump table (bypassing
/// footer parsing and scanning entirely, the same escape hatch the grounding teacher offers via
/// `DecodeOptions::seek_table`).
#[derive(Default)]
pub struct ContextOptions {
    jump_table: Option<JumpTable>,
    eager_init: bool,
}

impl ContextOptions {
    /// Creates default options: no pre-built jump table, lazy initialization.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies a pre-built jump table, bypassing footer parsing and scanning entirely.
    pub fn jump_table(mut self, table: JumpTable) -> Self {
        self.jump_table = Some(table);
        self
    }

    /// Forces full jump table initialization (footer parse, falling back to a complete scan) at
    /// construction time rather than on first seek/read.
    pub fn eager_init(mut self, eager: bool) -> Self {
        self.eager_init = eager;
        self
    }

    /// Builds a [`Context`] borrowing `buf` as its compressed source.
    ///
    /// # Errors
    ///
    /// Fails if `buf` does not start with a valid frame header, or if eager initialization is
    /// requested and no frame can be located at all.
    pub fn build_from_buffer(self, buf: &[u8]) -> Result<Context<'_>> {
        Context::build(Source::borrowed(buf), self)
    }

    /// Builds a [`Context`] that memory-maps the file at `path`. The mapping and its file
    /// descriptor are owned by the `Context` and released on drop.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or mapped, or on the same conditions as
    /// [`Self::build_from_buffer`].
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn build_from_path(self, path: impl AsRef<Path>) -> Result<Context<'static>> {
        Context::build(Source::from_path(path)?, self)
    }

    /// Builds a [`Context`] that memory-maps the file behind `fd`. The mapping is released on
    /// drop; `fd` remains owned by the caller and is never closed by this crate.
    ///
    /// # Safety
    ///
    /// `fd` must be a valid, open file descriptor for the duration of this call.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be mapped, or on the same conditions as
    /// [`Self::build_from_buffer`].
    #[cfg(all(feature = "std", unix))]
    #[cfg_attr(docsrs, doc(cfg(unix)))]
    pub unsafe fn build_from_fd(self, fd: RawFd) -> Result<Context<'static>> {
        Context::build(Source::from_fd(fd)?, self)
    }
}

/// A random-access handle onto the uncompressed content of a Zstandard (optionally seekable)
/// archive.
///
/// `Context` owns everything it allocated: its decoder session, its jump table, and, when
/// constructed from a path or descriptor, the memory mapping backing the compressed bytes. All
/// of it is released automatically when the `Context` is dropped; there is no explicit `close`
/// or `free` operation, and no null-context state to guard against — every operation is a method
/// on an already-constructed `&mut Context`.
pub struct Context<'a> {
    decoder: DecoderWrapper,
    jump_table: JumpTable,
    source: Source<'a>,

    /// Logical (uncompressed) position.
    position: u64,
    /// The jump coordinate installed for `position`.
    coord: JumpCoordinate,
    /// Compressed offset of the next unread byte.
    compressed_position: u64,
    /// Compressed offset where the current frame ends (exclusive). Equal to
    /// `compressed_position` whenever a new frame needs to be located.
    current_frame_end: u64,
    /// Decompressed bytes still to discard before delivering output to the caller.
    discard_remaining: u64,
    /// How many bytes of the decoder's scratch buffer are valid right now.
    out_produced: usize,
    /// How many of `out_produced` bytes have already been discarded or delivered.
    out_consumed: usize,
    /// `true` while decoding a frame that sits exactly at the jump table's frontier, so its size
    /// should be appended as a new record once fully decoded.
    extending_frontier: bool,
    /// Decompressed bytes produced so far for the frame currently being decoded, valid only
    /// while `extending_frontier` is set.
    frame_produced_accum: u64,
}

impl<'a> Context<'a> {
    /// Opens `buf` as a seekable archive and immediately builds its jump table (footer parse,
    /// falling back to a complete scan).
    ///
    /// # Errors
    ///
    /// Fails if `buf` does not start with a valid frame, or if no frame at all can be located.
    pub fn from_buffer(buf: &'a [u8]) -> Result<Self> {
        ContextOptions::new().eager_init(true).build_from_buffer(buf)
    }

    /// Like [`Self::from_buffer`], but defers jump table construction to the first seek or read
    /// that needs it. The only way to open archives whose indexing would otherwise require
    /// decompressing frames of unknown content size up front.
    ///
    /// # Errors
    ///
    /// Fails if `buf` does not start with a valid frame.
    pub fn from_buffer_without_jump_table(buf: &'a [u8]) -> Result<Self> {
        ContextOptions::new().build_from_buffer(buf)
    }

    /// Opens the file at `path` as a seekable archive (memory-mapped), building its jump table
    /// immediately.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or mapped, or under the same conditions as
    /// [`Self::from_buffer`].
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Context<'static>> {
        ContextOptions::new().eager_init(true).build_from_path(path)
    }

    /// Like [`Self::from_path`], but defers jump table construction.
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`Self::from_path`], minus eager-init failures.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn from_path_without_jump_table(path: impl AsRef<Path>) -> Result<Context<'static>> {
        ContextOptions::new().build_from_path(path)
    }

    /// Opens the file behind `fd` as a seekable archive (memory-mapped), building its jump table
    /// immediately. `fd` remains owned by the caller.
    ///
    /// # Safety
    ///
    /// `fd` must be a valid, open file descriptor for the duration of this call.
    ///
    /// # Errors
    ///
    /// Fails if the descriptor cannot be mapped, or under the same conditions as
    /// [`Self::from_buffer`].
    #[cfg(all(feature = "std", unix))]
    #[cfg_attr(docsrs, doc(cfg(unix)))]
    pub unsafe fn from_fd(fd: RawFd) -> Result<Context<'static>> {
        unsafe { ContextOptions::new().eager_init(true).build_from_fd(fd) }
    }

    /// Like [`Self::from_fd`], but defers jump table construction.
    ///
    /// # Safety
    ///
    /// Same as [`Self::from_fd`].
    ///
    /// # Errors
    ///
    /// Fails under the same conditions as [`Self::from_fd`], minus eager-init failures.
    #[cfg(all(feature = "std", unix))]
    #[cfg_attr(docsrs, doc(cfg(unix)))]
    pub unsafe fn from_fd_without_jump_table(fd: RawFd) -> Result<Context<'static>> {
        unsafe { ContextOptions::new().build_from_fd(fd) }
    }

    fn build(source: Source<'a>, opts: ContextOptions) -> Result<Self> {
        let bytes = source.bytes();
        if bytes.len() < 4 {
            return Err(Error::malformed_footer());
        }
        // Validate that the source starts with a real frame (regular or skippable), matching
        // the factory contract: a `Context` always addresses a concatenation of frames.
        frame::frame_size(bytes).map_err(|_| Error::malformed_footer())?;

        let mut jump_table = opts.jump_table.unwrap_or_default();
        if opts.eager_init && jump_table.records().is_empty() {
            Self::initialize_jump_table(bytes, &mut jump_table, u64::MAX)?;
        }

        let coord = jump_table.lookup(0);
        Ok(Self {
            decoder: DecoderWrapper::new()?,
            jump_table,
            source,
            position: 0,
            coord,
            compressed_position: coord.compressed_offset,
            current_frame_end: coord.compressed_offset,
            discard_remaining: coord.uncompressed_offset,
            out_produced: 0,
            out_consumed: 0,
            extending_frontier: false,
            frame_produced_accum: 0,
        })
    }

    fn initialize_jump_table(bytes: &[u8], jump_table: &mut JumpTable, up_until: u64) -> Result<()> {
        if jump_table.records().is_empty() {
            if let Some(parsed) = crate::jump_table::parse_seekable_footer(bytes)? {
                dbg_log!("parsed seekable footer with {} frames", parsed.records().len());
                *jump_table = parsed;
                return Ok(());
            }
            dbg_log!("no seekable footer found, falling back to progressive scan");
        }
        crate::jump_table::scan(bytes, jump_table, up_until)?;
        if jump_table.records().len() <= 1 && !jump_table.is_fully_initialized() {
            return Err(Error::malformed_footer());
        }
        Ok(())
    }

    /// Ensures the jump table knows about every frame up to (at least) `target`, growing it via
    /// progressive scan if necessary.
    fn ensure_indexed_through(&mut self, target: u64) -> Result<()> {
        if self.jump_table.is_fully_initialized() {
            return Ok(());
        }
        if target <= self.jump_table.last_known_uncompressed_size() {
            return Ok(());
        }
        Self::initialize_jump_table(self.source.bytes(), &mut self.jump_table, target)
    }

    /// Forces the jump table to be fully built and returns the true uncompressed size.
    ///
    /// # Errors
    ///
    /// Fails if the compressed stream is malformed.
    pub fn uncompressed_file_size(&mut self) -> Result<u64> {
        if !self.jump_table.is_fully_initialized() {
            Self::initialize_jump_table(self.source.bytes(), &mut self.jump_table, u64::MAX)?;
        }
        Ok(self.jump_table.last_known_uncompressed_size())
    }

    /// The uncompressed size implied by the jump table's current knowledge, without forcing a
    /// scan. Equal to [`Self::uncompressed_file_size`] once the table is fully initialized.
    pub fn last_known_uncompressed_file_size(&self) -> u64 {
        self.jump_table.last_known_uncompressed_size()
    }

    /// The current logical (uncompressed) position.
    pub fn tell(&self) -> u64 {
        self.position
    }

    /// The current compressed position.
    pub fn compressed_tell(&self) -> u64 {
        self.compressed_position
    }

    /// Whether the jump table has discovered every frame.
    pub fn jump_table_is_initialized(&self) -> bool {
        self.jump_table.is_fully_initialized()
    }

    /// Read access to the jump table built (or supplied) so far.
    pub fn jump_table(&self) -> &JumpTable {
        &self.jump_table
    }

    /// The owned file descriptor, if this context was constructed from a path or descriptor.
    #[cfg(all(feature = "std", unix))]
    #[cfg_attr(docsrs, doc(cfg(unix)))]
    pub fn fileno(&self) -> Option<RawFd> {
        self.source.fileno()
    }

    /// Counts frames by repeated frame-size probing, without building (or requiring) a full
    /// jump table.
    ///
    /// # Errors
    ///
    /// Fails if a frame header is malformed.
    pub fn number_of_frames(&self) -> Result<u64> {
        let bytes = self.source.bytes();
        let mut pos = 0usize;
        let mut count = 0u64;
        while pos < bytes.len() {
            let size = frame::frame_size(&bytes[pos..])?;
            let magic = read_le32(bytes, pos);
            if !frame::is_skippable_magic(magic) {
                count += 1;
            }
            pos += size;
        }
        Ok(count)
    }

    /// Whether the archive contains more than one content frame. Stops counting after the
    /// second frame is found.
    ///
    /// # Errors
    ///
    /// Fails if a frame header is malformed.
    pub fn is_multiframe(&self) -> Result<bool> {
        let bytes = self.source.bytes();
        let mut pos = 0usize;
        let mut count = 0u64;
        while pos < bytes.len() && count < 2 {
            let size = frame::frame_size(&bytes[pos..])?;
            let magic = read_le32(bytes, pos);
            if !frame::is_skippable_magic(magic) {
                count += 1;
            }
            pos += size;
        }
        Ok(count >= 2)
    }

    /// Reads decompressed bytes starting from the current position into `buf`, returning the
    /// number of bytes written (`< buf.len()` only at the end of the stream).
    ///
    /// As a side effect, any previously-unindexed frame this call decodes all the way through is
    /// appended to the jump table, so a purely sequential reader incrementally builds the same
    /// index an explicit seek would have forced.
    ///
    /// # Errors
    ///
    /// Fails if the compressed stream is malformed or the decoder reports a codec error
    /// ([`Error::is_read`], corresponding to [`crate::error::ERR_READ`] at the C-ABI boundary).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        while written < buf.len() {
            if self.out_consumed < self.out_produced {
                written += self.drain_scratch(&mut buf[written..]);
                continue;
            }

            if self.compressed_position >= self.current_frame_end {
                if !self.load_next_frame()? {
                    break; // end of stream
                }
                continue;
            }

            let bytes = self.source.bytes();
            let mut in_pos = self.compressed_position as usize;
            let step = self.decoder.decompress_step(bytes, &mut in_pos)?;
            self.compressed_position = in_pos as u64;
            self.out_produced = step.produced;
            self.out_consumed = 0;

            if self.extending_frontier {
                self.frame_produced_accum += step.produced as u64;
            }

            if step.frame_complete {
                self.compressed_position = self.current_frame_end;
                if self.extending_frontier {
                    if self.jump_table.records().is_empty() {
                        // Seed the same (0, 0) anchor record `scan` would, so a table built
                        // purely through incremental reads still satisfies `lookup`'s
                        // assumption that the first record always describes the stream's start.
                        self.jump_table.append(0, 0);
                    }
                    let last_known = self.jump_table.last_known_uncompressed_size();
                    let new_uncompressed = last_known + self.frame_produced_accum;
                    if new_uncompressed > last_known {
                        self.jump_table.append(self.current_frame_end, new_uncompressed);
                    }
                    if self.current_frame_end >= self.source.len() {
                        self.jump_table.mark_fully_initialized();
                    }
                    self.extending_frontier = false;
                }
            }

            if step.produced == 0 {
                if step.frame_complete || step.consumed > 0 {
                    // Either an empty frame, or a step that only consumed header bytes and will
                    // produce output on a later step; either way, loop again.
                    continue;
                }
                // Codec consumed nothing and produced nothing: a read-path failure, distinct
                // from a corrupt index (see `Error::is_read`).
                return Err(Error::stalled_read());
            }
        }

        Ok(written)
    }

    /// Drains as much of the decoder's scratch buffer as possible into `buf`, discarding the
    /// intra-frame prefix first. Returns the number of bytes copied into `buf`.
    fn drain_scratch(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.decoder.out_buf()[self.out_consumed..self.out_produced];

        if self.discard_remaining > 0 {
            let skip = (self.discard_remaining as usize).min(available.len());
            self.discard_remaining -= skip as u64;
            self.out_consumed += skip;
            return 0;
        }

        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.out_consumed += n;
        self.position += n as u64;
        n
    }

    /// Locates the next frame at `compressed_position`, skipping over skippable frames (e.g. a
    /// trailing seek table) without decoding them. Returns `false` at end of stream.
    ///
    /// When the located frame sits exactly at the jump table's current frontier, marks it for
    /// incremental indexing (see [`Self::read`]).
    fn load_next_frame(&mut self) -> Result<bool> {
        loop {
            if self.compressed_position >= self.source.len() {
                if !self.jump_table.is_fully_initialized() {
                    self.jump_table.mark_fully_initialized();
                }
                return Ok(false);
            }

            let bytes = self.source.bytes();
            let remaining = &bytes[self.compressed_position as usize..];
            let size = match frame::frame_size(remaining) {
                Ok(size) if size > 0 => size,
                _ => {
                    if !self.jump_table.is_fully_initialized() {
                        self.jump_table.mark_fully_initialized();
                    }
                    return Ok(false);
                }
            };

            let magic = read_le32(remaining, 0);
            self.current_frame_end = self.compressed_position + size as u64;
            if frame::is_skippable_magic(magic) {
                self.compressed_position = self.current_frame_end;
                continue;
            }

            self.extending_frontier = !self.jump_table.is_fully_initialized()
                && self.compressed_position == self.jump_table.last_known_compressed_size();
            self.frame_produced_accum = 0;
            return Ok(true);
        }
    }

    /// Moves the logical position.
    ///
    /// # Errors
    ///
    /// [`Error::is_negative_seek`] if the target would be negative,
    /// [`Error::is_beyond_end_seek`] if the target is past the end of the uncompressed stream.
    pub fn seek(&mut self, from: SeekFrom) -> Result<u64> {
        if from == SeekFrom::Current(0) {
            return Ok(self.position);
        }

        let target = self.resolve_target(from)?;
        if target == self.position {
            return Ok(target);
        }

        self.ensure_indexed_through(target)?;
        if target > self.jump_table.last_known_uncompressed_size()
            && self.jump_table.is_fully_initialized()
        {
            return Err(Error::beyond_end_seek());
        }

        let new_coord = self.jump_table.lookup(target);
        let same_frame_forward =
            new_coord.record_index == self.coord.record_index && target >= self.position;

        if same_frame_forward {
            let mut remaining = target - self.position;
            let mut scratch = [0u8; 4096];
            while remaining > 0 {
                let chunk = remaining.min(scratch.len() as u64) as usize;
                let n = self.read(&mut scratch[..chunk])?;
                if n == 0 {
                    break;
                }
                remaining -= n as u64;
            }
        } else {
            self.decoder.reset();
            self.compressed_position = new_coord.compressed_offset;
            self.current_frame_end = new_coord.compressed_offset;
            self.discard_remaining = new_coord.uncompressed_offset;
            self.out_produced = 0;
            self.out_consumed = 0;
            self.extending_frontier = false;
            self.frame_produced_accum = 0;
            self.position = target;
        }

        self.coord = new_coord;
        Ok(target)
    }

    fn resolve_target(&mut self, from: SeekFrom) -> Result<u64> {
        let signed = match from {
            SeekFrom::Start(n) => n,
            SeekFrom::Current(n) => i64::try_from(self.position)
                .map_err(|_| Error::beyond_end_seek())?
                .checked_add(n)
                .ok_or_else(Error::negative_seek)?,
            SeekFrom::End(n) => {
                let size = self.uncompressed_file_size()?;
                i64::try_from(size)
                    .map_err(|_| Error::beyond_end_seek())?
                    .checked_add(n)
                    .ok_or_else(Error::negative_seek)?
            }
        };

        if signed < 0 {
            return Err(Error::negative_seek());
        }
        Ok(signed as u64)
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl std::io::Read for Context<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        Context::read(self, buf).map_err(std::io::Error::other)
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl std::io::Seek for Context<'_> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        let from = match pos {
            std::io::SeekFrom::Start(n) => {
                SeekFrom::Start(i64::try_from(n).map_err(|_| std::io::Error::other(Error::beyond_end_seek()))?)
            }
            std::io::SeekFrom::Current(n) => SeekFrom::Current(n),
            std::io::SeekFrom::End(n) => SeekFrom::End(n),
        };
        Context::seek(self, from).map_err(std::io::Error::other)
    }
}
