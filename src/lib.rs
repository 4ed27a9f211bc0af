//! Random-access decompression of Zstandard seekable archives.
//!
//! The seekable format splits compressed data into a series of independent frames, each
//! compressed individually, so that decompression of a section in the middle of an archive only
//! requires zstd to decompress at most a frame's worth of extra data, instead of the entire
//! archive.
//!
//! This crate only reads seekable archives; it does not produce them. A [`Context`] opens a
//! compressed source (a buffer, a path, or a file descriptor) and provides `read`/`seek`
//! operations over its uncompressed content, building or loading a [`JumpTable`] to avoid
//! rescanning frames it has already visited.
//!
//! This crate uses bindings from the [zstd_safe] crate for every codec operation.
//!
//! # Getting Started
//!
//! - [`Context::from_buffer`] opens an in-memory archive.
//! - [`ContextOptions::build_from_path`] memory-maps an archive on disk.
//! - [`Context::seek`] and [`Context::read`] perform the random access itself; under the `std`
//!   feature, [`Context`] also implements [`std::io::Read`] and [`std::io::Seek`].
//!
//! [zstd_safe]: https://docs.rs/zstd-safe/latest/zstd_safe/

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

mod context;
mod decoder;
mod error;
mod frame;
mod jump_table;
mod source;

pub use context::{Context, ContextOptions, SeekFrom};
pub use error::{ERR_BEYOND_END_SEEK, ERR_NEGATIVE_SEEK, ERR_READ, Error, Result};
pub use jump_table::{JumpTable, JumpTableRecord};

/// The magic number of the seek table integrity field.
pub const SEEKABLE_MAGIC_NUMBER: u32 = 0x8F92_EAB1;
/// The maximum number of frames in a seekable archive.
pub const SEEKABLE_MAX_FRAMES: u32 = 0x0800_0000;
/// The size of the seek table's trailing integrity field (number of frames, descriptor byte,
/// magic number).
pub const SEEK_TABLE_FOOTER_SIZE: usize = 9;
/// The maximum size of the uncompressed data of a frame.
pub const SEEKABLE_MAX_FRAME_SIZE: usize = 0x4000_0000;
/// The size of a skippable frame header: magic number (4 bytes) + frame size field (4 bytes).
pub(crate) const SKIPPABLE_HEADER_SIZE: usize = 8;

/// Emits a line to stderr when the `debug` feature is enabled, a no-op otherwise. Used in the
/// jump table and context modules to trace footer parsing, scanning, and frame transitions
/// without paying for it in release builds.
macro_rules! dbg_log {
    ($($arg:tt)*) => {
        $crate::maybe_log(format_args!($($arg)*))
    };
}
pub(crate) use dbg_log;

#[cfg(feature = "debug")]
#[cfg(feature = "std")]
pub(crate) fn maybe_log(args: core::fmt::Arguments<'_>) {
    use std::io::Write;
    let _ = writeln!(std::io::stderr(), "{args}");
}

#[cfg(feature = "debug")]
#[cfg(not(feature = "std"))]
pub(crate) fn maybe_log(_args: core::fmt::Arguments<'_>) {}

#[cfg(not(feature = "debug"))]
#[inline(always)]
pub(crate) fn maybe_log(_args: core::fmt::Arguments<'_>) {}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn compress_frame(input: &[u8]) -> Vec<u8> {
        let mut cctx = zstd_safe::CCtx::create();
        let bound = zstd_safe::compress_bound(input.len());
        let mut buf = alloc::vec![0u8; bound];
        let n = cctx.compress(&mut buf, input, 3).unwrap();
        buf.truncate(n);
        buf
    }

    pub const INPUT: &str = include_str!("./lib.rs");

    #[test]
    fn random_access_round_trip_over_many_frames() {
        // Split INPUT into a handful of frames and check that every byte is reachable both via
        // sequential reads and via arbitrary seeks.
        let chunk = INPUT.len() / 7 + 1;
        let mut archive = Vec::new();
        for part in INPUT.as_bytes().chunks(chunk) {
            archive.extend_from_slice(&compress_frame(part));
        }

        let mut ctx = Context::from_buffer(&archive).unwrap();
        assert_eq!(
            ctx.uncompressed_file_size().unwrap(),
            INPUT.len() as u64
        );

        let mut output = alloc::vec![0u8; INPUT.len()];
        let mut total = 0;
        while total < output.len() {
            let n = ctx.read(&mut output[total..]).unwrap();
            assert!(n > 0);
            total += n;
        }
        assert_eq!(output, INPUT.as_bytes());

        for &target in &[0usize, chunk / 2, chunk * 3, INPUT.len() - 10] {
            ctx.seek(SeekFrom::Start(target as i64)).unwrap();
            let mut buf = [0u8; 10];
            let n = ctx.read(&mut buf).unwrap();
            assert_eq!(&buf[..n], &INPUT.as_bytes()[target..target + n]);
        }
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_read_and_seek_traits_work() {
        use std::io::{Read, Seek};

        let archive = compress_frame(INPUT.as_bytes());
        let mut ctx = Context::from_buffer(&archive).unwrap();

        ctx.seek(std::io::SeekFrom::Start(5)).unwrap();
        let mut buf = [0u8; 5];
        ctx.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, &INPUT.as_bytes()[5..10]);
    }
}
