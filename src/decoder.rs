//! A thin adapter around the external streaming decompressor.
//!
//! [`DecoderWrapper`] owns a decompression session and a scratch output buffer sized to the
//! codec's natural block size. It knows nothing about frame boundaries, jump tables, or logical
//! offsets — that's the read/seek engine's job (see [`super::context`]).

use alloc::vec;
use alloc::vec::Vec;

use zstd_safe::{DCtx, InBuffer, OutBuffer, ResetDirective};

use crate::error::{Error, Result};

/// The outcome of one decompression step.
pub(crate) struct StepResult {
    /// How many compressed bytes were consumed from the input this step.
    pub(crate) consumed: usize,
    /// How many decompressed bytes landed in the scratch output buffer this step. Read them via
    /// [`DecoderWrapper::out_buf`], capped at this count.
    pub(crate) produced: usize,
    /// `true` once the decoder has emitted the final byte of the current frame.
    pub(crate) frame_complete: bool,
}

pub(crate) struct DecoderWrapper {
    dctx: DCtx<'static>,
    out_buf: Vec<u8>,
}

impl DecoderWrapper {
    pub(crate) fn new() -> Result<Self> {
        let dctx = DCtx::try_create().ok_or_else(|| {
            Error::other("failed to allocate a zstd decompression context")
        })?;

        Ok(Self {
            dctx,
            out_buf: vec![0; DCtx::out_size()],
        })
    }

    /// Feeds `input[*in_pos..]` to the decoder and fills the scratch buffer as far as it will
    /// go. Advances `*in_pos` by the number of compressed bytes consumed.
    pub(crate) fn decompress_step(&mut self, input: &[u8], in_pos: &mut usize) -> Result<StepResult> {
        let mut in_buffer = InBuffer::around(input);
        in_buffer.set_pos(*in_pos);
        let mut out_buffer = OutBuffer::around(&mut self.out_buf);

        let remaining_hint = self
            .dctx
            .decompress_stream(&mut out_buffer, &mut in_buffer)
            .map_err(Error::read_code)?;

        let consumed = in_buffer.pos() - *in_pos;
        *in_pos = in_buffer.pos();

        Ok(StepResult {
            consumed,
            produced: out_buffer.pos(),
            frame_complete: remaining_hint == 0,
        })
    }

    /// The scratch buffer that the most recent [`Self::decompress_step`] wrote into.
    pub(crate) fn out_buf(&self) -> &[u8] {
        &self.out_buf
    }

    /// Discards any mid-frame decoder state. Allocations are kept.
    pub(crate) fn reset(&mut self) {
        self.dctx
            .reset(ResetDirective::SessionOnly)
            .expect("resetting a session never fails");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compress(input: &[u8]) -> Vec<u8> {
        let mut cctx = zstd_safe::CCtx::create();
        let bound = zstd_safe::compress_bound(input.len());
        let mut buf = vec![0u8; bound];
        let n = cctx.compress(&mut buf, input, 3).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn decompresses_a_single_frame_across_steps() {
        let input = b"some text to round-trip through the wrapper".repeat(16);
        let compressed = compress(&input);

        let mut wrapper = DecoderWrapper::new().unwrap();
        let mut in_pos = 0;
        let mut output = Vec::new();

        loop {
            let step = wrapper.decompress_step(&compressed, &mut in_pos).unwrap();
            output.extend_from_slice(&wrapper.out_buf()[..step.produced]);
            if step.frame_complete {
                break;
            }
        }

        assert_eq!(output, input);
    }

    #[test]
    fn reset_allows_decoding_again() {
        let input = b"reset me please".repeat(8);
        let compressed = compress(&input);

        let mut wrapper = DecoderWrapper::new().unwrap();
        let mut in_pos = 0;
        let mut output = Vec::new();
        loop {
            let step = wrapper.decompress_step(&compressed, &mut in_pos).unwrap();
            output.extend_from_slice(&wrapper.out_buf()[..step.produced]);
            if step.frame_complete {
                break;
            }
        }
        assert_eq!(output, input);

        wrapper.reset();
        in_pos = 0;
        output.clear();
        loop {
            let step = wrapper.decompress_step(&compressed, &mut in_pos).unwrap();
            output.extend_from_slice(&wrapper.out_buf()[..step.produced]);
            if step.frame_complete {
                break;
            }
        }
        assert_eq!(output, input);
    }
}
