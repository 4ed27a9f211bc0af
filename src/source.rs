//! The byte source backing a [`Context`](crate::Context): a random-access view over the full
//! range of compressed bytes, whether borrowed from the caller or obtained by memory-mapping a
//! file.

#[cfg(feature = "std")]
use std::fs::File;
#[cfg(all(feature = "std", unix))]
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
#[cfg(feature = "std")]
use std::path::Path;

#[cfg(feature = "std")]
use memmap2::{Mmap, MmapOptions};

#[cfg(feature = "std")]
use crate::error::Result;

/// How a [`Source`] came to hold its bytes, and therefore what must happen on drop.
pub(crate) enum Source<'a> {
    /// A caller-supplied buffer; the `Context` borrows it and never owns it.
    Borrowed(&'a [u8]),
    /// A mapping over a file this crate opened itself (`Context::from_path`). Both the mapping
    /// and the file descriptor are released on drop.
    #[cfg(feature = "std")]
    OwnedFile {
        mmap: Mmap,
        file: File,
    },
    /// A mapping over a file descriptor the caller owns (`Context::from_fd`). The mapping is
    /// released on drop, the file descriptor is left open for the caller to close.
    #[cfg(feature = "std")]
    OwnedMapping {
        mmap: Mmap,
        #[cfg(unix)]
        raw_fd: RawFd,
    },
}

impl<'a> Source<'a> {
    pub(crate) fn borrowed(buf: &'a [u8]) -> Self {
        Self::Borrowed(buf)
    }

    #[cfg(feature = "std")]
    pub(crate) fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file stays open for as long as the mapping
        // lives (it is stored alongside it in `OwnedFile`), so no other process truncating the
        // backing file while mapped can produce a dangling reference within this process.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        Ok(Self::OwnedFile { mmap, file })
    }

    #[cfg(all(feature = "std", unix))]
    pub(crate) fn from_fd(fd: RawFd) -> Result<Self> {
        // SAFETY: the caller guarantees `fd` is a valid, open file descriptor for the duration
        // of this call; we never close it (see `mem::forget` below), matching the contract that
        // `from_fd`-constructed contexts do not own the descriptor.
        let file = unsafe { File::from_raw_fd(fd) };
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let raw_fd = file.as_raw_fd();
        // The mapping outlives the `File` handle; once created, the mapping no longer needs the
        // descriptor open. Forgetting it here leaves the descriptor under the caller's ownership.
        core::mem::forget(file);

        Ok(Self::OwnedMapping { mmap, raw_fd })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Self::Borrowed(buf) => buf,
            #[cfg(feature = "std")]
            Self::OwnedFile { mmap, .. } => mmap,
            #[cfg(feature = "std")]
            Self::OwnedMapping { mmap, .. } => mmap,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.bytes().len() as u64
    }

    #[cfg(all(feature = "std", unix))]
    pub(crate) fn fileno(&self) -> Option<RawFd> {
        match self {
            Self::Borrowed(_) => None,
            Self::OwnedFile { file, .. } => Some(file.as_raw_fd()),
            Self::OwnedMapping { raw_fd, .. } => Some(*raw_fd),
        }
    }
}
