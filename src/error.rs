use alloc::boxed::Box;
use zstd_safe::{ErrorCode, get_error_name, zstd_sys::ZSTD_ErrorCode};

/// A `Result` alias where the `Err` case is `zstdseek::Error`.
pub type Result<T> = core::result::Result<T, Error>;

/// C-ABI-compatible sentinel for a seek to a negative absolute offset.
pub const ERR_NEGATIVE_SEEK: i64 = -1;
/// C-ABI-compatible sentinel for a seek beyond the end of the uncompressed stream.
pub const ERR_BEYOND_END_SEEK: i64 = -2;
/// C-ABI-compatible sentinel for a failed read.
pub const ERR_READ: i64 = -3;

/// The errors that may occur when working with this crate.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
}

impl Error {
    /// A custom error.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn core::error::Error + Send + Sync>>,
    {
        Self {
            kind: Kind::Other(err.into()),
        }
    }

    /// Returns true if the error cannot be categorized into any other kind.
    pub fn is_other(&self) -> bool {
        matches!(self.kind, Kind::Other(_))
    }

    /// Returns true if the error origins from a failed number conversion.
    pub fn is_number_conversion_failed(&self) -> bool {
        matches!(self.kind, Kind::NumberConversionFailed(_))
    }

    pub(crate) fn negative_seek() -> Self {
        Self {
            kind: Kind::NegativeSeek,
        }
    }

    /// Returns true if a seek targeted a negative absolute offset.
    ///
    /// Corresponds to [`ERR_NEGATIVE_SEEK`].
    pub fn is_negative_seek(&self) -> bool {
        matches!(self.kind, Kind::NegativeSeek)
    }

    pub(crate) fn beyond_end_seek() -> Self {
        Self {
            kind: Kind::BeyondEndSeek,
        }
    }

    /// Returns true if a seek targeted an offset past the end of the uncompressed stream.
    ///
    /// Corresponds to [`ERR_BEYOND_END_SEEK`].
    pub fn is_beyond_end_seek(&self) -> bool {
        matches!(self.kind, Kind::BeyondEndSeek)
    }

    pub(crate) fn frame_index_out_of_range() -> Self {
        Self {
            kind: Kind::FrameIndexOutOfRange,
        }
    }

    /// Returns true if the error is related to a frame index that is out of range.
    pub fn is_frame_index_out_of_range(&self) -> bool {
        matches!(self.kind, Kind::FrameIndexOutOfRange)
    }

    pub(crate) fn malformed_footer() -> Self {
        Self {
            kind: Kind::MalformedFooter,
        }
    }

    /// Returns true if no frames could be located in the source, whether via a seekable footer
    /// or via progressive scanning.
    pub fn is_malformed_footer(&self) -> bool {
        matches!(self.kind, Kind::MalformedFooter)
    }

    pub(crate) fn read_code(code: ErrorCode) -> Self {
        Self {
            kind: Kind::Read(code),
        }
    }

    /// A read-path failure detected by the engine itself rather than returned by the codec (e.g.
    /// a decode step that consumed and produced nothing without signalling frame completion).
    /// Wraps the same generic corruption code the grounding teacher uses for its own
    /// manually-detected corruption cases.
    pub(crate) fn stalled_read() -> Self {
        let wrapped = 0_usize.wrapping_sub(ZSTD_ErrorCode::ZSTD_error_corruption_detected as usize);
        Self {
            kind: Kind::Read(wrapped),
        }
    }

    /// Returns true if the error origins from an IO error.
    #[cfg(feature = "std")]
    #[cfg_attr(docsrs, doc(cfg(feature = "std")))]
    pub fn is_io(&self) -> bool {
        matches!(self.kind, Kind::Io(_))
    }

    /// Returns true if the error originates from the zstd library while inspecting a frame or
    /// seekable footer, outside of the main read path.
    pub fn is_zstd(&self) -> bool {
        matches!(self.kind, Kind::Zstd(_))
    }

    /// Returns true if the decoder failed mid-read, e.g. a corrupt frame. Corresponds to
    /// [`ERR_READ`] at the C-ABI read boundary.
    pub fn is_read(&self) -> bool {
        matches!(self.kind, Kind::Read(_))
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.kind {
            Kind::Other(err) => write!(f, "{err}"),
            Kind::NumberConversionFailed(err) => write!(f, "number conversion failed: {err}"),
            Kind::NegativeSeek => f.write_str("seek target is negative"),
            Kind::BeyondEndSeek => f.write_str("seek target is beyond the end of the stream"),
            Kind::FrameIndexOutOfRange => f.write_str("frame index out of range"),
            Kind::MalformedFooter => {
                f.write_str("seekable footer is malformed and no frame could be located")
            }
            #[cfg(feature = "std")]
            Kind::Io(err) => write!(f, "io error: {err}"),
            Kind::Zstd(code) => f.write_str(get_error_name(*code)),
            Kind::Read(code) => write!(f, "read failed: {}", get_error_name(*code)),
        }
    }
}

impl core::error::Error for Error {}

impl From<core::num::TryFromIntError> for Error {
    fn from(value: core::num::TryFromIntError) -> Self {
        Self {
            kind: Kind::NumberConversionFailed(value),
        }
    }
}

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self {
            kind: Kind::Io(value),
        }
    }
}

impl From<ErrorCode> for Error {
    fn from(value: ErrorCode) -> Self {
        Self {
            kind: Kind::Zstd(value),
        }
    }
}

enum Kind {
    Other(Box<dyn core::error::Error + Send + Sync>),
    /// Out of range integral type conversion attempted.
    NumberConversionFailed(core::num::TryFromIntError),
    /// `seek` was called with a negative absolute offset.
    NegativeSeek,
    /// `seek` targeted an offset past the end of the uncompressed stream.
    BeyondEndSeek,
    /// A frame index passed to a jump table accessor is out of range.
    FrameIndexOutOfRange,
    /// Neither footer parsing nor progressive scanning could locate a single frame.
    MalformedFooter,
    /// IO error.
    #[cfg(feature = "std")]
    Io(std::io::Error),
    /// An error from the zstd library, surfaced during footer/frame-header inspection.
    Zstd(ErrorCode),
    /// A codec error surfaced while decompressing the read path specifically.
    Read(ErrorCode),
}

impl core::fmt::Debug for Kind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Other(arg0) => f.debug_tuple("Other").field(arg0).finish(),
            Self::NumberConversionFailed(arg0) => {
                f.debug_tuple("NumberConversionFailed").field(arg0).finish()
            }
            Self::NegativeSeek => write!(f, "NegativeSeek"),
            Self::BeyondEndSeek => write!(f, "BeyondEndSeek"),
            Self::FrameIndexOutOfRange => write!(f, "FrameIndexOutOfRange"),
            Self::MalformedFooter => write!(f, "MalformedFooter"),
            #[cfg(feature = "std")]
            Self::Io(arg0) => f.debug_tuple("Io").field(arg0).finish(),
            Self::Zstd(c) => write!(f, "{}; code {}", zstd_safe::get_error_name(*c), c),
            Self::Read(c) => write!(f, "{}; code {}", zstd_safe::get_error_name(*c), c),
        }
    }
}
