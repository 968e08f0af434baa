/*!
Error types for the crate.

[`DiskImageError`] is the single error type returned by every fallible
operation above the primitive codec layer. It implements the closed error
code set external callers must be able to switch on (see
[`DiskImageError::to_error_code`]) while still carrying enough internal
detail for `Display`/`Debug` to be useful in logs.
*/

use thiserror::Error;

/// The closed set of error codes exposed at the crate's external boundary.
///
/// Every [`DiskImageError`] variant maps onto exactly one of these. Adapters
/// and internal modules are free to grow new `DiskImageError` variants, but
/// this enum itself must never grow without a corresponding spec update -
/// callers match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ErrorCode {
    Ok,
    InvalidArg,
    NoMemory,
    Io,
    Format,
    Range,
    NotFound,
    Corrupt,
    ReadOnly,
    Overflow,
    Unsupported,
}

#[derive(Error, Debug)]
pub enum DiskImageError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of memory: {0}")]
    NoMemory(String),

    #[error("i/o error: {0}")]
    IoError(String),

    #[error("unknown or unrecognized disk image format")]
    UnknownFormat,

    #[error("format error: {0}")]
    FormatError(String),

    #[error("out of range: {0}")]
    RangeError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),

    #[error("image or track is read-only")]
    ReadOnlyError,

    #[error("value overflowed its representable range: {0}")]
    Overflow(String),

    #[error("operation or format feature not supported: {0}")]
    UnsupportedFormat(String),

    #[error("seek past the end of the source: {0}")]
    SeekError(String),

    #[error("bitstream error: {0}")]
    BitstreamError(String),

    #[error("track or sector id error: {0}")]
    IdError(String),

    #[error("id is not unique within the track: {0}")]
    UniqueIdError(String),

    #[error("crc mismatch: {0}")]
    CrcError(String),

    #[error("attempted to write to a write-protected image")]
    WriteProtectError,

    #[error("resource temporarily exhausted: {0}")]
    ResourceExhausted(String),
}

impl DiskImageError {
    /// Collapse the rich internal variant down to the closed external code set.
    pub fn to_error_code(&self) -> ErrorCode {
        use DiskImageError::*;
        match self {
            InvalidArgument(_) | IdError(_) => ErrorCode::InvalidArg,
            NoMemory(_) | ResourceExhausted(_) => ErrorCode::NoMemory,
            IoError(_) => ErrorCode::Io,
            UnknownFormat | FormatError(_) => ErrorCode::Format,
            RangeError(_) | SeekError(_) => ErrorCode::Range,
            NotFound(_) => ErrorCode::NotFound,
            CorruptData(_) | BitstreamError(_) | CrcError(_) | UniqueIdError(_) => ErrorCode::Corrupt,
            ReadOnlyError | WriteProtectError => ErrorCode::ReadOnly,
            Overflow(_) => ErrorCode::Overflow,
            UnsupportedFormat(_) => ErrorCode::Unsupported,
        }
    }
}

impl From<std::io::Error> for DiskImageError {
    fn from(e: std::io::Error) -> Self {
        DiskImageError::IoError(e.to_string())
    }
}

impl From<binrw::Error> for DiskImageError {
    fn from(e: binrw::Error) -> Self {
        DiskImageError::FormatError(e.to_string())
    }
}
