//! Error types for reading ZIM archives.

/// Errors that can occur while opening or reading a ZIM archive.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid ZIM file")]
    InvalidMagicNumber,

    #[error("format version {major}.{minor} not supported")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("invalid compression type {0}")]
    InvalidCompressionType(u8),

    #[error("invalid UTF-8 in archive string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("unknown MIME type index {0}")]
    UnknownMimeType(u16),

    #[error("LZMA error: {0}")]
    Lzma(#[from] lzma::Error),

    /// Reading from a record after the reader has advanced past it, or
    /// after the reader was closed.
    ///
    /// The public API ties every [`crate::Record`] to the `&mut`
    /// borrow of the [`crate::Reader`] that produced it, so a caller
    /// cannot hold a stale record and call `next` again -- the borrow
    /// checker rejects that program before it runs. This variant is
    /// kept for documentation completeness and for any caller that
    /// reaches a record through `unsafe` and defeats the borrow.
    #[error("read from invalidated record")]
    UseAfterInvalidation,
}

pub type Result<T> = std::result::Result<T, Error>;
