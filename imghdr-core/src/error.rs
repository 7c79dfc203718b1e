use std::path::PathBuf;

use thiserror::Error;

/// Problems with the bytes of an image header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("file is too small to contain a valid header ({actual} of {needed} bytes)")]
    TooShort { needed: usize, actual: usize },

    #[error("invalid magic number {found:#06x}, expected {expected:#06x}")]
    BadMagic { expected: u16, found: u16 },

    #[error("unsupported image header version {found:#04x}, expected {expected:#04x}")]
    UnsupportedVersion { expected: u16, found: u16 },

    #[error("payload of {0} bytes does not fit the 32-bit size field")]
    PayloadTooLarge(usize),
}

/// Reasons a signature could not be produced.
///
/// Every variant is recoverable: the caller decides whether to carry on with
/// an unsigned header.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("private key file `{0}` not found")]
    KeyNotFound(PathBuf),

    #[error("could not read private key `{0}`: {1}")]
    KeyUnreadable(PathBuf, std::io::Error),

    #[error("could not parse private key `{0}`: {1}")]
    KeyParse(PathBuf, String),

    #[error("signing failed: {0}")]
    Primitive(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Sign(#[from] SignError),

    /// Signature-only patching was requested without a private key.
    #[error("signature-only patch requires a private key")]
    MissingKey,

    /// Writing the synthesized image would overwrite the raw payload.
    #[error("output path `{0}` is the input file")]
    OutputIsInput(PathBuf),

    #[error("invalid build id `{0}`: only printable ASCII characters are allowed")]
    InvalidBuildId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
