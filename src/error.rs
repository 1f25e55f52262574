use std::io;
use thiserror::Error;

/// Errors surfaced by the container engine.
///
/// Encode-side codec failures never appear here: the block pipeline
/// recovers them locally by storing the block uncompressed.  A decode-side
/// codec failure means the payload cannot reproduce bytes matching the
/// stored CRC, so it is reported as [`TzpError::BlockChecksumMismatch`].
#[derive(Error, Debug)]
pub enum TzpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt metadata section: {0}")]
    CorruptMetadata(String),

    #[error("malformed block index: {0}")]
    MalformedIndex(String),

    #[error("checksum mismatch in block {index}")]
    BlockChecksumMismatch { index: usize },

    #[error("global checksum mismatch: decoded output does not match the original input")]
    GlobalChecksumMismatch,

    #[error("operation cancelled")]
    Cancelled,
}

impl TzpError {
    /// Process exit code for the CLI: 2 for I/O trouble, 3 for anything
    /// that means the input container cannot be trusted, 4 for
    /// cancellation.  Usage errors (exit 1) never reach this type.
    pub fn exit_code(&self) -> i32 {
        match self {
            TzpError::Io(_) => 2,
            TzpError::Cancelled => 4,
            _ => 3,
        }
    }
}
