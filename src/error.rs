//! Crate-wide error type.
//!
//! Every fallible operation in the codec surfaces one of these variants. None of them
//! are retried internally -- the caller owns recovery, per the protocol's synchronous
//! pack/unpack model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlrpError {
  /// The schema record itself was malformed or internally inconsistent.
  #[error("schema error: {0}")]
  Schema(String),

  /// A constructed instance failed validation: bad range, unknown enum member, wrong
  /// child cardinality, or wrong child ordering.
  #[error("validation error at {path}: {reason}")]
  Validation { path: String, reason: String },

  /// Wire bytes did not parse: type-code mismatch, oversized length, non-UTF-8 string,
  /// or a frame that ran out of bytes before its declared length.
  #[error("decode error: {0}")]
  Decode(String),

  /// An instance that passed validation still could not be serialized.
  #[error("encode error: {0}")]
  Encode(String),

  /// The socket returned zero bytes twice in a row before the needed read completed.
  #[error("LLRP socket connection broken")]
  ConnectionBroken,

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LlrpError>;

impl LlrpError {
  pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
    LlrpError::Validation { path: path.into(), reason: reason.into() }
  }
}
