//! Error taxonomy (§7). Every fallible operation in this crate returns
//! `Result<T, DpfError>`; no panics on caller-supplied input.
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DpfError {
    /// A parameter-list rule violation, an out-of-domain α/β, a prefix that
    /// doesn't extend a prior prefix, a width mismatch, or similar caller
    /// misuse (§4.1, §4.3, §4.4, §7).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `element_bitsize` not in `{1,2,4,8,16,32,64,128}`.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A cryptographic primitive (the PRG backend) reported an error.
    #[error("internal error: {0}")]
    Internal(String),

    /// `EvaluateNext` called with non-empty prefixes on the first call, or
    /// after the last hierarchy has been consumed.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
}
