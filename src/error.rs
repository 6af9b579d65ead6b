//! Errors shared by every layer of the adapter.
//!
//! The text and binary parsers report detailed failures (see [`crate::v1::ParseError`] and
//! [`crate::v2::ParseError`]); each of them collapses onto an [`ErrorKind`], the coarse
//! category that decides how a connection is torn down.

use crate::{v1, v2};

/// The category of a connection failure.
#[derive(thiserror::Error, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("Header signature or keyword is not recognized.")]
    HeaderMismatch,
    #[error("Header version is not supported.")]
    HeaderVersionMismatch,
    #[error("Header command must be one of: Local, Proxy.")]
    CommandMismatch,
    #[error("Header address family and transport do not form a supported combination.")]
    AddressFamilyMismatch,
    #[error("Header declares more data than is available.")]
    Underflow,
    #[error("Header declares a field larger than its enclosing region.")]
    Overflow,
    #[error("Header checksum does not match its contents.")]
    ChecksumMismatch,
    #[error("No route matches the decoded header.")]
    RouteNotFound,
    #[error("Header was not received in time.")]
    Timeout,
}

/// How an endpoint is torn down when a connection fails.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Refuse the stream immediately; no further bytes are accepted.
    Reset,
    /// Cut the stream off without a graceful close.
    Abort,
}

impl ErrorKind {
    /// Malformed or unroutable input resets the network endpoint; a timeout aborts it.
    pub fn termination(&self) -> Termination {
        match self {
            ErrorKind::Timeout => Termination::Abort,
            _ => Termination::Reset,
        }
    }
}

/// The reason the decoder rejected the bytes received so far.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("Header does not start with a PROXY protocol signature.")]
    Signature,
    #[error(transparent)]
    Text(#[from] v1::ParseError),
    #[error(transparent)]
    Binary(#[from] v2::ParseError),
    #[error("Stream ended with an incomplete header ({0} bytes buffered).")]
    Truncated(usize),
    #[error("Header did not complete within the {0} byte ingest limit.")]
    Exhausted(usize),
}

impl DecodeError {
    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DecodeError::Signature => ErrorKind::HeaderMismatch,
            DecodeError::Text(error) => error.kind(),
            DecodeError::Binary(error) => error.kind(),
            DecodeError::Truncated(..) | DecodeError::Exhausted(..) => ErrorKind::Underflow,
        }
    }
}

/// Why a stream pair refused a connection before an application stream was opened.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Rejection {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("No route matches the decoded header.")]
    RouteNotFound,
    #[error("Header was not received within {0:?}.")]
    Timeout(std::time::Duration),
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::Decode(error) => error.kind(),
            Rejection::RouteNotFound => ErrorKind::RouteNotFound,
            Rejection::Timeout(..) => ErrorKind::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn timeout_aborts() {
        assert_eq!(ErrorKind::Timeout.termination(), Termination::Abort);
        assert_eq!(
            Rejection::Timeout(Duration::from_secs(1)).kind().termination(),
            Termination::Abort
        );
    }

    #[test]
    fn structural_errors_reset() {
        for kind in [
            ErrorKind::HeaderMismatch,
            ErrorKind::HeaderVersionMismatch,
            ErrorKind::CommandMismatch,
            ErrorKind::AddressFamilyMismatch,
            ErrorKind::Underflow,
            ErrorKind::Overflow,
            ErrorKind::ChecksumMismatch,
            ErrorKind::RouteNotFound,
        ] {
            assert_eq!(kind.termination(), Termination::Reset, "{:?}", kind);
        }
    }

    #[test]
    fn truncated_and_exhausted_underflow() {
        assert_eq!(DecodeError::Truncated(3).kind(), ErrorKind::Underflow);
        assert_eq!(DecodeError::Exhausted(16).kind(), ErrorKind::Underflow);
        assert_eq!(DecodeError::Signature.kind(), ErrorKind::HeaderMismatch);
    }
}
