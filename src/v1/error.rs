//! Errors for the text proxy protocol.

use crate::error::ErrorKind;

/// An error in parsing a text PROXY protocol header.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Header must start with 'PROXY'.")]
    InvalidPrefix,
    #[error("Header does not end with the string '\\r\\n'.")]
    MissingNewLine,
    #[error("Header missing protocol.")]
    MissingProtocol,
    #[error("Header missing source address.")]
    MissingSourceAddress,
    #[error("Header missing destination address.")]
    MissingDestinationAddress,
    #[error("Header missing source port.")]
    MissingSourcePort,
    #[error("Header missing destination port.")]
    MissingDestinationPort,
    #[error("Header does not fit within the maximum length of 107 bytes.")]
    HeaderTooLong,
    #[error("Header has an invalid protocol.")]
    InvalidProtocol,
    #[error("Header must end in '\\r\\n'.")]
    InvalidSuffix,
    #[error("Header contains unexpected characters after the destination port.")]
    UnexpectedCharacters,
    #[error("Header is not valid UTF-8.")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Header contains invalid IP address for the source.")]
    InvalidSourceAddress(#[source] std::net::AddrParseError),
    #[error("Header contains invalid IP address for the destination.")]
    InvalidDestinationAddress(#[source] std::net::AddrParseError),
    #[error("Header contains invalid TCP port for the source.")]
    InvalidSourcePort(#[source] Option<std::num::ParseIntError>),
    #[error("Header contains invalid TCP port for the destination.")]
    InvalidDestinationPort(#[source] Option<std::num::ParseIntError>),
}

impl ParseError {
    /// The category of this failure.
    ///
    /// A header that reached the maximum length without a line terminator is an underflow;
    /// every malformed token is a header mismatch.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::HeaderTooLong | ParseError::MissingNewLine => ErrorKind::Underflow,
            _ => ErrorKind::HeaderMismatch,
        }
    }
}
