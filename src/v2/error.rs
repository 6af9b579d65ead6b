use crate::error::ErrorKind;

/// An error in parsing a binary PROXY protocol header.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Header is incomplete; at least {0} more bytes are required.")]
    Incomplete(usize),
    #[error("Expected header to start with a prefix of '\\r\\n\\r\\n\\0\\r\\nQUIT\\n'.")]
    Prefix,
    #[error("Expected version {0:X} to be equal to 2.")]
    Version(u8),
    #[error("Invalid command {0:X}. Command must be one of: Local, Proxy.")]
    Command(u8),
    #[error("Invalid address family and protocol {0:#04X}.")]
    AddressFamily(u8),
    #[error("Header length of {1} bytes cannot contain the {0} bytes of addresses.")]
    PartialAddresses(usize, u16),
    #[error("Header does not contain the advertised length of the addresses and TLVs (contains {1} out of {0} bytes).")]
    Partial(u16, usize),
    #[error("Header is not long enough to contain TLV {0:#04X} with length {1}.")]
    InvalidTLV(u8, u16),
    #[error("Header contains leftover {0} bytes not accounted for by the address family or TLVs.")]
    LeftoverTLVs(usize),
    #[error("TLV {kind:#04X} with length {length} is shorter than the required {required} bytes.")]
    TlvUnderflow { kind: u8, length: u16, required: u16 },
    #[error("TLV {kind:#04X} with length {length} is longer than the allowed {maximum} bytes.")]
    TlvOverflow { kind: u8, length: u16, maximum: u16 },
    #[error("TLV {0:#04X} is not valid UTF-8.")]
    InvalidUtf8(u8),
    #[error("Header checksum {expected:#010X} does not match the computed {actual:#010X}.")]
    Checksum { expected: u32, actual: u32 },
}

impl ParseError {
    /// The category of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::Prefix | ParseError::InvalidUtf8(..) => ErrorKind::HeaderMismatch,
            ParseError::Version(..) => ErrorKind::HeaderVersionMismatch,
            ParseError::Command(..) => ErrorKind::CommandMismatch,
            ParseError::AddressFamily(..) => ErrorKind::AddressFamilyMismatch,
            ParseError::Incomplete(..)
            | ParseError::Partial(..)
            | ParseError::PartialAddresses(..)
            | ParseError::LeftoverTLVs(..)
            | ParseError::TlvUnderflow { .. } => ErrorKind::Underflow,
            ParseError::InvalidTLV(..) | ParseError::TlvOverflow { .. } => ErrorKind::Overflow,
            ParseError::Checksum { .. } => ErrorKind::ChecksumMismatch,
        }
    }
}

/// An error in writing a binary PROXY protocol header.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("Header length of {0} bytes after the fixed part exceeds the maximum of 65535.")]
    TooLong(usize),
    #[error("TLV {0:#04X} with a value of {1} bytes exceeds the maximum of 65535.")]
    TlvTooLong(u8, usize),
}
