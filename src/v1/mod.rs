//! Version 1 of the HAProxy protocol (text version).
//!
//! See <https://haproxy.org/download/1.8/doc/proxy-protocol.txt>

mod error;
mod model;

pub use error::ParseError;
pub use model::{Addresses, Header, TCP4, TCP6, UNKNOWN};
use model::{PROTOCOL_PREFIX, PROTOCOL_SUFFIX, SEPARATOR};
use std::net::{AddrParseError, Ipv4Addr, Ipv6Addr};
use std::str::{from_utf8, FromStr};

const ZERO: &str = "0";

/// The maximum length of a header in bytes, including the line terminator.
pub const MAX_LENGTH: usize = 107;
/// The bytes every text header starts with.
pub const PREFIX: &[u8] = b"PROXY ";
/// The total number of parts in the header.
const PARTS: usize = 6;

/// Parses the addresses and ports from a PROXY protocol header for IPv4 and IPv6.
fn parse_addresses<'a, T: FromStr<Err = AddrParseError>, I: Iterator<Item = &'a str>>(
    iterator: &mut I,
) -> Result<(T, T, u16, u16), ParseError> {
    let source_address = iterator.next().ok_or(ParseError::MissingSourceAddress)?;
    let destination_address = iterator
        .next()
        .ok_or(ParseError::MissingDestinationAddress)?;
    let source_port = iterator.next().ok_or(ParseError::MissingSourcePort)?;
    let destination_port = iterator.next().ok_or(ParseError::MissingDestinationPort)?;

    let source_address = source_address
        .parse::<T>()
        .map_err(ParseError::InvalidSourceAddress)?;
    let destination_address = destination_address
        .parse::<T>()
        .map_err(ParseError::InvalidDestinationAddress)?;

    if source_port.starts_with(ZERO) && source_port != ZERO {
        return Err(ParseError::InvalidSourcePort(None));
    }

    let source_port = source_port
        .parse::<u16>()
        .map_err(|e| ParseError::InvalidSourcePort(Some(e)))?;

    if destination_port.starts_with(ZERO) && destination_port != ZERO {
        return Err(ParseError::InvalidDestinationPort(None));
    }

    let destination_port = destination_port
        .parse::<u16>()
        .map_err(|e| ParseError::InvalidDestinationPort(Some(e)))?;

    Ok((
        source_address,
        destination_address,
        source_port,
        destination_port,
    ))
}

/// Parses a text PROXY protocol header.
/// The given string is expected to only include the header and to end in \r\n.
fn parse_header<'a>(header_stripped: &'a str, header: &'a str) -> Result<Header<'a>, ParseError> {
    if header.len() > MAX_LENGTH {
        return Err(ParseError::HeaderTooLong);
    }

    let mut iterator = header_stripped.splitn(PARTS, SEPARATOR);

    if Some(PROTOCOL_PREFIX) != iterator.next() {
        return Err(ParseError::InvalidPrefix);
    }

    let addresses = match iterator.next() {
        Some(TCP4) => {
            let (source_address, destination_address, source_port, destination_port) =
                parse_addresses::<Ipv4Addr, _>(&mut iterator)?;

            Addresses::new_tcp4(
                source_address,
                destination_address,
                source_port,
                destination_port,
            )
        }
        Some(TCP6) => {
            let (source_address, destination_address, source_port, destination_port) =
                parse_addresses::<Ipv6Addr, _>(&mut iterator)?;

            Addresses::new_tcp6(
                source_address,
                destination_address,
                source_port,
                destination_port,
            )
        }
        Some(UNKNOWN) => {
            while iterator.next().is_some() {}

            Addresses::Unknown
        }
        Some(protocol) if !protocol.is_empty() => return Err(ParseError::InvalidProtocol),
        _ => return Err(ParseError::MissingProtocol),
    };

    if iterator.next().is_some() {
        return Err(ParseError::UnexpectedCharacters);
    }

    Ok(Header { header, addresses })
}

/// Finds the length of the header line, scanning from `offset`.
///
/// Only the first `MAX_LENGTH` bytes are searched. A line feed that is not preceded by a
/// carriage return is rejected as soon as it is seen.
pub(crate) fn header_length(input: &[u8], offset: usize) -> Result<usize, ParseError> {
    let limit = input.len().min(MAX_LENGTH);
    let start = offset.min(limit);

    match input[start..limit].iter().position(|b| *b == b'\n') {
        Some(position) => {
            let end = start + position;

            if end == 0 || input[end - 1] != b'\r' {
                Err(ParseError::InvalidSuffix)
            } else {
                Ok(end + 1)
            }
        }
        None if input.len() >= MAX_LENGTH => Err(ParseError::HeaderTooLong),
        None => Err(ParseError::MissingNewLine),
    }
}

/// Parses the header line of the given length from the start of `input`.
pub(crate) fn parse_line(input: &[u8], length: usize) -> Result<Header<'_>, ParseError> {
    let header = from_utf8(&input[..length])?;
    let end = length - PROTOCOL_SUFFIX.len();

    parse_header(&header[..end], header)
}

impl<'a> TryFrom<&'a str> for Header<'a> {
    type Error = ParseError;

    fn try_from(input: &'a str) -> Result<Self, Self::Error> {
        Header::try_from(input.as_bytes())
    }
}

impl<'a> TryFrom<&'a [u8]> for Header<'a> {
    type Error = ParseError;

    fn try_from(input: &'a [u8]) -> Result<Self, Self::Error> {
        let length = header_length(input, 0)?;

        parse_line(input, length)
    }
}

impl FromStr for Addresses {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Header::try_from(s)?.addresses)
    }
}
