//! Version 2 of the HAProxy protocol (binary version).
//!
//! See <https://haproxy.org/download/1.8/doc/proxy-protocol.txt>

mod builder;
mod error;
mod model;
mod tlv;

pub use builder::Builder;
pub use error::{BuildError, ParseError};
pub use model::{
    ClientType, Header, Metadata, Ssl, Tlv, Type, ADDRESS_FAMILY_PROTOCOL, CRC32C_LENGTH, LENGTH,
    MINIMUM_LENGTH, MINIMUM_TLV_LENGTH, PROTOCOL_PREFIX, VERSION_COMMAND,
};
pub use tlv::parse_tlvs;

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use nom::bytes::streaming::tag;
use nom::combinator::map;
use nom::number::complete::{be_u128, be_u16 as address_port, be_u32};
use nom::number::streaming::{be_u16, be_u8};
use nom::sequence::tuple;
use nom::{IResult, Needed};

use crate::ip::{IPv4, IPv6, Unix, UNIX_PATH_LENGTH};
use crate::model::{AddressFamily, Addresses, Command, Envelope, Transport, Version};

fn prefix(input: &[u8]) -> IResult<&[u8], &[u8]> {
    tag(PROTOCOL_PREFIX)(input)
}

/// Maps a streaming parser failure onto either an incomplete header or the given error.
fn streaming(error: nom::Err<nom::error::Error<&[u8]>>, terminal: ParseError) -> ParseError {
    match error {
        nom::Err::Incomplete(Needed::Size(size)) => ParseError::Incomplete(size.get()),
        nom::Err::Incomplete(Needed::Unknown) => ParseError::Incomplete(1),
        _ => terminal,
    }
}

fn address_family_protocol(value: u8) -> Result<(AddressFamily, Transport), ParseError> {
    let address_family = match value & 0xF0 {
        0x00 => AddressFamily::Unspecified,
        0x10 => AddressFamily::IPv4,
        0x20 => AddressFamily::IPv6,
        0x30 => AddressFamily::Unix,
        _ => return Err(ParseError::AddressFamily(value)),
    };
    let protocol = match value & 0x0F {
        0x00 => Transport::Unspecified,
        0x01 => Transport::Stream,
        0x02 => Transport::Datagram,
        _ => return Err(ParseError::AddressFamily(value)),
    };

    match (address_family, protocol) {
        (AddressFamily::Unspecified, Transport::Unspecified) => Ok((address_family, protocol)),
        (AddressFamily::Unspecified, _) | (_, Transport::Unspecified) => {
            Err(ParseError::AddressFamily(value))
        }
        _ => Ok((address_family, protocol)),
    }
}

impl TryFrom<&[u8]> for Header {
    type Error = ParseError;

    /// Parses and validates the fixed part of a binary header.
    /// Each field is validated as soon as its byte is available.
    fn try_from(input: &[u8]) -> Result<Self, Self::Error> {
        let (input, _) = prefix(input).map_err(|e| streaming(e, ParseError::Prefix))?;

        let (input, version_command) =
            be_u8(input).map_err(|e| streaming(e, ParseError::Incomplete(1)))?;
        let version = match version_command >> 4 {
            2 => Version::Two,
            version => return Err(ParseError::Version(version)),
        };
        let command = match version_command & 0x0F {
            0x00 => Command::Local,
            0x01 => Command::Proxy,
            command => return Err(ParseError::Command(command)),
        };

        let (input, family_protocol) =
            be_u8(input).map_err(|e| streaming(e, ParseError::Incomplete(1)))?;
        let (address_family, protocol) = address_family_protocol(family_protocol)?;

        let (_, length) = be_u16(input).map_err(|e| streaming(e, ParseError::Incomplete(2)))?;

        if (length as usize) < address_family.address_length() {
            return Err(ParseError::PartialAddresses(
                address_family.address_length(),
                length,
            ));
        }

        Ok(Header {
            version,
            command,
            address_family,
            protocol,
            length,
        })
    }
}

fn ipv4(input: &[u8]) -> IResult<&[u8], IPv4> {
    map(
        tuple((be_u32, be_u32, address_port, address_port)),
        |(source, destination, source_port, destination_port)| {
            IPv4::new(
                SocketAddrV4::new(Ipv4Addr::from(source), source_port),
                SocketAddrV4::new(Ipv4Addr::from(destination), destination_port),
            )
        },
    )(input)
}

fn ipv6(input: &[u8]) -> IResult<&[u8], IPv6> {
    map(
        tuple((be_u128, be_u128, address_port, address_port)),
        |(source, destination, source_port, destination_port)| {
            IPv6::new(
                SocketAddrV6::new(Ipv6Addr::from(source), source_port, 0, 0),
                SocketAddrV6::new(Ipv6Addr::from(destination), destination_port, 0, 0),
            )
        },
    )(input)
}

fn unix(input: &[u8]) -> IResult<&[u8], Unix> {
    map(
        tuple((
            nom::bytes::complete::take(UNIX_PATH_LENGTH),
            nom::bytes::complete::take(UNIX_PATH_LENGTH),
        )),
        |(source, destination): (&[u8], &[u8])| {
            let mut addresses = Unix::new([0; UNIX_PATH_LENGTH], [0; UNIX_PATH_LENGTH]);

            addresses.source.copy_from_slice(source);
            addresses.destination.copy_from_slice(destination);
            addresses
        },
    )(input)
}

/// Parses the fixed-size address block for the given family.
fn parse_addresses(
    address_family: AddressFamily,
    input: &[u8],
) -> Result<Addresses, ParseError> {
    let partial =
        |_| ParseError::PartialAddresses(address_family.address_length(), input.len() as u16);

    let addresses = match address_family {
        AddressFamily::Unspecified => Addresses::Unspecified,
        AddressFamily::IPv4 => ipv4(input).map_err(partial)?.1.into(),
        AddressFamily::IPv6 => ipv6(input).map_err(partial)?.1.into(),
        AddressFamily::Unix => unix(input).map_err(partial)?.1.into(),
    };

    Ok(addresses)
}

/// Parses the variable part of a binary header whose fixed part has been validated.
/// `input` must hold exactly `header.len()` bytes.
pub(crate) fn parse_body(input: &[u8], header: &Header) -> Result<Envelope, ParseError> {
    let addresses = parse_addresses(
        header.address_family,
        &input[MINIMUM_LENGTH..header.tlvs_start()],
    )?;
    let metadata = parse_tlvs(input, header.tlvs_start()..header.len())?;

    let envelope = match header.command {
        Command::Local => Envelope {
            metadata,
            ..Envelope::local(Version::Two)
        },
        Command::Proxy => Envelope {
            version: header.version,
            command: header.command,
            family: header.address_family,
            transport: header.protocol,
            addresses,
            metadata,
        },
    };

    Ok(envelope)
}

/// Parses a complete binary header from the start of `input`.
/// Returns the envelope and the length of the header in bytes.
///
/// ## Examples
/// ```rust
/// use std::net::SocketAddr;
/// use ppa::v2::{self, Builder};
/// use ppa::{Command, Transport};
///
/// let source: SocketAddr = "192.0.2.1:1234".parse().unwrap();
/// let destination: SocketAddr = "192.0.2.2:5678".parse().unwrap();
/// let addresses = (source, destination);
/// let header = Builder::with_addresses(Command::Proxy, Transport::Stream, addresses)
///     .write_crc32c()
///     .build()
///     .unwrap();
/// let (envelope, length) = v2::parse(&header).unwrap();
///
/// assert_eq!(length, header.len());
/// assert_eq!(envelope.source(), Some("192.0.2.1:1234".parse().unwrap()));
/// assert!(envelope.checksum().is_some());
/// ```
pub fn parse(input: &[u8]) -> Result<(Envelope, usize), ParseError> {
    let header = Header::try_from(input)?;
    let available = input.len() - MINIMUM_LENGTH;

    if available < header.length() {
        return Err(ParseError::Partial(header.length, available));
    }

    let envelope = parse_body(&input[..header.len()], &header)?;

    Ok((envelope, header.len()))
}
