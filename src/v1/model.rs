use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddrV4, SocketAddrV6};

use crate::ip::{IPv4, IPv6};
use crate::model::{self, AddressFamily, Command, Envelope, Transport, Version};

pub const PROTOCOL_SUFFIX: &str = "\r\n";
pub const PROTOCOL_PREFIX: &str = "PROXY";
pub const TCP4: &str = "TCP4";
pub const TCP6: &str = "TCP6";
pub const UNKNOWN: &str = "UNKNOWN";

/// The sperator of the header parts.
pub const SEPARATOR: char = ' ';

/// A text PROXY protocol header that borrows the input string.
///
/// ## Examples
/// ### UNKNOWN
/// ```rust
/// use ppa::v1::{Addresses, Header, UNKNOWN};
///
/// let input = "PROXY UNKNOWN\r\nhello";
/// let header = Header::try_from(input).unwrap();
///
/// assert_eq!(header, Header::new("PROXY UNKNOWN\r\n", Addresses::Unknown));
/// assert_eq!(header.protocol(), UNKNOWN);
/// assert_eq!(header.len(), 15);
/// ```
///
/// ### TCP4
/// ```rust
/// use std::net::Ipv4Addr;
/// use ppa::v1::{Header, Addresses, TCP4};
///
/// let input = "PROXY TCP4 127.0.1.2 192.168.1.101 80 443\r\n";
/// let header = Header::try_from(input).unwrap();
///
/// assert_eq!(header, Header::new(input, Addresses::new_tcp4(Ipv4Addr::new(127, 0, 1, 2), Ipv4Addr::new(192, 168, 1, 101), 80, 443)));
/// assert_eq!(header.protocol(), TCP4);
/// ```
#[derive(Debug, PartialEq)]
pub struct Header<'a> {
    pub header: &'a str,
    pub addresses: Addresses,
}

impl<'a> Header<'a> {
    /// Creates a new `Header` with the given addresses and a reference to the original input.
    pub fn new(header: &'a str, addresses: Addresses) -> Self {
        Header { header, addresses }
    }

    /// The protocol portion of this `Header`.
    pub fn protocol(&self) -> &str {
        self.addresses.protocol()
    }

    /// The length of this `Header` in bytes, including the line terminator.
    pub fn len(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }
}

/// The source and destination of a header.
/// Includes IP (v4 or v6) addresses and TCP ports.
///
/// ## Examples
/// ```rust
/// use std::net::Ipv4Addr;
/// use ppa::v1::Addresses;
///
/// let header = "PROXY TCP4 127.0.1.2 192.168.1.101 80 443\r\n";
/// let addresses = Addresses::new_tcp4(Ipv4Addr::new(127, 0, 1, 2), Ipv4Addr::new(192, 168, 1, 101), 80, 443);
///
/// assert_eq!(addresses, header.parse().unwrap());
/// assert_eq!(addresses.to_string().as_str(), header);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Addresses {
    Unknown,
    Tcp4(IPv4),
    Tcp6(IPv6),
}

impl Addresses {
    /// Create a new IPv4 TCP address.
    pub fn new_tcp4(
        source_address: Ipv4Addr,
        destination_address: Ipv4Addr,
        source_port: u16,
        destination_port: u16,
    ) -> Self {
        Addresses::Tcp4(IPv4::new(
            SocketAddrV4::new(source_address, source_port),
            SocketAddrV4::new(destination_address, destination_port),
        ))
    }

    /// Create a new IPv6 TCP address.
    pub fn new_tcp6(
        source_address: Ipv6Addr,
        destination_address: Ipv6Addr,
        source_port: u16,
        destination_port: u16,
    ) -> Self {
        Addresses::Tcp6(IPv6::new(
            SocketAddrV6::new(source_address, source_port, 0, 0),
            SocketAddrV6::new(destination_address, destination_port, 0, 0),
        ))
    }

    /// The protocol portion of this `Addresses`.
    pub fn protocol(&self) -> &str {
        match self {
            Addresses::Tcp4(..) => TCP4,
            Addresses::Tcp6(..) => TCP6,
            Addresses::Unknown => UNKNOWN,
        }
    }
}

impl Default for Addresses {
    fn default() -> Self {
        Addresses::Unknown
    }
}

impl<'a> From<Header<'a>> for Envelope {
    fn from(header: Header<'a>) -> Self {
        let (family, addresses) = match header.addresses {
            Addresses::Unknown => return Envelope::local(Version::One),
            Addresses::Tcp4(a) => (AddressFamily::IPv4, model::Addresses::IPv4(a)),
            Addresses::Tcp6(a) => (AddressFamily::IPv6, model::Addresses::IPv6(a)),
        };

        Envelope {
            version: Version::One,
            command: Command::Proxy,
            family,
            transport: Transport::Stream,
            addresses,
            metadata: Vec::new(),
        }
    }
}

impl<'a> fmt::Display for Header<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header)
    }
}

impl fmt::Display for Addresses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PROXY ")?;

        match self {
            Self::Unknown => write!(f, "UNKNOWN")?,
            Self::Tcp4(a) => write!(
                f,
                "TCP4 {} {} {} {}",
                a.source.ip(),
                a.destination.ip(),
                a.source.port(),
                a.destination.port()
            )?,
            Self::Tcp6(a) => write!(
                f,
                "TCP6 {} {} {} {}",
                a.source.ip(),
                a.destination.ip(),
                a.source.port(),
                a.destination.port()
            )?,
        }

        write!(f, "\r\n")
    }
}
