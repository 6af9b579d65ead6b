//! The version-independent representation of a decoded header.

use std::net::SocketAddr;
use std::ops::BitOr;

use crate::ip::{IPv4, IPv6, Unix};
use crate::v2::{Metadata, Ssl, Tlv};

/// The version of the proxy protocol header.
#[derive(Debug, Eq, PartialEq, PartialOrd, Ord, Copy, Clone, Hash)]
pub enum Version {
    One = 1,
    Two = 2,
}

/// The type of connection received by the server from the proxy.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum Command {
    /// The connection was established by the proxy itself; addresses are not relayed.
    Local = 0,
    /// The connection was established on behalf of another node.
    Proxy = 1,
}

/// The address family of the original connection.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum AddressFamily {
    Unspecified = 0x00,
    IPv4 = 0x10,
    IPv6 = 0x20,
    Unix = 0x30,
}

impl AddressFamily {
    /// The fixed size of the binary address block for this family.
    pub fn address_length(&self) -> usize {
        match self {
            AddressFamily::Unspecified => 0,
            AddressFamily::IPv4 => 12,
            AddressFamily::IPv6 => 36,
            AddressFamily::Unix => 216,
        }
    }
}

/// The transport protocol of the original connection.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum Transport {
    Unspecified = 0x00,
    Stream = 0x01,
    Datagram = 0x02,
}

impl BitOr<Command> for Version {
    type Output = u8;

    fn bitor(self, command: Command) -> Self::Output {
        ((self as u8) << 4) | command as u8
    }
}

impl BitOr<Transport> for AddressFamily {
    type Output = u8;

    fn bitor(self, transport: Transport) -> Self::Output {
        self as u8 | transport as u8
    }
}

/// The source and destination of the original connection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Addresses {
    Unspecified,
    IPv4(IPv4),
    IPv6(IPv6),
    Unix(Unix),
}

impl Addresses {
    /// The address family these addresses belong to.
    pub fn family(&self) -> AddressFamily {
        match self {
            Addresses::Unspecified => AddressFamily::Unspecified,
            Addresses::IPv4(..) => AddressFamily::IPv4,
            Addresses::IPv6(..) => AddressFamily::IPv6,
            Addresses::Unix(..) => AddressFamily::Unix,
        }
    }

    /// The length of these addresses in a binary header.
    pub fn len(&self) -> usize {
        self.family().address_length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Addresses {
    fn default() -> Self {
        Addresses::Unspecified
    }
}

impl From<IPv4> for Addresses {
    fn from(addresses: IPv4) -> Self {
        Addresses::IPv4(addresses)
    }
}

impl From<IPv6> for Addresses {
    fn from(addresses: IPv6) -> Self {
        Addresses::IPv6(addresses)
    }
}

impl From<Unix> for Addresses {
    fn from(addresses: Unix) -> Self {
        Addresses::Unix(addresses)
    }
}

impl From<(SocketAddr, SocketAddr)> for Addresses {
    /// Mixed families cannot be expressed in a header and map to `Unspecified`.
    fn from(addresses: (SocketAddr, SocketAddr)) -> Self {
        match addresses {
            (SocketAddr::V4(source), SocketAddr::V4(destination)) => {
                Addresses::IPv4(IPv4::new(source, destination))
            }
            (SocketAddr::V6(source), SocketAddr::V6(destination)) => {
                Addresses::IPv6(IPv6::new(source, destination))
            }
            _ => Addresses::Unspecified,
        }
    }
}

/// A fully decoded PROXY protocol header.
///
/// ## Examples
/// ```rust
/// use ppa::decoder::{attempt, Decision, DecodeProgress};
/// use ppa::{AddressFamily, Command, Version};
///
/// let input = b"PROXY TCP4 192.0.2.1 192.0.2.2 1234 5678\r\nhello";
/// let mut progress = DecodeProgress::new();
///
/// match attempt(input, &mut progress) {
///     Decision::Decoded(envelope, consumed) => {
///         assert_eq!(envelope.version, Version::One);
///         assert_eq!(envelope.command, Command::Proxy);
///         assert_eq!(envelope.family, AddressFamily::IPv4);
///         assert_eq!(envelope.source(), Some("192.0.2.1:1234".parse().unwrap()));
///         assert_eq!(&input[consumed..], b"hello");
///     }
///     decision => panic!("unexpected {:?}", decision),
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub version: Version,
    pub command: Command,
    pub family: AddressFamily,
    pub transport: Transport,
    pub addresses: Addresses,
    pub metadata: Vec<Metadata>,
}

impl Envelope {
    /// An envelope for a connection made by the proxy itself.
    pub fn local(version: Version) -> Self {
        Envelope {
            version,
            command: Command::Local,
            family: AddressFamily::Unspecified,
            transport: Transport::Unspecified,
            addresses: Addresses::Unspecified,
            metadata: Vec::new(),
        }
    }

    /// Tests whether addresses were relayed with this envelope.
    pub fn is_local(&self) -> bool {
        self.command == Command::Local
    }

    /// The address of the original client, for IP families.
    pub fn source(&self) -> Option<SocketAddr> {
        match &self.addresses {
            Addresses::IPv4(a) => Some(a.source_addr()),
            Addresses::IPv6(a) => Some(a.source_addr()),
            _ => None,
        }
    }

    /// The address the original client connected to, for IP families.
    pub fn destination(&self) -> Option<SocketAddr> {
        match &self.addresses {
            Addresses::IPv4(a) => Some(a.destination_addr()),
            Addresses::IPv6(a) => Some(a.destination_addr()),
            _ => None,
        }
    }

    pub fn alpn(&self) -> Option<&[u8]> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Alpn(alpn) => Some(alpn.as_slice()),
            _ => None,
        })
    }

    pub fn authority(&self) -> Option<&str> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Authority(authority) => Some(authority.as_str()),
            _ => None,
        })
    }

    pub fn unique_id(&self) -> Option<&[u8]> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::UniqueId(id) => Some(id.as_slice()),
            _ => None,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Namespace(namespace) => Some(namespace.as_str()),
            _ => None,
        })
    }

    pub fn ssl(&self) -> Option<&Ssl> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Ssl(ssl) => Some(ssl),
            _ => None,
        })
    }

    /// The verified CRC32C checksum of the header, if it carried one.
    pub fn checksum(&self) -> Option<u32> {
        self.metadata.iter().find_map(|m| match m {
            Metadata::Crc32c(checksum) => Some(*checksum),
            _ => None,
        })
    }

    /// The entries whose types are not known to this crate, in header order.
    pub fn opaque(&self) -> impl Iterator<Item = &Tlv> {
        self.metadata.iter().filter_map(|m| match m {
            Metadata::Opaque(tlv) => Some(tlv),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn version_command() {
        assert_eq!(Version::Two | Command::Local, 0x20);
        assert_eq!(Version::Two | Command::Proxy, 0x21);
    }

    #[test]
    fn family_transport() {
        assert_eq!(AddressFamily::Unspecified | Transport::Unspecified, 0x00);
        assert_eq!(AddressFamily::IPv4 | Transport::Stream, 0x11);
        assert_eq!(AddressFamily::IPv6 | Transport::Datagram, 0x22);
        assert_eq!(AddressFamily::Unix | Transport::Stream, 0x31);
    }

    #[test]
    fn mixed_socket_addresses_are_unspecified() {
        let source: SocketAddr = "127.0.0.1:80".parse().unwrap();
        let destination: SocketAddr = "[::1]:443".parse().unwrap();

        assert_eq!(Addresses::from((source, destination)), Addresses::Unspecified);
    }

    #[test]
    fn local_envelope_has_no_addresses() {
        let envelope = Envelope::local(Version::Two);

        assert!(envelope.is_local());
        assert_eq!(envelope.source(), None);
        assert_eq!(envelope.destination(), None);
        assert_eq!(envelope.checksum(), None);
    }

    #[test]
    fn accessors_find_metadata() {
        let envelope = Envelope {
            version: Version::Two,
            command: Command::Proxy,
            family: AddressFamily::IPv4,
            transport: Transport::Stream,
            addresses: IPv4::new(
                SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 1), 1234),
                SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 2), 5678),
            )
            .into(),
            metadata: vec![
                Metadata::Alpn(b"h2".to_vec()),
                Metadata::Authority("example.com".to_string()),
                Metadata::Opaque(Tlv::new(0xE1, vec![1, 2])),
            ],
        };

        assert_eq!(envelope.alpn(), Some(&b"h2"[..]));
        assert_eq!(envelope.authority(), Some("example.com"));
        assert_eq!(envelope.destination(), Some("192.0.2.2:5678".parse().unwrap()));
        assert_eq!(envelope.opaque().count(), 1);
        assert_eq!(envelope.namespace(), None);
    }
}
