use crate::checksum;
use crate::model::{Addresses, Command, Transport, Version};
use crate::v2::error::BuildError;
use crate::v2::model::{
    write_tlv, Metadata, Type, CRC32C_LENGTH, LENGTH, MINIMUM_LENGTH, MINIMUM_TLV_LENGTH,
    PROTOCOL_PREFIX,
};

/// Writes a binary header.
///
/// ## Examples
/// ```rust
/// use ppa::v2::Builder;
/// use ppa::{AddressFamily, Command, Transport, Version};
///
/// let header = Builder::new(
///     Version::Two | Command::Local,
///     AddressFamily::Unspecified | Transport::Unspecified,
/// )
/// .build()
/// .unwrap();
///
/// assert_eq!(header.len(), 16);
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    header: Vec<u8>,
    checksum: Option<usize>,
}

impl Builder {
    /// Starts a header with the given version/command and address family/protocol bytes.
    pub fn new(version_command: u8, address_family_protocol: u8) -> Self {
        let mut header = Vec::with_capacity(MINIMUM_LENGTH);

        header.extend(PROTOCOL_PREFIX);
        header.push(version_command);
        header.push(address_family_protocol);
        header.extend([0, 0]);

        Builder {
            header,
            checksum: None,
        }
    }

    /// Starts a version 2 header for the given addresses.
    pub fn with_addresses<T: Into<Addresses>>(
        command: Command,
        protocol: Transport,
        addresses: T,
    ) -> Self {
        let addresses = addresses.into();

        Builder::new(
            Version::Two | command,
            addresses.family() | protocol,
        )
        .write_addresses(addresses)
    }

    pub fn write_addresses(mut self, addresses: Addresses) -> Self {
        match addresses {
            Addresses::Unspecified => (),
            Addresses::IPv4(a) => {
                self.header.extend(a.source.ip().octets());
                self.header.extend(a.destination.ip().octets());
                self.header.extend(a.source.port().to_be_bytes());
                self.header.extend(a.destination.port().to_be_bytes());
            }
            Addresses::IPv6(a) => {
                self.header.extend(a.source.ip().octets());
                self.header.extend(a.destination.ip().octets());
                self.header.extend(a.source.port().to_be_bytes());
                self.header.extend(a.destination.port().to_be_bytes());
            }
            Addresses::Unix(a) => {
                self.header.extend(a.source);
                self.header.extend(a.destination);
            }
        }

        self
    }

    /// Appends a raw entry.
    pub fn write_tlv(mut self, kind: u8, value: &[u8]) -> Result<Self, BuildError> {
        if value.len() > u16::MAX as usize {
            return Err(BuildError::TlvTooLong(kind, value.len()));
        }

        write_tlv(&mut self.header, kind, value);

        Ok(self)
    }

    pub fn write_metadata(self, metadata: &Metadata) -> Result<Self, BuildError> {
        let tlv = metadata.to_tlv();

        self.write_tlv(tlv.kind, &tlv.value)
    }

    /// Appends a CRC32C entry whose value is computed over the finished header.
    pub fn write_crc32c(mut self) -> Self {
        self.checksum = Some(self.header.len() + MINIMUM_TLV_LENGTH);
        write_tlv(&mut self.header, Type::CRC32C as u8, &[0; CRC32C_LENGTH]);

        self
    }

    /// Fills in the length and any checksum.
    pub fn build(mut self) -> Result<Vec<u8>, BuildError> {
        let length = self.header.len() - MINIMUM_LENGTH;
        let length = u16::try_from(length).map_err(|_| BuildError::TooLong(length))?;

        self.header[LENGTH..MINIMUM_LENGTH].copy_from_slice(&length.to_be_bytes());

        if let Some(offset) = self.checksum {
            let field = offset..offset + CRC32C_LENGTH;
            let crc = checksum::checksum_without(&self.header, field.clone());

            self.header[field].copy_from_slice(&crc.to_be_bytes());
        }

        Ok(self.header)
    }
}
