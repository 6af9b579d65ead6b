use crate::model::{AddressFamily, Command, Transport, Version};

/// The prefix of every binary header.
pub const PROTOCOL_PREFIX: &[u8] = b"\r\n\r\n\0\r\nQUIT\n";
pub const VERSION_COMMAND: usize = PROTOCOL_PREFIX.len();
pub const ADDRESS_FAMILY_PROTOCOL: usize = VERSION_COMMAND + 1;
pub const LENGTH: usize = ADDRESS_FAMILY_PROTOCOL + 1;
pub const MINIMUM_LENGTH: usize = LENGTH + 2;
/// The size of a TLV's type and length fields.
pub const MINIMUM_TLV_LENGTH: usize = 3;
/// The maximum length of a unique id value.
pub const MAXIMUM_UNIQUE_ID_LENGTH: usize = 128;
/// The length of a CRC32C value.
pub const CRC32C_LENGTH: usize = 4;
/// The client flags byte and the verify result that start every SSL value.
pub const SSL_FIXED_LENGTH: usize = 5;

/// The validated fixed part of a binary header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: Version,
    pub command: Command,
    pub address_family: AddressFamily,
    pub protocol: Transport,
    /// The number of bytes following the fixed part.
    pub length: u16,
}

impl Header {
    /// The length of the variable part of the header.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// The total length of the header, including the fixed part.
    pub fn len(&self) -> usize {
        MINIMUM_LENGTH + self.length()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The offset of the first TLV.
    pub fn tlvs_start(&self) -> usize {
        MINIMUM_LENGTH + self.address_family.address_length()
    }
}

/// The registered TLV type codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    ALPN = 0x01,
    Authority = 0x02,
    CRC32C = 0x03,
    NoOp = 0x04,
    UniqueId = 0x05,
    SSL = 0x20,
    SSLVersion = 0x21,
    SSLCommonName = 0x22,
    SSLCipher = 0x23,
    SSLSignatureAlgorithm = 0x24,
    SSLKeyAlgorithm = 0x25,
    NetworkNamespace = 0x30,
}

impl TryFrom<u8> for Type {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Type::ALPN),
            0x02 => Ok(Type::Authority),
            0x03 => Ok(Type::CRC32C),
            0x04 => Ok(Type::NoOp),
            0x05 => Ok(Type::UniqueId),
            0x20 => Ok(Type::SSL),
            0x21 => Ok(Type::SSLVersion),
            0x22 => Ok(Type::SSLCommonName),
            0x23 => Ok(Type::SSLCipher),
            0x24 => Ok(Type::SSLSignatureAlgorithm),
            0x25 => Ok(Type::SSLKeyAlgorithm),
            0x30 => Ok(Type::NetworkNamespace),
            other => Err(other),
        }
    }
}

/// The bits of the SSL client flags byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClientType {
    SSL = 0x01,
    CertificateConnection = 0x02,
    CertificateSession = 0x04,
}

/// A raw type-length-value entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tlv {
    pub kind: u8,
    pub value: Vec<u8>,
}

impl Tlv {
    pub fn new(kind: u8, value: Vec<u8>) -> Self {
        Tlv { kind, value }
    }

    /// The registered type of this entry, if any.
    pub fn value_type(&self) -> Option<Type> {
        Type::try_from(self.kind).ok()
    }

    /// Tests whether the type is in the range reserved for experimental use.
    pub fn is_experimental(&self) -> bool {
        (0xE0..=0xEF).contains(&self.kind)
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// The details of the TLS connection between the client and the proxy.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ssl {
    pub client: u8,
    /// Zero when the client presented a certificate that was successfully verified.
    pub verify: u32,
    pub version: Option<String>,
    pub common_name: Option<String>,
    pub cipher: Option<String>,
    pub signature_algorithm: Option<String>,
    pub key_algorithm: Option<String>,
    /// Sub-entries of unregistered types, in header order.
    pub extensions: Vec<Tlv>,
}

impl Ssl {
    pub fn new(client: u8, verify: u32) -> Self {
        Ssl {
            client,
            verify,
            ..Default::default()
        }
    }

    /// The client connected over SSL/TLS.
    pub fn client_ssl(&self) -> bool {
        self.client & ClientType::SSL as u8 != 0
    }

    /// The client provided a certificate over the current connection.
    pub fn client_certificate_connection(&self) -> bool {
        self.client & ClientType::CertificateConnection as u8 != 0
    }

    /// The client provided a certificate at least once over the TLS session.
    pub fn client_certificate_session(&self) -> bool {
        self.client & ClientType::CertificateSession as u8 != 0
    }

    pub fn is_verified(&self) -> bool {
        self.verify == 0
    }

    /// The encoded value of this entry, including sub-entries.
    pub fn to_value(&self) -> Vec<u8> {
        let mut value = Vec::with_capacity(SSL_FIXED_LENGTH);
        value.push(self.client);
        value.extend(self.verify.to_be_bytes());

        let fields = [
            (Type::SSLVersion, &self.version),
            (Type::SSLCommonName, &self.common_name),
            (Type::SSLCipher, &self.cipher),
            (Type::SSLSignatureAlgorithm, &self.signature_algorithm),
            (Type::SSLKeyAlgorithm, &self.key_algorithm),
        ];

        for (kind, field) in fields {
            if let Some(field) = field {
                write_tlv(&mut value, kind as u8, field.as_bytes());
            }
        }

        for extension in &self.extensions {
            write_tlv(&mut value, extension.kind, &extension.value);
        }

        value
    }
}

/// A decoded TLV entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Metadata {
    Alpn(Vec<u8>),
    Authority(String),
    /// A checksum that matched the header it was carried in.
    Crc32c(u32),
    UniqueId(Vec<u8>),
    Ssl(Ssl),
    Namespace(String),
    /// An entry of a type this crate does not interpret.
    Opaque(Tlv),
}

impl Metadata {
    /// The type code of this entry.
    pub fn kind(&self) -> u8 {
        match self {
            Metadata::Alpn(..) => Type::ALPN as u8,
            Metadata::Authority(..) => Type::Authority as u8,
            Metadata::Crc32c(..) => Type::CRC32C as u8,
            Metadata::UniqueId(..) => Type::UniqueId as u8,
            Metadata::Ssl(..) => Type::SSL as u8,
            Metadata::Namespace(..) => Type::NetworkNamespace as u8,
            Metadata::Opaque(tlv) => tlv.kind,
        }
    }

    /// The raw entry for this metadata.
    pub fn to_tlv(&self) -> Tlv {
        let value = match self {
            Metadata::Alpn(alpn) => alpn.clone(),
            Metadata::Authority(authority) => authority.as_bytes().to_vec(),
            Metadata::Crc32c(checksum) => checksum.to_be_bytes().to_vec(),
            Metadata::UniqueId(id) => id.clone(),
            Metadata::Ssl(ssl) => ssl.to_value(),
            Metadata::Namespace(namespace) => namespace.as_bytes().to_vec(),
            Metadata::Opaque(tlv) => tlv.value.clone(),
        };

        Tlv::new(self.kind(), value)
    }
}

/// Appends a single entry. Callers bound the value to `u16::MAX` bytes.
pub(crate) fn write_tlv(buffer: &mut Vec<u8>, kind: u8, value: &[u8]) {
    buffer.push(kind);
    buffer.extend((value.len() as u16).to_be_bytes());
    buffer.extend(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes() {
        assert_eq!(Type::try_from(0x20), Ok(Type::SSL));
        assert_eq!(Type::try_from(0x30), Ok(Type::NetworkNamespace));
        assert_eq!(Type::try_from(0xE0), Err(0xE0));
    }

    #[test]
    fn experimental_range() {
        assert!(Tlv::new(0xE0, vec![]).is_experimental());
        assert!(Tlv::new(0xEF, vec![]).is_experimental());
        assert!(!Tlv::new(0xF0, vec![]).is_experimental());
        assert!(!Tlv::new(0x05, vec![]).is_experimental());
    }

    #[test]
    fn ssl_flags() {
        let ssl = Ssl::new(0x07, 0);

        assert!(ssl.client_ssl());
        assert!(ssl.client_certificate_connection());
        assert!(ssl.client_certificate_session());
        assert!(ssl.is_verified());
        assert!(!Ssl::new(0x01, 1).client_certificate_session());
        assert!(!Ssl::new(0x01, 1).is_verified());
    }

    #[test]
    fn ssl_value() {
        let mut ssl = Ssl::new(0x01, 0);
        ssl.version = Some("TLSv1.3".to_string());

        let mut expected = vec![0x01, 0, 0, 0, 0, 0x21, 0, 7];
        expected.extend(b"TLSv1.3");

        assert_eq!(ssl.to_value(), expected);
    }

    #[test]
    fn header_offsets() {
        let header = Header {
            version: Version::Two,
            command: Command::Proxy,
            address_family: AddressFamily::IPv6,
            protocol: Transport::Stream,
            length: 40,
        };

        assert_eq!(header.len(), 56);
        assert_eq!(header.tlvs_start(), 52);
    }
}
