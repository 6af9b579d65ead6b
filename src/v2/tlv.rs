//! Validation of the type-length-value region of a binary header.

use std::ops::Range;
use std::str::from_utf8;

use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::sequence::tuple;
use nom::IResult;

use crate::checksum;
use crate::v2::error::ParseError;
use crate::v2::model::{
    Metadata, Ssl, Tlv, Type, CRC32C_LENGTH, MAXIMUM_UNIQUE_ID_LENGTH, MINIMUM_TLV_LENGTH,
    SSL_FIXED_LENGTH,
};

/// A single entry borrowed from a TLV region.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Entry<'a> {
    kind: u8,
    value: &'a [u8],
    /// Offset of the value within the walked buffer.
    offset: usize,
}

/// Walks the entries of a TLV region, stopping after the first error.
struct Entries<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> Entries<'a> {
    fn new(buffer: &'a [u8], start: usize) -> Self {
        Entries {
            buffer,
            position: start,
        }
    }
}

fn entry_header(input: &[u8]) -> IResult<&[u8], (u8, u16)> {
    tuple((be_u8, be_u16))(input)
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<Entry<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.buffer.get(self.position..)?;

        if remaining.is_empty() {
            return None;
        }

        self.position = self.buffer.len();

        let (value, (kind, length)) = match entry_header(remaining) {
            Ok(parsed) => parsed,
            Err(_) => return Some(Err(ParseError::LeftoverTLVs(remaining.len()))),
        };

        if value.len() < length as usize {
            return Some(Err(ParseError::InvalidTLV(kind, length)));
        }

        let offset = self.buffer.len() - remaining.len() + MINIMUM_TLV_LENGTH;
        self.position = offset + length as usize;

        Some(Ok(Entry {
            kind,
            value: &value[..length as usize],
            offset,
        }))
    }
}

/// Decodes the TLVs in `region` of a complete binary header.
///
/// Checksums are verified against the whole of `header` once every entry has been walked.
pub fn parse_tlvs(header: &[u8], region: Range<usize>) -> Result<Vec<Metadata>, ParseError> {
    let mut metadata = Vec::new();
    let mut checksums = Vec::new();

    for entry in Entries::new(&header[..region.end], region.start) {
        let entry = entry?;

        match Type::try_from(entry.kind) {
            Ok(Type::NoOp) => (),
            Ok(Type::ALPN) => metadata.push(Metadata::Alpn(entry.value.to_vec())),
            Ok(Type::Authority) => metadata.push(Metadata::Authority(text(&entry)?)),
            Ok(Type::NetworkNamespace) => metadata.push(Metadata::Namespace(text(&entry)?)),
            Ok(Type::UniqueId) => {
                bounded(&entry, 0, MAXIMUM_UNIQUE_ID_LENGTH)?;
                metadata.push(Metadata::UniqueId(entry.value.to_vec()));
            }
            Ok(Type::CRC32C) => {
                bounded(&entry, CRC32C_LENGTH, CRC32C_LENGTH)?;
                checksums.push(entry.offset..entry.offset + CRC32C_LENGTH);
                metadata.push(Metadata::Crc32c(0));
            }
            Ok(Type::SSL) => metadata.push(Metadata::Ssl(parse_ssl(&entry)?)),
            _ => metadata.push(Metadata::Opaque(Tlv::new(entry.kind, entry.value.to_vec()))),
        }
    }

    let mut verified = Vec::with_capacity(checksums.len());
    for field in checksums {
        let stored = checksum::verify(&header[..region.end], field)
            .map_err(|(expected, actual)| ParseError::Checksum { expected, actual })?;
        verified.push(stored);
    }

    let mut verified = verified.into_iter();
    for entry in metadata.iter_mut() {
        if let Metadata::Crc32c(value) = entry {
            if let Some(stored) = verified.next() {
                *value = stored;
            }
        }
    }

    Ok(metadata)
}

fn bounded(entry: &Entry, minimum: usize, maximum: usize) -> Result<(), ParseError> {
    let length = entry.value.len() as u16;

    if entry.value.len() < minimum {
        return Err(ParseError::TlvUnderflow {
            kind: entry.kind,
            length,
            required: minimum as u16,
        });
    }

    if entry.value.len() > maximum {
        return Err(ParseError::TlvOverflow {
            kind: entry.kind,
            length,
            maximum: maximum as u16,
        });
    }

    Ok(())
}

fn text(entry: &Entry) -> Result<String, ParseError> {
    from_utf8(entry.value)
        .map(String::from)
        .map_err(|_| ParseError::InvalidUtf8(entry.kind))
}

fn ssl_fixed(input: &[u8]) -> IResult<&[u8], (u8, u32)> {
    tuple((be_u8, be_u32))(input)
}

/// Parses an SSL value and its sub-entries, one level deep.
fn parse_ssl(entry: &Entry) -> Result<Ssl, ParseError> {
    bounded(entry, SSL_FIXED_LENGTH, u16::MAX as usize)?;

    let (_, (client, verify)) = ssl_fixed(entry.value).map_err(|_| ParseError::TlvUnderflow {
        kind: entry.kind,
        length: entry.value.len() as u16,
        required: SSL_FIXED_LENGTH as u16,
    })?;
    let mut ssl = Ssl::new(client, verify);

    for sub in Entries::new(entry.value, SSL_FIXED_LENGTH) {
        let sub = sub?;

        match Type::try_from(sub.kind) {
            Ok(Type::SSLVersion) => ssl.version = Some(text(&sub)?),
            Ok(Type::SSLCommonName) => ssl.common_name = Some(text(&sub)?),
            Ok(Type::SSLCipher) => ssl.cipher = Some(text(&sub)?),
            Ok(Type::SSLSignatureAlgorithm) => ssl.signature_algorithm = Some(text(&sub)?),
            Ok(Type::SSLKeyAlgorithm) => ssl.key_algorithm = Some(text(&sub)?),
            _ => ssl.extensions.push(Tlv::new(sub.kind, sub.value.to_vec())),
        }
    }

    Ok(ssl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn region(tlvs: &[u8]) -> Result<Vec<Metadata>, ParseError> {
        parse_tlvs(tlvs, 0..tlvs.len())
    }

    #[test]
    fn empty_region() {
        assert_eq!(region(&[]), Ok(vec![]));
    }

    #[test]
    fn noop_is_dropped() {
        let tlvs = [0x04, 0, 2, 0, 0, 0x01, 0, 2, b'h', b'2'];

        assert_eq!(region(&tlvs), Ok(vec![Metadata::Alpn(b"h2".to_vec())]));
    }

    #[test]
    fn unknown_types_are_preserved() {
        let tlvs = [0xE5, 0, 1, 0x2A, 0x7F, 0, 0];

        assert_eq!(
            region(&tlvs),
            Ok(vec![
                Metadata::Opaque(Tlv::new(0xE5, vec![0x2A])),
                Metadata::Opaque(Tlv::new(0x7F, vec![])),
            ])
        );
    }

    #[test]
    fn value_past_region_overflows() {
        let tlvs = [0x01, 0, 5, b'h', b'2'];
        let error = region(&tlvs).unwrap_err();

        assert_eq!(error, ParseError::InvalidTLV(0x01, 5));
        assert_eq!(error.kind(), ErrorKind::Overflow);
    }

    #[test]
    fn stray_bytes_underflow() {
        let tlvs = [0x04, 0, 0, 0x01, 0];
        let error = region(&tlvs).unwrap_err();

        assert_eq!(error, ParseError::LeftoverTLVs(2));
        assert_eq!(error.kind(), ErrorKind::Underflow);
    }

    #[test]
    fn region_is_bounded() {
        let tlvs = [0x01, 0, 2, b'h', b'2', 0xFF, 0xFF];

        assert_eq!(
            parse_tlvs(&tlvs, 0..5),
            Ok(vec![Metadata::Alpn(b"h2".to_vec())])
        );
    }

    #[test]
    fn short_checksum_underflows() {
        let tlvs = [0x03, 0, 3, 0, 0, 0];

        assert_eq!(region(&tlvs).unwrap_err().kind(), ErrorKind::Underflow);
    }

    #[test]
    fn long_checksum_overflows() {
        let tlvs = [0x03, 0, 5, 0, 0, 0, 0, 0];

        assert_eq!(region(&tlvs).unwrap_err().kind(), ErrorKind::Overflow);
    }

    #[test]
    fn checksum_is_verified() {
        let mut tlvs = vec![0x01, 0, 2, b'h', b'2', 0x03, 0, 4, 0, 0, 0, 0];
        let crc = checksum::checksum(&tlvs);
        tlvs[8..12].copy_from_slice(&crc.to_be_bytes());

        assert_eq!(
            region(&tlvs),
            Ok(vec![Metadata::Alpn(b"h2".to_vec()), Metadata::Crc32c(crc)])
        );

        tlvs[11] ^= 0x01;
        assert_eq!(
            region(&tlvs).unwrap_err().kind(),
            ErrorKind::ChecksumMismatch
        );
    }

    #[test]
    fn unique_id_limit() {
        let mut tlvs = vec![0x05, 0, 129];
        tlvs.extend([7u8; 129]);

        assert_eq!(
            region(&tlvs),
            Err(ParseError::TlvOverflow {
                kind: 0x05,
                length: 129,
                maximum: 128
            })
        );
    }

    #[test]
    fn authority_must_be_utf8() {
        let tlvs = [0x02, 0, 2, 0xC3, 0x28];

        assert_eq!(region(&tlvs), Err(ParseError::InvalidUtf8(0x02)));
        assert_eq!(ParseError::InvalidUtf8(0x02).kind(), ErrorKind::HeaderMismatch);
    }

    #[test]
    fn ssl_with_sub_entries() {
        let mut tlvs = vec![0x20, 0, 0, 0x05, 0, 0, 0, 0];
        tlvs.extend([0x22, 0, 11]);
        tlvs.extend(b"example.com");
        tlvs.extend([0xE1, 0, 1, 0x09]);
        let length = (tlvs.len() - 3) as u16;
        tlvs[1..3].copy_from_slice(&length.to_be_bytes());

        let mut expected = Ssl::new(0x05, 0);
        expected.common_name = Some("example.com".to_string());
        expected.extensions.push(Tlv::new(0xE1, vec![0x09]));

        assert_eq!(region(&tlvs), Ok(vec![Metadata::Ssl(expected)]));
    }

    #[test]
    fn ssl_fixed_part_underflows() {
        let tlvs = [0x20, 0, 4, 0x01, 0, 0, 0];

        assert_eq!(
            region(&tlvs),
            Err(ParseError::TlvUnderflow {
                kind: 0x20,
                length: 4,
                required: 5
            })
        );
    }

    #[test]
    fn ssl_sub_entry_overflows() {
        let tlvs = [0x20, 0, 8, 0x01, 0, 0, 0, 0, 0x21, 0, 9];

        assert_eq!(region(&tlvs), Err(ParseError::InvalidTLV(0x21, 9)));
    }
}
