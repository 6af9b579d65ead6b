//! Models for the source and destination addresses carried by a header.

use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};

/// The length of a unix socket path in a binary header.
pub const UNIX_PATH_LENGTH: usize = 108;

/// The source and destination IPv4 addresses and ports of a header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IPv4 {
    pub source: SocketAddrV4,
    pub destination: SocketAddrV4,
}

impl IPv4 {
    /// Create a new IPv4 addresses.
    pub fn new<T: Into<SocketAddrV4>>(source: T, destination: T) -> Self {
        IPv4 {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// The source and destination IPv6 addresses and ports of a header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IPv6 {
    pub source: SocketAddrV6,
    pub destination: SocketAddrV6,
}

impl IPv6 {
    /// Create a new IPv6 addresses.
    pub fn new<T: Into<SocketAddrV6>>(source: T, destination: T) -> Self {
        IPv6 {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

/// The source and destination unix socket paths of a header, NUL padded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Unix {
    pub source: [u8; UNIX_PATH_LENGTH],
    pub destination: [u8; UNIX_PATH_LENGTH],
}

impl Unix {
    pub fn new(source: [u8; UNIX_PATH_LENGTH], destination: [u8; UNIX_PATH_LENGTH]) -> Self {
        Unix {
            source,
            destination,
        }
    }

    /// Create unix addresses from paths, padding each with NUL bytes.
    /// Returns `None` if either path does not fit.
    pub fn from_paths(source: &[u8], destination: &[u8]) -> Option<Self> {
        Some(Unix {
            source: pad(source)?,
            destination: pad(destination)?,
        })
    }

    /// The source path up to the first NUL byte.
    pub fn source_path(&self) -> &[u8] {
        trim(&self.source)
    }

    /// The destination path up to the first NUL byte.
    pub fn destination_path(&self) -> &[u8] {
        trim(&self.destination)
    }
}

fn pad(path: &[u8]) -> Option<[u8; UNIX_PATH_LENGTH]> {
    if path.len() > UNIX_PATH_LENGTH {
        return None;
    }

    let mut padded = [0; UNIX_PATH_LENGTH];
    padded[..path.len()].copy_from_slice(path);

    Some(padded)
}

fn trim(path: &[u8]) -> &[u8] {
    let end = path.iter().position(|b| *b == 0).unwrap_or(path.len());

    &path[..end]
}

impl From<(SocketAddrV4, SocketAddrV4)> for IPv4 {
    fn from((source, destination): (SocketAddrV4, SocketAddrV4)) -> Self {
        IPv4::new(source, destination)
    }
}

impl From<(SocketAddrV6, SocketAddrV6)> for IPv6 {
    fn from((source, destination): (SocketAddrV6, SocketAddrV6)) -> Self {
        IPv6::new(source, destination)
    }
}

impl IPv4 {
    pub fn source_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.source)
    }

    pub fn destination_addr(&self) -> SocketAddr {
        SocketAddr::V4(self.destination)
    }
}

impl IPv6 {
    pub fn source_addr(&self) -> SocketAddr {
        SocketAddr::V6(self.source)
    }

    pub fn destination_addr(&self) -> SocketAddr {
        SocketAddr::V6(self.destination)
    }
}
