//! Accumulation of network bytes until a header can be decoded.

use bytes::{Bytes, BytesMut};

/// The bytes received from the network before a header has been decoded.
///
/// The buffer keeps everything it is given. Once it holds `limit` bytes without a decision
/// it is exhausted, and the connection is rejected.
#[derive(Debug)]
pub struct IngestBuffer {
    bytes: BytesMut,
    limit: usize,
}

impl IngestBuffer {
    pub fn with_limit(limit: usize) -> Self {
        IngestBuffer {
            bytes: BytesMut::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Tests whether the buffer has reached its limit.
    pub fn is_exhausted(&self) -> bool {
        self.bytes.len() >= self.limit
    }

    /// Drops the first `consumed` bytes and returns the rest as payload.
    pub fn split_payload(&mut self, consumed: usize) -> Bytes {
        let mut bytes = std::mem::take(&mut self.bytes);
        let payload = bytes.split_off(consumed.min(bytes.len()));

        payload.freeze()
    }

    pub fn clear(&mut self) {
        self.bytes = BytesMut::new();
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
