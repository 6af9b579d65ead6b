//! A PROXY protocol termination adapter.
//!
//! Decodes the text (v1) and binary (v2) headers a load balancer writes at the start of a
//! connection, routes the connection to an application by what the header says, and relays
//! data and control signals between the two sides under credit-based flow control.
//!
//! The decoding and relay state machines perform no I/O; [`server::Listener`] drives them
//! over TCP with tokio.

pub mod checksum;
pub mod config;
pub mod decoder;
pub mod error;
pub mod ingest;
pub mod ip;
pub mod model;
pub mod relay;
pub mod server;
pub mod v1;
pub mod v2;

pub use error::{DecodeError, ErrorKind, Rejection, Termination};
pub use model::{AddressFamily, Addresses, Command, Envelope, Transport, Version};

/// The canonical way to determine when a streamed header should be retried in a streaming context.
/// The protocol states that servers may choose to support partial headers or to close the connection if the header is not present all at once.
pub trait PartialResult {
    /// Tests whether this `Result` is successful or whether the error is terminal.
    /// A terminal error will not result in a success even with more bytes.
    /// Retrying with the same -- or more -- input will not change the result.
    fn is_complete(&self) -> bool {
        !self.is_incomplete()
    }

    /// Tests whether this `Result` is incomplete.
    /// An action that leads to an incomplete result may have a different result with more bytes.
    /// Retrying with the same input will not change the result.
    fn is_incomplete(&self) -> bool;
}

impl<T, E: PartialResult> PartialResult for Result<T, E> {
    fn is_incomplete(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(error) => error.is_incomplete(),
        }
    }
}

impl PartialResult for v1::ParseError {
    fn is_incomplete(&self) -> bool {
        matches!(self, v1::ParseError::MissingNewLine)
    }
}

impl PartialResult for v2::ParseError {
    fn is_incomplete(&self) -> bool {
        matches!(
            self,
            v2::ParseError::Incomplete(..) | v2::ParseError::Partial(..)
        )
    }
}

impl PartialResult for DecodeError {
    fn is_incomplete(&self) -> bool {
        match self {
            DecodeError::Text(error) => error.is_incomplete(),
            DecodeError::Binary(error) => error.is_incomplete(),
            _ => false,
        }
    }
}
