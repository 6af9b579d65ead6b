use std::fmt;

use bytes::Bytes;

/// The signals exchanged between the endpoints of a stream pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A chunk of payload.
    Data(Bytes),
    /// An out-of-band request to flush buffered payload.
    Flush,
    /// A liveness challenge with an opaque token.
    Challenge(Bytes),
    /// Credit for this many more payload bytes.
    Window(u32),
    /// No more payload will be sent in this direction.
    Close,
    /// The stream was cut off without a graceful close.
    Abort,
    /// The stream was refused.
    Reset,
}

impl Frame {
    /// Tests whether this frame terminates both endpoints.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Frame::Abort | Frame::Reset)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Data(..) => "data",
            Frame::Flush => "flush",
            Frame::Challenge(..) => "challenge",
            Frame::Window(..) => "window",
            Frame::Close => "close",
            Frame::Abort => "abort",
            Frame::Reset => "reset",
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Data(bytes) => write!(f, "data({})", bytes.len()),
            Frame::Window(credit) => write!(f, "window({})", credit),
            frame => f.write_str(frame.name()),
        }
    }
}

/// Which side of a stream pair an endpoint faces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Network,
    Application,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::Network => Side::Application,
            Side::Application => Side::Network,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Network => f.write_str("network"),
            Side::Application => f.write_str("application"),
        }
    }
}
