use crate::error::Termination;
use crate::relay::frame::Side;

/// The lifecycle of one side of a stream pair.
///
/// `HalfClosedLocal` means this endpoint has sent its close; `HalfClosedRemote` means its peer
/// has. `Aborted` and `Reset` are reachable from every state that is not terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EndpointState {
    Pending,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    Aborted,
    Reset,
}

impl EndpointState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EndpointState::Closed | EndpointState::Aborted | EndpointState::Reset
        )
    }

    /// Tests whether the endpoint may still send payload.
    pub fn can_send(&self) -> bool {
        matches!(self, EndpointState::Open | EndpointState::HalfClosedRemote)
    }

    /// Tests whether the endpoint may still receive payload.
    pub fn can_receive(&self) -> bool {
        matches!(self, EndpointState::Open | EndpointState::HalfClosedLocal)
    }
}

/// One side of a stream pair, with its credit and byte accounting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    side: Side,
    id: u64,
    state: EndpointState,
    /// Bytes the party behind this endpoint is willing to receive.
    credit: u64,
    /// Bytes sent by this endpoint and delivered to its peer.
    forwarded: u64,
}

impl Endpoint {
    pub fn new(side: Side, id: u64) -> Self {
        Endpoint {
            side,
            id,
            state: EndpointState::Pending,
            credit: 0,
            forwarded: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn credit(&self) -> u64 {
        self.credit
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn open(&mut self) {
        if self.state == EndpointState::Pending {
            self.state = EndpointState::Open;
        }
    }

    /// This endpoint sent its close.
    pub(crate) fn close_local(&mut self) {
        self.state = match self.state {
            EndpointState::Open => EndpointState::HalfClosedLocal,
            EndpointState::HalfClosedRemote => EndpointState::Closed,
            state => state,
        };
    }

    /// The peer of this endpoint sent its close.
    pub(crate) fn close_remote(&mut self) {
        self.state = match self.state {
            EndpointState::Open => EndpointState::HalfClosedRemote,
            EndpointState::HalfClosedLocal => EndpointState::Closed,
            state => state,
        };
    }

    pub(crate) fn terminate(&mut self, termination: Termination) {
        if !self.is_terminal() {
            self.state = match termination {
                Termination::Reset => EndpointState::Reset,
                Termination::Abort => EndpointState::Aborted,
            };
        }
    }

    pub(crate) fn grant(&mut self, credit: u32) {
        self.credit = self.credit.saturating_add(credit as u64);
    }

    /// Spends credit for `length` bytes. Returns `false` without spending if there is not enough.
    pub(crate) fn spend(&mut self, length: usize) -> bool {
        match self.credit.checked_sub(length as u64) {
            Some(remaining) => {
                self.credit = remaining;
                true
            }
            None => false,
        }
    }

    pub(crate) fn record(&mut self, length: usize) {
        self.forwarded += length as u64;
    }
}
