use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::decoder::{Decision, DecodeProgress, Phase};
use crate::error::{DecodeError, Rejection, Termination};
use crate::ingest::IngestBuffer;
use crate::model::Envelope;
use crate::relay::endpoint::Endpoint;
use crate::relay::frame::{Frame, Side};
use crate::relay::route::RouteResolver;

/// What the owner of a stream pair must do next.
#[derive(Debug, PartialEq)]
pub enum Action<T> {
    /// Open the application stream for `target`, attaching `envelope`.
    Open { target: T, envelope: Envelope },
    /// Deliver a frame to the application endpoint.
    Application(Frame),
    /// Deliver a frame to the network endpoint.
    Network(Frame),
}

/// The state of one proxied connection: a network endpoint, the application endpoint it is
/// paired with once a header has been decoded, and the frames waiting to be delivered.
///
/// The pair performs no I/O. Its owner feeds it frames and timer expirations, then drains
/// [`Action`]s with [`StreamPair::poll_action`] until none are left.
///
/// ## Examples
/// ```rust
/// use std::time::Instant;
/// use bytes::Bytes;
/// use ppa::config::Config;
/// use ppa::relay::{Action, Frame, Route, StreamPair};
/// use ppa::Envelope;
///
/// let resolver = |_: &Envelope| Some(Route::new("echo", 1024));
/// let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
///
/// pair.receive_network(Frame::Data(Bytes::from_static(b"PROXY UNKNOWN\r\nhello")), &resolver);
///
/// assert!(matches!(pair.poll_action(), Some(Action::Open { target: "echo", .. })));
/// assert_eq!(pair.poll_action(), Some(Action::Application(Frame::Data(Bytes::from_static(b"hello")))));
/// assert_eq!(pair.poll_action(), Some(Action::Network(Frame::Window(1019))));
/// assert_eq!(pair.poll_action(), None);
/// ```
#[derive(Debug)]
pub struct StreamPair<T> {
    network: Endpoint,
    application: Option<Endpoint>,
    ingest: IngestBuffer,
    progress: DecodeProgress,
    timeout: Duration,
    deadline: Option<Instant>,
    /// Frames from the network held until the application grants credit for them.
    pending: VecDeque<Frame>,
    actions: VecDeque<Action<T>>,
    rejection: Option<Rejection>,
}

impl<T> StreamPair<T> {
    /// Creates the pair for a newly accepted connection.
    pub fn accept(id: u64, config: &Config, now: Instant) -> Self {
        let timeout = config.decode_timeout();

        trace!(id, "Connection accepted");

        StreamPair {
            network: Endpoint::new(Side::Network, id),
            application: None,
            ingest: IngestBuffer::with_limit(config.max_header_bytes),
            progress: DecodeProgress::new(),
            timeout,
            deadline: now.checked_add(timeout),
            pending: VecDeque::new(),
            actions: VecDeque::new(),
            rejection: None,
        }
    }

    pub fn network(&self) -> &Endpoint {
        &self.network
    }

    pub fn application(&self) -> Option<&Endpoint> {
        self.application.as_ref()
    }

    /// Why the connection was refused, if it was.
    pub fn rejection(&self) -> Option<&Rejection> {
        self.rejection.as_ref()
    }

    /// The decoder phase while a header is being received.
    pub fn phase(&self) -> Option<Phase> {
        self.is_decoding().then(|| self.progress.phase())
    }

    /// The instant by which a header must have been decoded.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Bytes from the network waiting for application credit.
    pub fn pending_bytes(&self) -> usize {
        self.pending
            .iter()
            .map(|frame| match frame {
                Frame::Data(bytes) => bytes.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn is_decoding(&self) -> bool {
        self.application.is_none() && !self.network.is_terminal()
    }

    pub fn is_relaying(&self) -> bool {
        self.application.is_some() && !self.is_terminal()
    }

    /// Tests whether both endpoints have reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.network.is_terminal()
            && self
                .application
                .as_ref()
                .map_or(true, |application| application.is_terminal())
    }

    pub fn poll_action(&mut self) -> Option<Action<T>> {
        self.actions.pop_front()
    }

    /// Handles a frame received from the network endpoint.
    pub fn receive_network<R>(&mut self, frame: Frame, resolver: &R)
    where
        R: RouteResolver<Target = T> + ?Sized,
    {
        if self.is_decoding() {
            self.decode(frame, resolver);
        } else if self.is_relaying() {
            self.relay_from_network(frame);
        } else {
            trace!(id = self.network.id(), frame = %frame, "Frame from network after termination");
        }
    }

    /// Handles a frame received from the application endpoint.
    pub fn receive_application(&mut self, frame: Frame) {
        if !self.is_relaying() {
            trace!(id = self.network.id(), frame = %frame, "Frame from application while not relaying");
            return;
        }

        let Some(application) = self.application.as_mut() else {
            return;
        };

        match frame {
            Frame::Data(bytes) => {
                if !application.state().can_send() || !self.network.spend(bytes.len()) {
                    warn!(
                        id = self.network.id(),
                        length = bytes.len(),
                        credit = self.network.credit(),
                        "Application exceeded network window"
                    );
                    self.violation(Side::Application);
                    return;
                }

                application.record(bytes.len());
                self.actions.push_back(Action::Network(Frame::Data(bytes)));
            }
            Frame::Window(credit) => {
                application.grant(credit);
                let drained = self.drain_pending();
                let remaining = credit.saturating_sub(drained);

                if remaining > 0 {
                    self.actions
                        .push_back(Action::Network(Frame::Window(remaining)));
                }
            }
            Frame::Close => {
                if application.state().can_send() {
                    application.close_local();
                    self.network.close_remote();
                    self.actions.push_back(Action::Network(Frame::Close));
                    self.closed();
                }
            }
            Frame::Abort => self.terminate(Termination::Abort, Side::Network),
            Frame::Reset => self.terminate(Termination::Reset, Side::Network),
            frame @ (Frame::Flush | Frame::Challenge(..)) => {
                self.actions.push_back(Action::Network(frame));
            }
        }
    }

    /// Rejects a connection whose header did not arrive before its deadline.
    pub fn handle_timeout(&mut self, now: Instant) {
        match self.deadline {
            Some(deadline) if self.is_decoding() && now >= deadline => {
                self.reject(Rejection::Timeout(self.timeout));
            }
            _ => (),
        }
    }

    /// Aborts every live endpoint. Partially received headers and held frames are discarded.
    pub fn shutdown(&mut self) {
        debug!(id = self.network.id(), "Shutting down connection");

        self.deadline = None;
        self.ingest.clear();
        self.progress.reset();
        self.pending.clear();

        if !self.network.is_terminal() {
            self.network.terminate(Termination::Abort);
            self.actions.push_back(Action::Network(Frame::Abort));
        }

        if let Some(application) = self.application.as_mut() {
            if !application.is_terminal() {
                application.terminate(Termination::Abort);
                self.actions.push_back(Action::Application(Frame::Abort));
            }
        }
    }

    fn decode<R>(&mut self, frame: Frame, resolver: &R)
    where
        R: RouteResolver<Target = T> + ?Sized,
    {
        match frame {
            Frame::Data(bytes) => {
                self.ingest.extend(&bytes);

                match self.progress.attempt(self.ingest.as_slice()) {
                    Decision::NeedMoreData(needed) if self.ingest.is_exhausted() => {
                        trace!(id = self.network.id(), needed, "Ingest buffer exhausted");
                        let limit = self.ingest.limit();
                        self.reject(DecodeError::Exhausted(limit).into());
                    }
                    Decision::NeedMoreData(needed) => {
                        trace!(id = self.network.id(), buffered = self.ingest.len(), needed, "Waiting for header");
                    }
                    Decision::Decoded(envelope, consumed) => {
                        self.establish(envelope, consumed, resolver);
                    }
                    Decision::Rejected(error) => self.reject(error.into()),
                }
            }
            Frame::Close => match self.progress.finish(self.ingest.as_slice()) {
                Decision::Rejected(error) => self.reject(error.into()),
                Decision::Decoded(envelope, consumed) => {
                    self.establish(envelope, consumed, resolver);
                    self.relay_from_network(Frame::Close);
                }
                Decision::NeedMoreData(..) => {
                    self.reject(DecodeError::Truncated(self.ingest.len()).into());
                }
            },
            Frame::Window(credit) => self.network.grant(credit),
            Frame::Abort | Frame::Reset => {
                let termination = if frame == Frame::Abort {
                    Termination::Abort
                } else {
                    Termination::Reset
                };

                debug!(id = self.network.id(), frame = %frame, "Network ended before header");
                self.deadline = None;
                self.ingest.clear();
                self.progress.reset();
                self.network.terminate(termination);
            }
            frame @ (Frame::Flush | Frame::Challenge(..)) => {
                trace!(id = self.network.id(), frame = %frame, "Dropping frame before header");
            }
        }
    }

    fn establish<R>(&mut self, envelope: Envelope, consumed: usize, resolver: &R)
    where
        R: RouteResolver<Target = T> + ?Sized,
    {
        let payload = self.ingest.split_payload(consumed);

        self.deadline = None;
        self.network.open();

        debug!(
            id = self.network.id(),
            version = ?envelope.version,
            command = ?envelope.command,
            source = ?envelope.source(),
            destination = ?envelope.destination(),
            consumed,
            "Header decoded"
        );

        let Some(route) = resolver.resolve(&envelope) else {
            warn!(id = self.network.id(), "No route for connection");
            self.reject(Rejection::RouteNotFound);
            return;
        };

        let mut application = Endpoint::new(Side::Application, self.network.id());
        application.open();
        application.grant(route.window);
        self.application = Some(application);

        self.actions.push_back(Action::Open {
            target: route.target,
            envelope,
        });

        if self.network.credit() > 0 {
            let credit = u32::try_from(self.network.credit()).unwrap_or(u32::MAX);
            self.actions
                .push_back(Action::Application(Frame::Window(credit)));
        }

        if !payload.is_empty() {
            self.pending.push_back(Frame::Data(payload));
        }

        let drained = self.drain_pending();
        let remaining = route.window.saturating_sub(drained);

        if remaining > 0 {
            self.actions
                .push_back(Action::Network(Frame::Window(remaining)));
        }
    }

    fn relay_from_network(&mut self, frame: Frame) {
        let Some(application) = self.application.as_mut() else {
            return;
        };

        match frame {
            Frame::Data(bytes) => {
                let blocked = !self.pending.is_empty();

                if !self.network.state().can_send() || !application.spend(bytes.len()) {
                    warn!(
                        id = self.network.id(),
                        length = bytes.len(),
                        credit = application.credit(),
                        "Network exceeded application window"
                    );
                    self.violation(Side::Network);
                    return;
                }

                if blocked {
                    self.pending.push_back(Frame::Data(bytes));
                } else {
                    self.forward_to_application(Frame::Data(bytes));
                }
            }
            Frame::Window(credit) => {
                self.network.grant(credit);
                self.actions
                    .push_back(Action::Application(Frame::Window(credit)));
            }
            Frame::Close => {
                if self.network.state().can_send() {
                    self.network.close_local();

                    if self.pending.is_empty() {
                        self.forward_to_application(Frame::Close);
                    } else {
                        self.pending.push_back(Frame::Close);
                    }
                }
            }
            Frame::Abort => self.terminate(Termination::Abort, Side::Application),
            Frame::Reset => self.terminate(Termination::Reset, Side::Application),
            frame @ (Frame::Flush | Frame::Challenge(..)) => {
                if self.pending.is_empty() {
                    self.forward_to_application(frame);
                } else {
                    self.pending.push_back(frame);
                }
            }
        }
    }

    /// Delivers a network frame to the application, applying its effect on the endpoints.
    fn forward_to_application(&mut self, frame: Frame) {
        if let Frame::Data(bytes) = &frame {
            self.network.record(bytes.len());
        }

        if frame == Frame::Close {
            if let Some(application) = self.application.as_mut() {
                application.close_remote();
            }
        }

        self.actions.push_back(Action::Application(frame));

        if self.network.is_terminal() {
            self.closed();
        }
    }

    /// Delivers held frames the application now has credit for. Returns the credit spent.
    fn drain_pending(&mut self) -> u32 {
        let mut drained: u64 = 0;

        while let Some(frame) = self.pending.pop_front() {
            let mut bytes = match frame {
                Frame::Data(bytes) => bytes,
                frame => {
                    self.forward_to_application(frame);
                    continue;
                }
            };

            let Some(application) = self.application.as_mut() else {
                break;
            };

            let available = application.credit().min(bytes.len() as u64) as usize;

            if available == 0 && !bytes.is_empty() {
                self.pending.push_front(Frame::Data(bytes));
                break;
            }

            application.spend(available);
            drained += available as u64;

            if available < bytes.len() {
                let rest = bytes.split_off(available);
                self.pending.push_front(Frame::Data(rest));
                self.forward_to_application(Frame::Data(bytes));
                break;
            }

            self.forward_to_application(Frame::Data(bytes));
        }

        u32::try_from(drained).unwrap_or(u32::MAX)
    }

    /// Terminates both endpoints with the same kind of signal, delivering it to `peer`.
    fn terminate(&mut self, termination: Termination, peer: Side) {
        let frame = match termination {
            Termination::Abort => Frame::Abort,
            Termination::Reset => Frame::Reset,
        };

        debug!(id = self.network.id(), from = %peer.peer(), frame = %frame, "Connection terminated");

        self.pending.clear();
        self.network.terminate(termination);

        if let Some(application) = self.application.as_mut() {
            application.terminate(termination);
        }

        match peer {
            Side::Network => self.actions.push_back(Action::Network(frame)),
            Side::Application => self.actions.push_back(Action::Application(frame)),
        }
    }

    /// Resets the side that broke flow control and aborts its peer.
    fn violation(&mut self, violator: Side) {
        self.pending.clear();

        let (network, application) = match violator {
            Side::Network => (Termination::Reset, Termination::Abort),
            Side::Application => (Termination::Abort, Termination::Reset),
        };

        self.network.terminate(network);
        if let Some(endpoint) = self.application.as_mut() {
            endpoint.terminate(application);
        }

        let frame = |termination| match termination {
            Termination::Abort => Frame::Abort,
            Termination::Reset => Frame::Reset,
        };

        self.actions.push_back(Action::Network(frame(network)));
        self.actions
            .push_back(Action::Application(frame(application)));
    }

    fn reject(&mut self, rejection: Rejection) {
        let kind = rejection.kind();
        let termination = kind.termination();

        warn!(
            id = self.network.id(),
            kind = ?kind,
            buffered = self.ingest.len(),
            error = %rejection,
            "Connection rejected"
        );

        self.deadline = None;
        self.ingest.clear();
        self.progress.reset();
        self.network.terminate(termination);
        self.actions.push_back(Action::Network(match termination {
            Termination::Abort => Frame::Abort,
            Termination::Reset => Frame::Reset,
        }));
        self.rejection = Some(rejection);
    }

    fn closed(&mut self) {
        if self.is_terminal() {
            debug!(
                id = self.network.id(),
                network_forwarded = self.network.forwarded(),
                application_forwarded = ?self.application.as_ref().map(Endpoint::forwarded),
                "Connection closed"
            );
        }
    }
}
