use std::time::{Duration, Instant};

use bytes::Bytes;

use ppa::config::Config;
use ppa::relay::{Action, EndpointState, Frame, Route, StreamPair};
use ppa::v2::Builder;
use ppa::{
    AddressFamily, Addresses, Command, Envelope, ErrorKind, Termination, Transport, Version,
};

const WINDOW: u32 = 1024;

fn resolver(envelope: &Envelope) -> Option<Route<&'static str>> {
    Some(Route::new(if envelope.is_local() { "local" } else { "proxied" }, WINDOW))
}

fn data(bytes: &'static [u8]) -> Frame {
    Frame::Data(Bytes::from_static(bytes))
}

fn drain(pair: &mut StreamPair<&'static str>) -> Vec<Action<&'static str>> {
    std::iter::from_fn(|| pair.poll_action()).collect()
}

fn local_v1() -> Vec<u8> {
    b"PROXY UNKNOWN\r\n".to_vec()
}

fn local_v2() -> Vec<u8> {
    Builder::new(
        Version::Two | Command::Local,
        AddressFamily::Unspecified | Transport::Unspecified,
    )
    .build()
    .unwrap()
}

/// Opens a pair with a LOCAL header and checks what the application is told.
fn open_local(header: Vec<u8>, version: Version) -> StreamPair<&'static str> {
    let mut pair = StreamPair::accept(7, &Config::default(), Instant::now());
    pair.receive_network(Frame::Data(header.into()), &resolver);

    let actions = drain(&mut pair);
    match &actions[..] {
        [Action::Open { target, envelope }, Action::Network(Frame::Window(WINDOW))] => {
            assert_eq!(*target, "local");
            assert_eq!(envelope.version, version);
            assert!(envelope.is_local());
            assert_eq!(envelope.addresses, Addresses::Unspecified);
            assert_eq!(envelope.source(), None);
        }
        actions => panic!("unexpected actions {:?}", actions),
    }

    assert!(pair.is_relaying());
    assert_eq!(pair.network().state(), EndpointState::Open);
    pair
}

fn relays_every_signal(header: Vec<u8>, version: Version) {
    let mut pair = open_local(header, version);

    pair.receive_network(data(b"ping"), &resolver);
    pair.receive_network(Frame::Flush, &resolver);
    pair.receive_network(Frame::Challenge(Bytes::from_static(b"?")), &resolver);
    pair.receive_network(Frame::Window(16), &resolver);

    assert_eq!(
        drain(&mut pair),
        vec![
            Action::Application(data(b"ping")),
            Action::Application(Frame::Flush),
            Action::Application(Frame::Challenge(Bytes::from_static(b"?"))),
            Action::Application(Frame::Window(16)),
        ]
    );

    pair.receive_application(data(b"pong"));
    pair.receive_application(Frame::Flush);
    pair.receive_application(Frame::Challenge(Bytes::from_static(b"!")));
    pair.receive_application(Frame::Window(4));

    assert_eq!(
        drain(&mut pair),
        vec![
            Action::Network(data(b"pong")),
            Action::Network(Frame::Flush),
            Action::Network(Frame::Challenge(Bytes::from_static(b"!"))),
            Action::Network(Frame::Window(4)),
        ]
    );

    pair.receive_network(Frame::Close, &resolver);
    assert_eq!(drain(&mut pair), vec![Action::Application(Frame::Close)]);
    assert!(!pair.is_terminal());

    pair.receive_application(data(b"late"));
    pair.receive_application(Frame::Close);
    assert_eq!(
        drain(&mut pair),
        vec![Action::Network(data(b"late")), Action::Network(Frame::Close)]
    );

    assert!(pair.is_terminal());
    assert_eq!(pair.network().state(), EndpointState::Closed);
    assert_eq!(pair.network().forwarded(), 4);
    assert_eq!(pair.application().map(|a| a.forwarded()), Some(8));
}

#[test]
fn local_v1_relays_every_signal() {
    relays_every_signal(local_v1(), Version::One);
}

#[test]
fn local_v2_relays_every_signal() {
    relays_every_signal(local_v2(), Version::Two);
}

#[test]
fn terminations_cross_in_both_directions() {
    for header in [local_v1(), local_v2()] {
        let version = if header.starts_with(b"PROXY") {
            Version::One
        } else {
            Version::Two
        };

        let cases = [
            (Frame::Abort, Termination::Abort),
            (Frame::Reset, Termination::Reset),
        ];

        for (frame, termination) in cases {
            let state = match termination {
                Termination::Abort => EndpointState::Aborted,
                Termination::Reset => EndpointState::Reset,
            };

            let mut pair = open_local(header.clone(), version);
            pair.receive_network(frame.clone(), &resolver);
            assert_eq!(drain(&mut pair), vec![Action::Application(frame.clone())]);
            assert_eq!(pair.application().map(|a| a.state()), Some(state));
            assert!(pair.is_terminal());

            let mut pair = open_local(header.clone(), version);
            pair.receive_application(frame.clone());
            assert_eq!(drain(&mut pair), vec![Action::Network(frame.clone())]);
            assert_eq!(pair.network().state(), state);
            assert!(pair.is_terminal());
        }
    }
}

#[test]
fn frames_after_termination_are_ignored() {
    let mut pair = open_local(local_v1(), Version::One);
    pair.receive_network(Frame::Reset, &resolver);
    drain(&mut pair);

    pair.receive_network(data(b"more"), &resolver);
    pair.receive_application(data(b"more"));
    pair.receive_application(Frame::Close);

    assert_eq!(pair.poll_action(), None);
}

#[test]
fn malformed_header_resets_without_application() {
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
    pair.receive_network(data(b"GET / HTTP/1.1\r\n"), &resolver);

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Reset)]);
    assert!(pair.application().is_none());
    assert_eq!(pair.network().state(), EndpointState::Reset);
    assert_eq!(
        pair.rejection().map(|r| r.kind()),
        Some(ErrorKind::HeaderMismatch)
    );
}

#[test]
fn malformed_text_header() {
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
    pair.receive_network(data(b"PROXY TCP4 192.0.2.1 192.0.2.2 01234 5678\r\n"), &resolver);

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Reset)]);
    assert_eq!(
        pair.rejection().map(|r| r.kind()),
        Some(ErrorKind::HeaderMismatch)
    );
}

#[test]
fn route_miss_rejects_cleanly() {
    let nowhere = |_: &Envelope| None::<Route<&'static str>>;
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
    pair.receive_network(data(b"PROXY TCP4 192.0.2.1 192.0.2.2 1234 5678\r\nhello"), &nowhere);

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Reset)]);
    assert!(pair.application().is_none());
    assert!(pair.is_terminal());
    assert_eq!(
        pair.rejection().map(|r| r.kind()),
        Some(ErrorKind::RouteNotFound)
    );
}

#[test]
fn header_split_across_frames() {
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());

    pair.receive_network(data(b"PROXY TCP4 192.0.2.1 "), &resolver);
    pair.receive_network(data(b"192.0.2.2 1234 5678\r"), &resolver);
    assert_eq!(pair.poll_action(), None);

    pair.receive_network(data(b"\nhello"), &resolver);

    let actions = drain(&mut pair);
    assert!(matches!(actions[0], Action::Open { target: "proxied", .. }));
    assert_eq!(actions[1], Action::Application(data(b"hello")));
    assert_eq!(actions[2], Action::Network(Frame::Window(WINDOW - 5)));
}

#[test]
fn exhausted_ingest_buffer() {
    let config = Config {
        max_header_bytes: 16,
        ..Config::default()
    };
    let header = Builder::with_addresses(
        Command::Proxy,
        Transport::Stream,
        (
            "192.0.2.1:1234".parse::<std::net::SocketAddr>().unwrap(),
            "192.0.2.2:5678".parse::<std::net::SocketAddr>().unwrap(),
        ),
    )
    .build()
    .unwrap();

    let mut pair = StreamPair::accept(1, &config, Instant::now());
    pair.receive_network(Frame::Data(Bytes::copy_from_slice(&header[..20])), &resolver);

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Reset)]);
    assert_eq!(pair.rejection().map(|r| r.kind()), Some(ErrorKind::Underflow));
}

#[test]
fn close_before_header_completes() {
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
    pair.receive_network(data(b"PROXY TCP4 192.0.2.1"), &resolver);
    pair.receive_network(Frame::Close, &resolver);

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Reset)]);
    assert_eq!(pair.rejection().map(|r| r.kind()), Some(ErrorKind::Underflow));
}

#[test]
fn decode_timeout_aborts() {
    let config = Config {
        decode_timeout_ms: 100,
        ..Config::default()
    };
    let start = Instant::now();
    let mut pair = StreamPair::accept(1, &config, start);
    pair.receive_network(data(b"PROXY "), &resolver);

    assert_eq!(pair.deadline(), Some(start + Duration::from_millis(100)));

    pair.handle_timeout(start + Duration::from_millis(100));

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Abort)]);
    assert_eq!(pair.rejection().map(|r| r.kind()), Some(ErrorKind::Timeout));
    assert_eq!(pair.deadline(), None);
}

#[test]
fn decoded_header_clears_deadline() {
    let start = Instant::now();
    let mut pair = StreamPair::accept(1, &Config::default(), start);
    pair.receive_network(Frame::Data(local_v2().into()), &resolver);
    drain(&mut pair);

    pair.handle_timeout(start + Duration::from_secs(60));

    assert_eq!(pair.poll_action(), None);
    assert!(pair.is_relaying());
}

#[test]
fn network_violation_resets_network() {
    let mut pair = open_local(local_v1(), Version::One);
    pair.receive_network(Frame::Data(Bytes::from(vec![0; WINDOW as usize + 1])), &resolver);

    assert_eq!(
        drain(&mut pair),
        vec![
            Action::Network(Frame::Reset),
            Action::Application(Frame::Abort),
        ]
    );
    assert!(pair.is_terminal());
}

#[test]
fn shutdown_while_decoding() {
    let mut pair = StreamPair::accept(1, &Config::default(), Instant::now());
    pair.receive_network(data(b"PROXY TCP"), &resolver);
    pair.shutdown();

    assert_eq!(drain(&mut pair), vec![Action::Network(Frame::Abort)]);
    assert!(pair.is_terminal());
    assert_eq!(pair.rejection(), None);
}
