//! Pairing of network and application streams.
//!
//! A [`StreamPair`] decodes the header at the start of a network stream, resolves it to an
//! application target, then relays frames between the two endpoints in both directions.

mod endpoint;
mod frame;
mod pair;
mod route;

pub use endpoint::{Endpoint, EndpointState};
pub use frame::{Frame, Side};
pub use pair::{Action, StreamPair};
pub use route::{Matcher, Route, RouteResolver, RouteTable};
