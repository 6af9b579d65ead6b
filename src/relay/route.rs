//! Resolution of decoded headers to application targets.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::info;

use crate::model::Envelope;

/// The application target for a connection and the credit it grants at open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route<T> {
    pub target: T,
    /// Payload bytes the application accepts before its first window frame.
    pub window: u32,
}

impl<T> Route<T> {
    pub fn new(target: T, window: u32) -> Self {
        Route { target, window }
    }
}

/// Maps the envelope of a decoded connection to an application target.
///
/// Implementations are shared by every connection and must be cheap to call.
pub trait RouteResolver {
    type Target;

    fn resolve(&self, envelope: &Envelope) -> Option<Route<Self::Target>>;
}

impl<T, F> RouteResolver for F
where
    F: Fn(&Envelope) -> Option<Route<T>>,
{
    type Target = T;

    fn resolve(&self, envelope: &Envelope) -> Option<Route<T>> {
        self(envelope)
    }
}

/// Conditions a connection must meet to use a route. Unset conditions match anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Matcher {
    pub port: Option<u16>,
    pub alpn: Option<Vec<u8>>,
    pub authority: Option<String>,
}

impl Matcher {
    /// Normalize a hostname for matching.
    ///
    /// - Convert to lowercase
    /// - Trim trailing dot
    pub fn normalize_hostname(hostname: &str) -> String {
        hostname.to_lowercase().trim_end_matches('.').to_string()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_alpn(mut self, alpn: &[u8]) -> Self {
        self.alpn = Some(alpn.to_vec());
        self
    }

    pub fn with_authority(mut self, authority: &str) -> Self {
        self.authority = Some(Matcher::normalize_hostname(authority));
        self
    }

    pub fn matches(&self, envelope: &Envelope) -> bool {
        if let Some(port) = self.port {
            if envelope.destination().map(|d| d.port()) != Some(port) {
                return false;
            }
        }

        if let Some(alpn) = &self.alpn {
            if envelope.alpn() != Some(alpn.as_slice()) {
                return false;
            }
        }

        if let Some(authority) = &self.authority {
            match envelope.authority() {
                Some(candidate) if Matcher::normalize_hostname(candidate) == *authority => (),
                _ => return false,
            }
        }

        true
    }
}

#[derive(Debug)]
struct RouteEntry<T> {
    matcher: Matcher,
    route: Route<T>,
}

/// An ordered list of routes; the first matching entry wins.
///
/// Uses ArcSwap so lookups never block on updates.
pub struct RouteTable<T> {
    entries: ArcSwap<Vec<RouteEntry<T>>>,
}

impl<T: Clone> RouteTable<T> {
    pub fn new() -> Self {
        RouteTable {
            entries: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Replaces every route atomically.
    pub fn update(&self, routes: Vec<(Matcher, Route<T>)>) {
        let route_count = routes.len();
        let entries = routes
            .into_iter()
            .map(|(matcher, route)| RouteEntry { matcher, route })
            .collect();

        self.entries.store(Arc::new(entries));

        info!(route_count, "Route table updated");
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

impl<T: Clone> Default for RouteTable<T> {
    fn default() -> Self {
        RouteTable::new()
    }
}

impl<T: Clone> RouteResolver for RouteTable<T> {
    type Target = T;

    fn resolve(&self, envelope: &Envelope) -> Option<Route<T>> {
        self.entries
            .load()
            .iter()
            .find(|entry| entry.matcher.matches(envelope))
            .map(|entry| entry.route.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v2::Metadata;
    use crate::Version;

    fn tcp4(destination_port: u16, metadata: Vec<Metadata>) -> Envelope {
        let mut envelope: Envelope = crate::v1::Header::try_from(
            format!("PROXY TCP4 192.0.2.1 192.0.2.2 1234 {}\r\n", destination_port).as_str(),
        )
        .unwrap()
        .into();

        envelope.metadata = metadata;
        envelope
    }

    #[test]
    fn normalize_hostname() {
        assert_eq!(Matcher::normalize_hostname("Example.COM"), "example.com");
        assert_eq!(Matcher::normalize_hostname("example.com."), "example.com");
    }

    #[test]
    fn first_match_wins() {
        let table = RouteTable::new();
        table.update(vec![
            (Matcher::default().with_port(443), Route::new("tls", 1024)),
            (Matcher::default(), Route::new("fallback", 512)),
        ]);

        assert_eq!(table.resolve(&tcp4(443, vec![])), Some(Route::new("tls", 1024)));
        assert_eq!(table.resolve(&tcp4(80, vec![])), Some(Route::new("fallback", 512)));
    }

    #[test]
    fn match_on_alpn_and_authority() {
        let table = RouteTable::new();
        table.update(vec![(
            Matcher::default()
                .with_alpn(b"h2")
                .with_authority("Example.com."),
            Route::new(1, 64),
        )]);

        let matching = tcp4(
            443,
            vec![
                Metadata::Alpn(b"h2".to_vec()),
                Metadata::Authority("EXAMPLE.COM".to_string()),
            ],
        );
        let wrong_alpn = tcp4(
            443,
            vec![
                Metadata::Alpn(b"http/1.1".to_vec()),
                Metadata::Authority("example.com".to_string()),
            ],
        );

        assert_eq!(table.resolve(&matching), Some(Route::new(1, 64)));
        assert_eq!(table.resolve(&wrong_alpn), None);
    }

    #[test]
    fn port_requires_destination() {
        let table = RouteTable::new();
        table.update(vec![(Matcher::default().with_port(443), Route::new((), 1))]);

        assert_eq!(table.resolve(&Envelope::local(Version::Two)), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn closures_resolve() {
        let resolver = |envelope: &Envelope| {
            if envelope.is_local() {
                Some(Route::new("local", 8))
            } else {
                None
            }
        };

        assert_eq!(
            resolver.resolve(&Envelope::local(Version::One)),
            Some(Route::new("local", 8))
        );
    }
}
