//! External transport collaborator for the CoAP proxy forwarding engine.
//!
//! This crate owns the things the engine in `coap-proxy-service` treats as
//! given per the specification's external-interfaces section: the pool of
//! open transactions (capacity `MAX_OPEN_TRANSACTIONS`), MID minting, and
//! `Proxy-Uri` → endpoint resolution. It does not own a socket — sending a
//! transaction hands the caller `(endpoint, bytes)` to push onto whatever
//! UDP socket the binary owns.

pub mod endpoint;
pub mod mid;
pub mod transaction;

pub use codec::{Message, MessageType, Token};
pub use endpoint::{Endpoint, parse_proxy_uri, path_after_endpoint};
pub use mid::MidAllocator;
pub use transaction::{Transaction, TransactionHandle, TransactionPool};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    MalformedUri,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

/// The socket the forwarding engine pushes finished datagrams onto. A plain
/// callback rather than a `std::net::UdpSocket` wrapper, so tests can swap
/// in an in-memory recorder without touching the engine (spec §5 external
/// interfaces).
pub trait CoapTransport {
    fn send(&mut self, endpoint: Endpoint, bytes: &[u8]);
}
