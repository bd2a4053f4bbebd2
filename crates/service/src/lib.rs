//! Core of the CoAP forward proxy: the response cache, the transaction-pair
//! table, and the forwarding engine that drives both.
//!
//! Everything here runs single-threaded and cooperative, owned by whichever
//! event loop reads datagrams off one UDP worker's socket (see the binary
//! crate's server module). No locks; no suspension points inside `receive`.

pub mod cache;
pub mod forwarding;
pub mod limits;
pub mod pairs;

pub use cache::{CacheId, CachedResponse, CacheTable, PutStatus};
pub use forwarding::{ForwardingEngine, MethodPolicy, NullObserver, ProxyObserver, Status};
pub use pairs::{PairStatus, PairTable, TransactionPair};
