//! Compiled ceilings for the proxy's fixed-size pools (spec §6.4).
//!
//! The runtime config in the binary crate may narrow these further, but it
//! may never exceed them — the pools backing C1 and C2 are allocated once,
//! at these sizes, and never grow.

/// Upper bound on concurrently in-flight transaction pairs and, by
/// construction, cached responses.
pub const MAX_OPEN_TRANSACTIONS: usize = 16;

/// Maximum `Proxy-Uri` length accepted as a cache key.
pub const KEY_MAX: usize = 128;

/// Maximum cached payload length. Longer responses are still forwarded,
/// just never cached (spec §8 boundary behaviors).
pub const PAYLOAD_MAX: usize = 128;

/// Used when the origin's `Max-Age` is absent or zero.
pub const DEFAULT_MAX_AGE: u32 = 60;

/// Ceiling `cache_put` clamps an oversize `Max-Age` to.
pub const MAX_AGE_MAX: u32 = 86_400;
