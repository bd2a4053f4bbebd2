use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

#[cfg(feature = "api")]
use serde::Serialize;

#[derive(Default)]
struct Count(AtomicUsize);

impl Count {
    fn add(&self, value: usize) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Inner {
    datagrams_received: Count,
    datagrams_sent: Count,
    cache_hits: Count,
    cache_misses: Count,
    pairs_created: Count,
    pairs_cleared: Count,
    gateway_timeouts: Count,
    bad_gateways: Count,
    service_unavailable: Count,
}

/// Snapshot of [`Statistics`]' counters, serialized for the `/stats` endpoint.
#[cfg_attr(feature = "api", derive(Serialize))]
#[derive(Debug, Clone, Copy, Default)]
pub struct Snapshot {
    pub datagrams_received: usize,
    pub datagrams_sent: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub pairs_created: usize,
    pub pairs_cleared: usize,
    pub gateway_timeouts: usize,
    pub bad_gateways: usize,
    pub service_unavailable: usize,
}

/// Process-wide forwarding counters, modeled on the teacher's
/// worker-independent `Statistics`/`Counts` pair but without the per-session
/// key: there is no session concept in a stateless forward proxy, so this is
/// one flat set of atomics rather than a table keyed by peer address.
#[derive(Clone, Default)]
pub struct Statistics(Arc<Inner>);

impl Statistics {
    pub fn datagram_received(&self) {
        self.0.datagrams_received.add(1);
    }

    pub fn datagram_sent(&self) {
        self.0.datagrams_sent.add(1);
    }

    pub fn cache_hit(&self) {
        self.0.cache_hits.add(1);
    }

    pub fn cache_miss(&self) {
        self.0.cache_misses.add(1);
    }

    pub fn pair_created(&self) {
        self.0.pairs_created.add(1);
    }

    pub fn pair_cleared(&self) {
        self.0.pairs_cleared.add(1);
    }

    pub fn gateway_timeout(&self) {
        self.0.gateway_timeouts.add(1);
    }

    pub fn bad_gateway(&self) {
        self.0.bad_gateways.add(1);
    }

    pub fn service_unavailable(&self) {
        self.0.service_unavailable.add(1);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            datagrams_received: self.0.datagrams_received.get(),
            datagrams_sent: self.0.datagrams_sent.get(),
            cache_hits: self.0.cache_hits.get(),
            cache_misses: self.0.cache_misses.get(),
            pairs_created: self.0.pairs_created.get(),
            pairs_cleared: self.0.pairs_cleared.get(),
            gateway_timeouts: self.0.gateway_timeouts.get(),
            bad_gateways: self.0.bad_gateways.get(),
            service_unavailable: self.0.service_unavailable.get(),
        }
    }
}
