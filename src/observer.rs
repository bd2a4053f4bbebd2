use std::net::SocketAddr;

use service::ProxyObserver;

use crate::statistics::Statistics;

/// Ambient hooks the forwarding engine calls into for logging and metrics.
/// None of these influence forwarding decisions (see
/// [`service::ProxyObserver`]'s all-default trait).
#[derive(Clone, Default)]
pub struct Observer {
    statistics: Statistics,
}

impl Observer {
    pub fn new(statistics: Statistics) -> Self {
        Self { statistics }
    }
}

impl ProxyObserver for Observer {
    fn on_cache_hit(&mut self, key: &str) {
        log::debug!("cache hit: key={key}");
        self.statistics.cache_hit();
    }

    fn on_cache_miss(&mut self, key: &str) {
        log::debug!("cache miss: key={key}");
        self.statistics.cache_miss();
    }

    fn on_forward(&mut self, key: &str, target: SocketAddr) {
        log::debug!("forwarding: key={key}, target={target}");
        self.statistics.pair_created();
    }

    fn on_observer_cancelled(&mut self, mid: u16) {
        log::debug!("observer cancelled: mid={mid}");
    }

    fn on_pair_cleared(&mut self, outbound_mid: u16) {
        log::trace!("pair cleared: outbound_mid={outbound_mid}");
        self.statistics.pair_cleared();
    }
}
