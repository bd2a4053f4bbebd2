use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::net::UdpSocket;

use codec::Decoder;
use service::{CacheTable, ForwardingEngine, PairTable};
use transport::{CoapTransport, Endpoint, MidAllocator, TransactionPool};

use crate::{config::Config, observer::Observer, statistics::Statistics};

const RECV_BUFFER: usize = 1500;

/// Pushes finished datagrams onto a UDP socket with a non-blocking send,
/// matching the engine's no-suspension-points rule (spec §5): `receive()`
/// never awaits, so neither does anything it calls into.
struct UdpTransport {
    socket: Arc<UdpSocket>,
    statistics: Statistics,
}

impl CoapTransport for UdpTransport {
    fn send(&mut self, endpoint: Endpoint, bytes: &[u8]) {
        match self.socket.try_send_to(bytes, endpoint) {
            Ok(_) => self.statistics.datagram_sent(),
            Err(err) => log::warn!("dropped outbound datagram to {endpoint}: {err}"),
        }
    }
}

/// Runs one UDP worker: owns the socket, one [`ForwardingEngine`], and the
/// C1/C2 tables it drives. A sweep of expired cache rows is driven by a
/// tokio interval rather than a background thread (see the design notes on
/// why `CacheTable` does not spawn its own timer).
pub async fn start(config: Arc<Config>, statistics: Statistics) -> Result<()> {
    let socket = Arc::new(UdpSocket::bind(config.server.bind).await?);
    log::info!("listening on {}", config.server.bind);

    let mut pool = TransactionPool::new(config.server.max_open_transactions);
    let mut pairs = PairTable::new(config.server.max_open_transactions);
    let mut cache = CacheTable::with_max_age(
        config.server.max_cache_entries,
        config.cache.default_max_age_secs,
        config.cache.max_age_ceiling_secs,
    );

    let mut engine = ForwardingEngine::new(
        MidAllocator::new(0x5000),
        Observer::new(statistics.clone()),
        UdpTransport {
            socket: socket.clone(),
            statistics: statistics.clone(),
        },
    );

    let mut sweep = tokio::time::interval(Duration::from_secs(1));
    let mut buffer = vec![0u8; RECV_BUFFER];
    let started = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                cache.sweep_expired(started.elapsed().as_secs());
            }
            received = socket.recv_from(&mut buffer) => {
                let (len, src) = received?;
                statistics.datagram_received();
                handle_datagram(&mut engine, &mut pool, &mut pairs, &mut cache, &statistics, src, &buffer[..len], started.elapsed().as_secs());
            }
        }
    }
}

fn handle_datagram(
    engine: &mut ForwardingEngine<Observer, UdpTransport>,
    pool: &mut TransactionPool,
    pairs: &mut PairTable,
    cache: &mut CacheTable,
    statistics: &Statistics,
    src: SocketAddr,
    bytes: &[u8],
    now: u64,
) {
    let message = match Decoder::decode(bytes) {
        Ok(message) => message,
        Err(err) => {
            log::debug!("dropped unparsable datagram from {src}: {err}");
            return;
        }
    };

    let status = engine.receive(src, &message, pool, pairs, cache, now);

    use service::Status;
    match status {
        Status::GatewayTimeout => statistics.gateway_timeout(),
        Status::BadGateway => statistics.bad_gateway(),
        Status::ServiceUnavailable => statistics.service_unavailable(),
        _ => {}
    }
}
