use codec::{Code, Message, MessageType, Token};
use transport::{CoapTransport, Endpoint, MidAllocator, TransactionPool};

use crate::cache::CacheTable;
use crate::limits::DEFAULT_MAX_AGE;
use crate::pairs::{PairStatus, PairTable};

/// Default `Content-Format` applied to a proxied response when the upstream
/// omitted the option (spec §4.3.3 step 2).
const APPLICATION_JSON: u16 = 50;

/// Status taxonomy the engine returns from `receive` (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    ParseError,
    ServiceUnavailable,
    GatewayTimeout,
    BadGateway,
    SerializationError,
    PingResponse,
    NotAProxyRequest,
}

/// Which request code the engine emits on the outbound (proxy→target) hop.
///
/// The source's behavior was inconsistent across revisions (spec §9 Open
/// Questions); this proxy ships `AlwaysGet`, matching the original's
/// `handle_proxy_request`, and exposes `Verbatim` for an implementer who
/// wants RFC-compliant method passthrough without touching engine internals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodPolicy {
    #[default]
    AlwaysGet,
    Verbatim,
}

impl MethodPolicy {
    fn outbound_code(self, client_code: Code) -> Code {
        match self {
            Self::AlwaysGet => Code::GET,
            Self::Verbatim => client_code,
        }
    }
}

/// Ambient hooks the engine calls out to, following the all-default,
/// no-op-unless-overridden shape of the teacher's `ServiceHandler` trait.
/// None of these can affect forwarding decisions — they exist purely for
/// logging/metrics observers to hang off of.
pub trait ProxyObserver {
    fn on_cache_hit(&mut self, _key: &str) {}

    fn on_cache_miss(&mut self, _key: &str) {}

    fn on_forward(&mut self, _key: &str, _target: Endpoint) {}

    fn on_observer_cancelled(&mut self, _mid: u16) {}

    fn on_pair_cleared(&mut self, _outbound_mid: u16) {}
}

/// No-op observer for callers that don't need hooks.
#[derive(Default)]
pub struct NullObserver;

impl ProxyObserver for NullObserver {}

/// The proxy forwarding engine (C3). Owns nothing but policy and the MID
/// source for the outbound hop; the cache and pair tables it drives, and the
/// transaction pool and transport it calls into, are all handed to it by the
/// binary that constructs one engine per UDP worker (spec §5).
pub struct ForwardingEngine<O, X> {
    method_policy: MethodPolicy,
    outbound_mids: MidAllocator,
    observer: O,
    transport: X,
}

impl<O: ProxyObserver, X: CoapTransport> ForwardingEngine<O, X> {
    pub fn new(outbound_mids: MidAllocator, observer: O, transport: X) -> Self {
        Self {
            method_policy: MethodPolicy::default(),
            outbound_mids,
            observer,
            transport,
        }
    }

    pub fn with_method_policy(mut self, policy: MethodPolicy) -> Self {
        self.method_policy = policy;
        self
    }

    /// Read access to the transport, mainly so tests can inspect what was sent.
    pub fn transport(&self) -> &X {
        &self.transport
    }

    /// Single entry point the transport hands a parsed datagram to
    /// (spec §4.3, external interface `coap_proxy_receive`).
    pub fn receive(
        &mut self,
        src_endpoint: Endpoint,
        message: &Message,
        pool: &mut TransactionPool,
        pairs: &mut PairTable,
        cache: &mut CacheTable,
        now: u64,
    ) -> Status {
        if message.code.is_request() {
            if message.proxy_uri.is_none() {
                return Status::NotAProxyRequest;
            }

            self.handle_proxy_request(src_endpoint, message, pool, pairs, cache, now)
        } else {
            self.handle_target_datagram(message, pool, pairs, cache, now)
        }
    }

    /// Implements spec §4.3.2's seven steps.
    fn handle_proxy_request(
        &mut self,
        src_endpoint: Endpoint,
        message: &Message,
        pool: &mut TransactionPool,
        pairs: &mut PairTable,
        cache: &mut CacheTable,
        now: u64,
    ) -> Status {
        let proxy_uri = message.proxy_uri.as_deref().expect("checked by caller");

        // Step 1: cache lookup.
        if let Some(cached) = cache.cache_get(proxy_uri, now) {
            self.observer.on_cache_hit(proxy_uri);

            let response_type = match message.mtype {
                MessageType::Con => MessageType::Ack,
                _ => MessageType::Non,
            };

            let mut response = Message::new(response_type, Code::CONTENT, message.mid);
            response.token = message.token.clone();
            response.content_format = cached.content_format.or(Some(APPLICATION_JSON));
            response.payload = cached.payload.clone();

            return self.reject(src_endpoint, &response, Status::Ok);
        }

        self.observer.on_cache_miss(proxy_uri);

        // Step 2: target-endpoint resolution.
        let target_endpoint = match transport::parse_proxy_uri(proxy_uri) {
            Ok(endpoint) => endpoint,
            Err(_) => return self.reject_service_unavailable(src_endpoint, message),
        };

        // Step 3: Uri-Path extraction.
        let request_path = transport::path_after_endpoint(proxy_uri).to_string();

        // Step 4: source-transaction allocation. Records the client's token
        // and type so the eventual response mirrors them (spec §4.3.3 step 2).
        let Some(source) = pool.new_transaction(message.mid, src_endpoint) else {
            return self.reject_service_unavailable(src_endpoint, message);
        };
        if let Some(source_slot) = pool.get_mut(source) {
            source_slot.set_context(message.token.clone(), message.mtype);
        }

        // Step 5: target-transaction allocation and outbound message.
        let outbound_mid = self.outbound_mids.fresh_mid();
        let Some(target) = pool.new_transaction(outbound_mid, target_endpoint) else {
            pool.clear_transaction(source);
            return self.reject_service_unavailable(src_endpoint, message);
        };

        let mut outbound = Message::new(
            message.mtype,
            self.method_policy.outbound_code(message.code),
            outbound_mid,
        );
        outbound.set_uri_path(&request_path);

        // Step 6: serialize.
        if let Some(target_slot) = pool.get_mut(target) {
            if target_slot.set_message(&outbound).is_err() {
                pool.clear_transaction(source);
                pool.clear_transaction(target);

                let mut response = Message::new(MessageType::Ack, Code::INTERNAL_SERVER_ERROR, message.mid);
                response.token = message.token.clone();
                return self.reject(src_endpoint, &response, Status::SerializationError);
            }
        }

        // Step 7: pair registration and send.
        match pairs.pair_new(outbound_mid, source, target, proxy_uri.to_string()) {
            PairStatus::Full => {
                pool.clear_transaction(source);
                pool.clear_transaction(target);
                self.reject_service_unavailable(src_endpoint, message)
            }
            PairStatus::Ok => {
                if let Some((endpoint, bytes)) = pool.send_transaction(target) {
                    self.transport.send(endpoint, &bytes);
                }

                self.observer.on_forward(proxy_uri, target_endpoint);
                Status::Ok
            }
        }
    }

    fn reject_service_unavailable(&mut self, src_endpoint: Endpoint, request: &Message) -> Status {
        let response_type = match request.mtype {
            MessageType::Con => MessageType::Ack,
            _ => MessageType::Non,
        };

        let mut response = Message::new(response_type, Code::SERVICE_UNAVAILABLE, request.mid);
        response.token = request.token.clone();

        self.reject(src_endpoint, &response, Status::ServiceUnavailable)
    }

    /// Sends an error (or cache-hit) response directly on the socket without
    /// going through the transaction pool, so replying "the pool is full"
    /// never itself needs a free slot.
    fn reject(&mut self, endpoint: Endpoint, response: &Message, status: Status) -> Status {
        match codec::Encoder::encode(response) {
            Ok(bytes) => {
                self.transport.send(endpoint, &bytes);
                status
            }
            Err(_) => Status::SerializationError,
        }
    }

    /// Implements spec §4.3.3, plus the recovered §4.5 Ping/RST checks that
    /// apply to a *found* pair's target datagram rather than only to an
    /// orphaned one.
    fn handle_target_datagram(
        &mut self,
        message: &Message,
        pool: &mut TransactionPool,
        pairs: &mut PairTable,
        cache: &mut CacheTable,
        now: u64,
    ) -> Status {
        let Some((pair, cache_key)) = pairs.pair_find(message.mid) else {
            return self.handle_orphan_datagram(message, pool);
        };
        let pair = *pair;
        let cache_key = cache_key.to_string();

        let source_mtype = pool.get(pair.source).map(|t| t.mtype).unwrap_or(MessageType::Con);
        let source_token = pool
            .get(pair.source)
            .map(|t| t.token.clone())
            .unwrap_or_default();

        let status = if message.mtype == MessageType::Rst {
            self.observer.on_observer_cancelled(message.mid);
            Status::BadGateway
        } else if message.mtype == MessageType::Con && message.code.is_empty() {
            Status::PingResponse
        } else {
            Status::Ok
        };

        let response_type = match source_mtype {
            MessageType::Con => MessageType::Ack,
            _ => MessageType::Non,
        };
        let source_mid = pool.get(pair.source).map(|t| t.mid).unwrap_or(message.mid);

        if status == Status::Ok {
            let mut response = Message::new(response_type, Code::CONTENT, source_mid);
            response.token = source_token;
            response.content_format = message.content_format.or(Some(APPLICATION_JSON));
            response.payload = message.payload.clone();

            if let Some(source_slot) = pool.get_mut(pair.source) {
                let _ = source_slot.set_message(&response);
            }

            if let Some((endpoint, bytes)) = pool.send_transaction(pair.source) {
                self.transport.send(endpoint, &bytes);
            }

            let max_age = message.max_age.unwrap_or(DEFAULT_MAX_AGE);
            cache.cache_put(&cache_key, &message.payload, message.content_format, max_age, now);
        } else if status == Status::BadGateway {
            let mut response = Message::new(response_type, Code::BAD_GATEWAY, source_mid);
            response.token = source_token;

            if let Some(source_slot) = pool.get_mut(pair.source) {
                let _ = source_slot.set_message(&response);
            }

            if let Some((endpoint, bytes)) = pool.send_transaction(pair.source) {
                self.transport.send(endpoint, &bytes);
            }
        }

        pool.clear_transaction(pair.target);
        pool.clear_transaction(pair.source);
        pairs.pair_clear(pair.outbound_mid);
        self.observer.on_pair_cleared(pair.outbound_mid);

        status
    }

    /// A datagram whose MID matches no live pair — either a stray Ping, RST,
    /// ACK for a transaction the transport already closed on its own, or
    /// noise. Mirrors the original's post-miss fallthrough in
    /// `handle_proxy_response` (spec §4.3.3 step 1).
    fn handle_orphan_datagram(&mut self, message: &Message, pool: &mut TransactionPool) -> Status {
        match message.mtype {
            MessageType::Con if message.code.is_empty() => Status::PingResponse,
            MessageType::Rst => {
                self.observer.on_observer_cancelled(message.mid);
                Status::BadGateway
            }
            MessageType::Ack => {
                if let Some(handle) = pool.get_transaction_by_mid(message.mid) {
                    pool.clear_transaction(handle);
                }
                Status::Ok
            }
            _ => Status::Ok,
        }
    }

    /// Called by the transport when a target transaction exhausts its
    /// retransmission retries (spec §4.3.5). This is not reachable from
    /// `receive` because it is not triggered by an inbound datagram.
    pub fn on_upstream_timeout(
        &mut self,
        outbound_mid: u16,
        pool: &mut TransactionPool,
        pairs: &mut PairTable,
    ) -> Status {
        let Some((pair, _)) = pairs.pair_find(outbound_mid) else {
            return Status::Ok;
        };
        let pair = *pair;

        let source_mtype = pool.get(pair.source).map(|t| t.mtype).unwrap_or(MessageType::Con);
        let source_mid = pool.get(pair.source).map(|t| t.mid).unwrap_or(0);
        let source_token = pool
            .get(pair.source)
            .map(|t| t.token.clone())
            .unwrap_or_default();

        let response_type = match source_mtype {
            MessageType::Con => MessageType::Ack,
            _ => MessageType::Non,
        };

        let mut response = Message::new(response_type, Code::GATEWAY_TIMEOUT, source_mid);
        response.token = source_token;

        if let Some(source_slot) = pool.get_mut(pair.source) {
            let _ = source_slot.set_message(&response);
        }

        if let Some((endpoint, bytes)) = pool.send_transaction(pair.source) {
            self.transport.send(endpoint, &bytes);
        }

        pool.clear_transaction(pair.target);
        pool.clear_transaction(pair.source);
        pairs.pair_clear(pair.outbound_mid);
        self.observer.on_pair_cleared(pair.outbound_mid);

        Status::GatewayTimeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Vec<(SocketAddr, Vec<u8>)>,
    }

    impl CoapTransport for RecordingTransport {
        fn send(&mut self, endpoint: SocketAddr, bytes: &[u8]) {
            self.sent.push((endpoint, bytes.to_vec()));
        }
    }

    fn client(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    fn new_engine() -> ForwardingEngine<NullObserver, RecordingTransport> {
        ForwardingEngine::new(MidAllocator::new(0x5000), NullObserver, RecordingTransport::default())
    }

    fn proxy_get(mid: u16, token: &[u8], proxy_uri: &str) -> Message {
        let mut message = Message::new(MessageType::Con, Code::GET, mid);
        message.token = Token::new(token).unwrap();
        message.proxy_uri = Some(proxy_uri.to_string());
        message
    }

    #[test]
    fn cold_miss_then_hit_round_trips_mid_and_token() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let request = proxy_get(0x1111, b"A1", "coap://[fd00::2]/sensors/humidity");
        let status = engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);
        assert_eq!(status, Status::Ok);
        assert_eq!(pairs.len(), 1);

        let (_, outbound_bytes) = engine.transport.sent.last().unwrap().clone();
        let outbound = codec::Decoder::decode(&outbound_bytes).unwrap();
        assert_eq!(outbound.code, Code::GET);
        assert_eq!(outbound.uri_path_string(), "/sensors/humidity");

        let (_, pair_outbound_mid) = (0, outbound.mid);
        let mut origin_response = Message::new(MessageType::Ack, Code::CONTENT, pair_outbound_mid);
        origin_response.content_format = Some(50);
        origin_response.max_age = Some(30);
        origin_response.payload = br#"{"h":42.0}"#.to_vec();

        let status = engine.receive(
            client("fd00::2:5683"),
            &origin_response,
            &mut pool,
            &mut pairs,
            &mut cache,
            10,
        );
        assert_eq!(status, Status::Ok);
        assert!(pairs.is_empty());

        let (_, client_bytes) = engine.transport.sent.last().unwrap().clone();
        let to_client = codec::Decoder::decode(&client_bytes).unwrap();
        assert_eq!(to_client.mid, 0x1111);
        assert_eq!(to_client.token.as_slice(), b"A1");
        assert_eq!(to_client.payload, br#"{"h":42.0}"#);

        // Second request within 30s is served from cache; no new pair.
        let request2 = proxy_get(0x1112, b"A2", "coap://[fd00::2]/sensors/humidity");
        let status = engine.receive(client("10.0.0.1:9000"), &request2, &mut pool, &mut pairs, &mut cache, 20);
        assert_eq!(status, Status::Ok);
        assert!(pairs.is_empty());

        let (_, cached_bytes) = engine.transport.sent.last().unwrap().clone();
        let cached_reply = codec::Decoder::decode(&cached_bytes).unwrap();
        assert_eq!(cached_reply.mid, 0x1112);
        assert_eq!(cached_reply.token.as_slice(), b"A2");
        assert_eq!(cached_reply.payload, br#"{"h":42.0}"#);
    }

    #[test]
    fn upstream_timeout_yields_gateway_timeout() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let request = proxy_get(0x2222, b"", "coap://[fd00::9]/x");
        engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);

        let (_, outbound_bytes) = engine.transport.sent.last().unwrap().clone();
        let outbound_mid = codec::Decoder::decode(&outbound_bytes).unwrap().mid;

        let status = engine.on_upstream_timeout(outbound_mid, &mut pool, &mut pairs);
        assert_eq!(status, Status::GatewayTimeout);
        assert!(pairs.is_empty());

        let (_, reply_bytes) = engine.transport.sent.last().unwrap().clone();
        let reply = codec::Decoder::decode(&reply_bytes).unwrap();
        assert_eq!(reply.code, Code::GATEWAY_TIMEOUT);
        assert_eq!(reply.mid, 0x2222);
    }

    #[test]
    fn upstream_rst_yields_bad_gateway() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let request = proxy_get(0x4444, b"A9", "coap://[fd00::9]/x");
        engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);

        let (_, outbound_bytes) = engine.transport.sent.last().unwrap().clone();
        let outbound_mid = codec::Decoder::decode(&outbound_bytes).unwrap().mid;

        let rst = Message::new(MessageType::Rst, Code::EMPTY, outbound_mid);
        let status = engine.receive(
            client("fd00::9:5683"),
            &rst,
            &mut pool,
            &mut pairs,
            &mut cache,
            0,
        );
        assert_eq!(status, Status::BadGateway);
        assert!(pairs.is_empty());

        let (_, reply_bytes) = engine.transport.sent.last().unwrap().clone();
        let reply = codec::Decoder::decode(&reply_bytes).unwrap();
        assert_eq!(reply.code, Code::BAD_GATEWAY);
        assert_eq!(reply.mid, 0x4444);
        assert_eq!(reply.token.as_slice(), b"A9");
    }

    #[test]
    fn malformed_proxy_uri_yields_service_unavailable() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let request = proxy_get(0x3333, b"", "::not-a-uri::");
        let status = engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);

        assert_eq!(status, Status::ServiceUnavailable);
        assert!(pairs.is_empty());

        let (_, reply_bytes) = engine.transport.sent.last().unwrap().clone();
        let reply = codec::Decoder::decode(&reply_bytes).unwrap();
        assert_eq!(reply.code, Code::SERVICE_UNAVAILABLE);
        assert_eq!(reply.mid, 0x3333);
    }

    #[test]
    fn cache_entry_expires_after_max_age() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let request = proxy_get(0x1111, b"A1", "coap://[fd00::2]/sensors/humidity");
        engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);

        let outbound_mid = codec::Decoder::decode(&engine.transport.sent.last().unwrap().1)
            .unwrap()
            .mid;
        let mut origin_response = Message::new(MessageType::Ack, Code::CONTENT, outbound_mid);
        origin_response.max_age = Some(30);
        origin_response.payload = b"hi".to_vec();
        engine.receive(client("fd00::2:5683"), &origin_response, &mut pool, &mut pairs, &mut cache, 10);

        assert!(cache.cache_get("coap://[fd00::2]/sensors/humidity", 39).is_some());
        cache.sweep_expired(41);
        assert!(cache.cache_get("coap://[fd00::2]/sensors/humidity", 41).is_none());
    }

    #[test]
    fn pair_table_saturation_falls_back_to_service_unavailable() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(8);
        let mut pairs = PairTable::new(2);
        let mut cache = CacheTable::new(8);

        for mid in 0..2u16 {
            let request = proxy_get(mid, b"", "coap://[fd00::2]/x");
            let status = engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);
            assert_eq!(status, Status::Ok);
        }

        let request = proxy_get(2, b"", "coap://[fd00::2]/x");
        let status = engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);
        assert_eq!(status, Status::ServiceUnavailable);
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn non_confirmable_request_round_trips_as_non() {
        let mut engine = new_engine();
        let mut pool = TransactionPool::new(4);
        let mut pairs = PairTable::new(4);
        let mut cache = CacheTable::new(4);

        let mut request = proxy_get(0x3333, b"", "coap://[fd00::2]/x");
        request.mtype = MessageType::Non;
        engine.receive(client("10.0.0.1:9000"), &request, &mut pool, &mut pairs, &mut cache, 0);

        let (_, outbound_bytes) = engine.transport.sent.last().unwrap().clone();
        let outbound = codec::Decoder::decode(&outbound_bytes).unwrap();
        assert_eq!(outbound.mtype, MessageType::Non);

        let mut origin_response = Message::new(MessageType::Non, Code::CONTENT, outbound.mid);
        origin_response.payload = b"ok".to_vec();
        engine.receive(client("fd00::2:5683"), &origin_response, &mut pool, &mut pairs, &mut cache, 0);

        let (_, client_bytes) = engine.transport.sent.last().unwrap().clone();
        let to_client = codec::Decoder::decode(&client_bytes).unwrap();
        assert_eq!(to_client.mtype, MessageType::Non);
        assert_eq!(to_client.mid, 0x3333);
    }
}
