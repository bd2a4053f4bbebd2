use anyhow::Result;

use codec::{Code, Decoder, Encoder, Message, MessageType, Token};
use coap_proxy_service::{CacheTable, ForwardingEngine, NullObserver, PairTable, Status};
use transport::{CoapTransport, Endpoint, MidAllocator, TransactionPool};

#[derive(Default)]
struct RecordingTransport {
    sent: Vec<(Endpoint, Vec<u8>)>,
}

impl CoapTransport for RecordingTransport {
    fn send(&mut self, endpoint: Endpoint, bytes: &[u8]) {
        self.sent.push((endpoint, bytes.to_vec()));
    }
}

#[test]
fn full_proxy_cycle_forwards_and_caches() -> Result<()> {
    let mut engine = ForwardingEngine::new(MidAllocator::new(0x5000), NullObserver, RecordingTransport::default());
    let mut pool = TransactionPool::new(4);
    let mut pairs = PairTable::new(4);
    let mut cache = CacheTable::new(4);

    let mut request = Message::new(MessageType::Con, Code::GET, 0x1111);
    request.token = Token::new(b"A1")?;
    request.proxy_uri = Some("coap://[fd00::2]/sensors/humidity".to_string());

    let client = "10.0.0.1:9000".parse().unwrap();
    let status = engine.receive(client, &request, &mut pool, &mut pairs, &mut cache, 0);
    assert_eq!(status, Status::Ok);

    let (_, outbound_bytes) = engine.transport().sent.last().unwrap().clone();
    let outbound = Decoder::decode(&outbound_bytes)?;
    assert_eq!(outbound.code, Code::GET);

    let mut origin_response = Message::new(MessageType::Ack, Code::CONTENT, outbound.mid);
    origin_response.content_format = Some(50);
    origin_response.max_age = Some(30);
    origin_response.payload = br#"{"h":42.0}"#.to_vec();

    let origin = "[fd00::2]:5683".parse().unwrap();
    let status = engine.receive(origin, &origin_response, &mut pool, &mut pairs, &mut cache, 5);
    assert_eq!(status, Status::Ok);
    assert!(pairs.is_empty());

    let (_, client_bytes) = engine.transport().sent.last().unwrap().clone();
    let to_client = Decoder::decode(&client_bytes)?;
    assert_eq!(to_client.mtype, MessageType::Ack);
    assert_eq!(to_client.mid, 0x1111);
    assert_eq!(to_client.token.as_slice(), b"A1");
    assert_eq!(to_client.payload, br#"{"h":42.0}"#);

    assert!(cache.cache_get("coap://[fd00::2]/sensors/humidity", 10).is_some());

    let _ = Encoder::encode(&to_client)?;

    Ok(())
}
