use std::sync::atomic::{AtomicU16, Ordering};

/// Transport-minted, monotonically increasing 16-bit message ID source.
///
/// Each CoAP endpoint allocates its own MID space (spec §3); the proxy
/// needs exactly one such space for the outbound (proxy→target) side.
///
/// # Test
///
/// ```
/// use coap_proxy_transport::MidAllocator;
///
/// let allocator = MidAllocator::new(0x5000);
/// assert_eq!(allocator.fresh_mid(), 0x5000);
/// assert_eq!(allocator.fresh_mid(), 0x5001);
/// ```
#[derive(Default)]
pub struct MidAllocator(AtomicU16);

impl MidAllocator {
    pub fn new(start: u16) -> Self {
        Self(AtomicU16::new(start))
    }

    /// Mints the next MID, wrapping at `u16::MAX` as RFC 7252 allows.
    pub fn fresh_mid(&self) -> u16 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}
