//! Option numbers and the overflow bag for options the proxy does not
//! interpret but may need to re-emit verbatim under a future
//! RFC-compliant forwarding policy (see the method-forwarding design note).

/// CoAP option numbers relevant to proxying (RFC 7252 §5.10, §12.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    Observe = 6,
    UriPath = 11,
    ContentFormat = 12,
    MaxAge = 14,
    ProxyUri = 35,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValue(pub Vec<u8>);

/// Options the message model does not promote to a named field, kept in
/// ascending-number insertion order (callers re-sort before encoding).
#[derive(Debug, Clone, Default)]
pub struct Options(Vec<(u32, OptionValue)>);

impl Options {
    pub fn push(&mut self, number: u32, value: OptionValue) {
        self.0.push((number, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(u32, OptionValue)> {
        self.0.iter()
    }
}
