use std::net::{IpAddr, SocketAddr};

use crate::Error;

/// Transport address for one CoAP peer (RFC 7252's "endpoint").
pub type Endpoint = SocketAddr;

const DEFAULT_PORT: u16 = 5683;

/// Resolves a `Proxy-Uri` of the form `coap://[addr]:port/path` (port and
/// path optional) into the endpoint the proxy should forward to.
///
/// Mirrors the original's `coap_endpoint_parse`: only the bracketed literal
/// address form is accepted, matching the constrained stack's lack of a
/// resolver. A URI without a closing `]` is malformed.
///
/// # Test
///
/// ```
/// use coap_proxy_transport::parse_proxy_uri;
///
/// let endpoint = parse_proxy_uri("coap://[fd00::2]/sensors/humidity").unwrap();
/// assert_eq!(endpoint.port(), 5683);
///
/// let endpoint = parse_proxy_uri("coap://[fd00::2]:61616/x").unwrap();
/// assert_eq!(endpoint.port(), 61616);
///
/// assert!(parse_proxy_uri("::not-a-uri::").is_err());
/// ```
pub fn parse_proxy_uri(uri: &str) -> Result<Endpoint, Error> {
    let start = uri.find('[').ok_or(Error::MalformedUri)?;
    let end = uri[start..].find(']').map(|i| i + start).ok_or(Error::MalformedUri)?;

    let addr: IpAddr = uri[start + 1..end]
        .parse()
        .map_err(|_| Error::MalformedUri)?;

    let rest = &uri[end + 1..];
    let port = if let Some(path_start) = rest.find('/') {
        parse_port(&rest[..path_start])?
    } else {
        parse_port(rest)?
    };

    Ok(SocketAddr::new(addr, port))
}

fn parse_port(segment: &str) -> Result<u16, Error> {
    if let Some(digits) = segment.strip_prefix(':') {
        digits.parse().map_err(|_| Error::MalformedUri)
    } else if segment.is_empty() {
        Ok(DEFAULT_PORT)
    } else {
        Err(Error::MalformedUri)
    }
}

/// Extracts the origin-side `Uri-Path` as the substring of `Proxy-Uri` after
/// the first `]` (spec §4.3.2 step 3). Defaults to `/` when no bracket is
/// present or nothing follows it.
///
/// # Test
///
/// ```
/// use coap_proxy_transport::path_after_endpoint;
///
/// assert_eq!(path_after_endpoint("coap://[fd00::2]/sensors/humidity"), "/sensors/humidity");
/// assert_eq!(path_after_endpoint("coap://[fd00::2]"), "/");
/// assert_eq!(path_after_endpoint("::not-a-uri::"), "/");
/// ```
pub fn path_after_endpoint(uri: &str) -> &str {
    match uri.find(']') {
        Some(i) => {
            let rest = &uri[i + 1..];
            let rest = match rest.find('/') {
                Some(j) => &rest[j..],
                None => "",
            };

            if rest.is_empty() { "/" } else { rest }
        }
        None => "/",
    }
}
