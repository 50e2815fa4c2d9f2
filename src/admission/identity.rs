//! Client identity extraction from transport addresses.

use std::net::IpAddr;

use crate::error::AdmissionError;

/// The key a client is rate limited under: the host part of its address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Derive the identity from a `host:port` or `[host]:port` address.
    ///
    /// IP hosts are normalised, so every spelling of one address shares a key.
    /// Anything else, including zoned IPv6, is kept verbatim.
    pub fn from_remote_addr(addr: &str) -> Result<Self, AdmissionError> {
        let (host, _port) = split_host_port(addr)?;
        Ok(Self::from_host(host))
    }

    fn from_host(host: &str) -> Self {
        match host.parse::<IpAddr>() {
            Ok(ip) => Self(ip.to_string()),
            Err(_) => Self(host.to_string()),
        }
    }

    /// Derive the identity from a forwarding header value.
    ///
    /// Proxies usually send a bare IP, but some append a port; both are accepted.
    /// For a list (`X-Forwarded-For: client, proxy1, proxy2`) the first entry
    /// is the client.
    pub fn from_forwarded(value: &str) -> Result<Self, AdmissionError> {
        let first = value.split(',').next().unwrap_or_default().trim();

        if first.parse::<IpAddr>().is_ok() {
            return Ok(Self::from_host(first));
        }
        Self::from_remote_addr(first)
    }

    /// Get the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split a network address of the form `host:port`, `[host]:port` or
/// `[host%zone]:port` into host and port.
///
/// IPv6 literals must be bracketed. The port is not validated and may be empty.
pub fn split_host_port(addr: &str) -> Result<(&str, &str), AdmissionError> {
    let fail = |reason: &'static str| AdmissionError::IdentityParse {
        addr: addr.to_string(),
        reason,
    };

    let colon = addr.rfind(':').ok_or_else(|| fail("missing port in address"))?;

    let (host, scan_from) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| fail("missing ']' in address"))? + 1;

        match addr.as_bytes().get(end + 1).copied() {
            None => return Err(fail("missing port in address")),
            Some(b':') if end + 1 == colon => {}
            Some(b':') => return Err(fail("too many colons in address")),
            Some(_) => return Err(fail("missing port in address")),
        }
        (&addr[1..end], (1, end + 1))
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(fail("too many colons in address"));
        }
        (host, (0, 0))
    };

    if addr[scan_from.0..].contains('[') {
        return Err(fail("unexpected '[' in address"));
    }
    if addr[scan_from.1..].contains(']') {
        return Err(fail("unexpected ']' in address"));
    }

    Ok((host, &addr[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(addr: &str) -> &'static str {
        match split_host_port(addr) {
            Err(AdmissionError::IdentityParse { reason, .. }) => reason,
            other => panic!("expected parse error for {:?}, got {:?}", addr, other),
        }
    }

    #[test]
    fn test_split_ipv4() {
        assert_eq!(split_host_port("10.0.0.1:5123").unwrap(), ("10.0.0.1", "5123"));
    }

    #[test]
    fn test_split_hostname() {
        assert_eq!(split_host_port("localhost:80").unwrap(), ("localhost", "80"));
    }

    #[test]
    fn test_split_bracketed_ipv6() {
        assert_eq!(split_host_port("[::1]:8080").unwrap(), ("::1", "8080"));
        assert_eq!(
            split_host_port("[fe80::1%eth0]:443").unwrap(),
            ("fe80::1%eth0", "443")
        );
    }

    #[test]
    fn test_split_empty_parts() {
        assert_eq!(split_host_port(":80").unwrap(), ("", "80"));
        assert_eq!(split_host_port("host:").unwrap(), ("host", ""));
    }

    #[test]
    fn test_split_errors() {
        assert_eq!(reason(""), "missing port in address");
        assert_eq!(reason("10.0.0.1"), "missing port in address");
        assert_eq!(reason("::1"), "too many colons in address");
        assert_eq!(reason("[::1]"), "missing port in address");
        assert_eq!(reason("[::1"), "missing ']' in address");
        assert_eq!(reason("[::1]x:80"), "missing port in address");
        assert_eq!(reason("[::1]:80:90"), "too many colons in address");
        assert_eq!(reason("a[b:80"), "unexpected '[' in address");
        assert_eq!(reason("a]b:80"), "unexpected ']' in address");
    }

    #[test]
    fn test_identity_from_remote_addr() {
        let identity = ClientIdentity::from_remote_addr("192.168.0.4:61000").unwrap();
        assert_eq!(identity.as_str(), "192.168.0.4");
        assert_eq!(identity.to_string(), "192.168.0.4");
    }

    #[test]
    fn test_identity_ignores_port() {
        let a = ClientIdentity::from_remote_addr("192.168.0.4:1").unwrap();
        let b = ClientIdentity::from_remote_addr("192.168.0.4:2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_identity_canonicalises_ip_spellings() {
        let bracketed = ClientIdentity::from_remote_addr("[2001:DB8::1]:80").unwrap();
        let expanded = ClientIdentity::from_remote_addr("[2001:db8:0:0:0:0:0:1]:443").unwrap();
        let forwarded = ClientIdentity::from_forwarded("2001:DB8::1").unwrap();

        assert_eq!(bracketed.as_str(), "2001:db8::1");
        assert_eq!(bracketed, expanded);
        assert_eq!(bracketed, forwarded);

        let zoned = ClientIdentity::from_remote_addr("[fe80::1%eth0]:443").unwrap();
        assert_eq!(zoned.as_str(), "fe80::1%eth0");
    }

    #[test]
    fn test_identity_from_forwarded() {
        let single = ClientIdentity::from_forwarded("203.0.113.9").unwrap();
        assert_eq!(single.as_str(), "203.0.113.9");

        let chain = ClientIdentity::from_forwarded("203.0.113.9, 10.0.0.2, 10.0.0.3").unwrap();
        assert_eq!(chain.as_str(), "203.0.113.9");

        let with_port = ClientIdentity::from_forwarded("203.0.113.9:4711").unwrap();
        assert_eq!(with_port.as_str(), "203.0.113.9");

        let v6 = ClientIdentity::from_forwarded("2001:db8::1").unwrap();
        assert_eq!(v6.as_str(), "2001:db8::1");
    }

    #[test]
    fn test_identity_from_bad_forwarded() {
        assert!(ClientIdentity::from_forwarded("not an address").is_err());
        assert!(ClientIdentity::from_forwarded("").is_err());
    }
}
