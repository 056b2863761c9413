//! Private and internal address detection.

use std::net::{IpAddr, SocketAddr};

use rookery_core::error::ToolError;
use url::Url;

/// Whether an IP address is in a range a tool must never reach.
pub fn is_restricted_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_documentation()
                || v4.is_unspecified()
                || v4.is_multicast()
                // CGNAT: 100.64.0.0/10
                || matches!(v4.octets(), [100, 64..=127, ..])
                // IETF protocol assignments: 192.0.0.0/24
                || matches!(v4.octets(), [192, 0, 0, _])
                // Benchmarking: 198.18.0.0/15
                || matches!(v4.octets(), [198, 18..=19, ..])
                // Reserved: 240.0.0.0/4
                || matches!(v4.octets(), [240..=255, ..])
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_restricted_ip(&IpAddr::V4(v4));
            }
            v6.is_loopback()
                || v6.is_unspecified()
                || v6.is_multicast()
                // Unique local: fc00::/7
                || matches!(v6.segments(), [0xfc00..=0xfdff, ..])
                // Link-local: fe80::/10
                || matches!(v6.segments(), [0xfe80..=0xfebf, ..])
                // Documentation: 2001:db8::/32
                || matches!(v6.segments(), [0x2001, 0xdb8, ..])
        }
    }
}

/// Resolve the URL's host and reject it if any address is restricted.
///
/// Catches allowlisted names whose DNS points inside the network.
pub async fn resolve_and_check(url: &Url) -> Result<Vec<SocketAddr>, ToolError> {
    let host = url
        .host_str()
        .ok_or_else(|| ToolError::BlockedUrl("url has no host".into()))?;
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| ToolError::failed("fetch_url", format!("DNS resolution failed for '{host}': {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(ToolError::failed(
            "fetch_url",
            format!("DNS resolved zero addresses for '{host}'"),
        ));
    }

    if let Some(bad) = addrs.iter().find(|a| is_restricted_ip(&a.ip())) {
        return Err(ToolError::BlockedUrl(format!(
            "'{host}' resolves to internal address {}",
            bad.ip()
        )));
    }

    Ok(addrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn restricted_v4_ranges() {
        for addr in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "224.0.0.1",
            "255.255.255.255",
        ] {
            assert!(is_restricted_ip(&ip(addr)), "{addr}");
        }
    }

    #[test]
    fn public_addresses_pass() {
        for addr in ["8.8.8.8", "208.80.154.224", "2620:0:861:ed1a::1"] {
            assert!(!is_restricted_ip(&ip(addr)), "{addr}");
        }
    }

    #[test]
    fn restricted_v6_ranges() {
        for addr in ["::1", "fd00::1", "fe80::1", "2001:db8::1", "::ffff:127.0.0.1"] {
            assert!(is_restricted_ip(&ip(addr)), "{addr}");
        }
    }

    #[tokio::test]
    async fn loopback_name_resolution_is_rejected() {
        let url = Url::parse("http://127.0.0.1:9/").unwrap();
        let err = resolve_and_check(&url).await.unwrap_err();
        assert!(matches!(err, ToolError::BlockedUrl(_)));
    }
}
