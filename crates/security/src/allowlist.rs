//! Hostname allowlist for outbound fetches.
//!
//! Matching is exact on the lowercased hostname: `en.wikipedia.org` on the
//! list does not admit `evil.en.wikipedia.org`, and `wikipedia.org` does not
//! admit `en.wikipedia.org` unless both are listed.

use std::collections::HashSet;
use std::net::IpAddr;

use rookery_core::error::ToolError;
use url::Url;

use crate::network::is_restricted_ip;

/// The set of hosts a fetch tool may contact.
#[derive(Debug, Clone, Default)]
pub struct HostAllowlist {
    hosts: HashSet<String>,
}

impl HostAllowlist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts.into_iter().map(|h| normalize_host(h.as_ref())).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Whether `host` is listed.
    pub fn allows_host(&self, host: &str) -> bool {
        self.hosts.contains(&normalize_host(host))
    }

    /// Check a URL against the policy, returning the parsed URL on success.
    ///
    /// Rules, in order:
    /// - the URL must parse and use `http` or `https`
    /// - a literal IP host must not be in a restricted range
    /// - the hostname must be on the list
    pub fn check(&self, raw: &str) -> Result<Url, ToolError> {
        let url = Url::parse(raw.trim()).map_err(|e| ToolError::BlockedUrl(format!("invalid url: {e}")))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ToolError::BlockedUrl(format!(
                    "scheme '{scheme}' is not allowed"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| ToolError::BlockedUrl("url has no host".into()))?;
        let bare = host.trim_start_matches('[').trim_end_matches(']');

        if bare.eq_ignore_ascii_case("localhost") {
            return Err(ToolError::BlockedUrl("localhost is not allowed".into()));
        }
        if let Ok(ip) = bare.parse::<IpAddr>()
            && is_restricted_ip(&ip)
        {
            return Err(ToolError::BlockedUrl(format!(
                "address {ip} is private or internal"
            )));
        }

        if !self.allows_host(host) {
            tracing::debug!(host, "Fetch blocked by allowlist");
            return Err(ToolError::DisallowedHost {
                host: normalize_host(host),
            });
        }

        Ok(url)
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
