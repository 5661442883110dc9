//! URL validation and SSRF guard.
//!
//! Before any outbound request the remote URL's scheme is checked, its host
//! resolved, and every resolved address tested against the deny ranges. A
//! hostname that resolves to both a public and a private address is
//! rejected: one denied address denies the request.

use std::net::IpAddr;

use tracing::debug;
use url::Url;

use crate::domain::errors::ProxyError;

/// Private, loopback and link-local ranges denied by default.
pub const DEFAULT_DENY_RANGES: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
];

/// An address range in CIDR notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenyRange {
    network: IpAddr,
    prefix: u8,
}

impl DenyRange {
    /// Parses `a.b.c.d/len` or `v6::/len`.
    #[must_use]
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = cidr.split_once('/')?;
        let network: IpAddr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        (prefix <= max).then_some(Self { network, prefix })
    }

    /// Whether `ip` falls inside this range. Address families never match
    /// across each other; mapped v6 forms are canonicalized by the caller.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(self.prefix))
                };
                (u32::from(net) & mask) == (u32::from(ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = if self.prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - u32::from(self.prefix))
                };
                (u128::from(net) & mask) == (u128::from(ip) & mask)
            }
            _ => false,
        }
    }
}

/// Pre-fetch validator for remote URLs.
#[derive(Debug, Clone)]
pub struct SsrfGuard {
    deny: Vec<DenyRange>,
}

impl SsrfGuard {
    /// A guard denying the default private and loopback ranges.
    #[must_use]
    pub fn with_default_deny() -> Self {
        Self::new(
            DEFAULT_DENY_RANGES
                .iter()
                .filter_map(|cidr| DenyRange::parse(cidr))
                .collect(),
        )
    }

    /// A guard with an explicit deny list. An empty list allows everything;
    /// tests fetching from loopback origins use this.
    #[must_use]
    pub fn new(deny: Vec<DenyRange>) -> Self {
        Self { deny }
    }

    /// Validates `remote_url` and returns the resolved addresses.
    ///
    /// # Errors
    /// [`ProxyError::BadInput`] for a malformed URL, a non-http(s) scheme, or
    /// a host that does not resolve (from the client's perspective the URL is
    /// malformed); [`ProxyError::Forbidden`] when any resolved address falls
    /// in any deny range.
    pub async fn validate(&self, remote_url: &str) -> Result<Vec<IpAddr>, ProxyError> {
        let parsed = Url::parse(remote_url)
            .map_err(|e| ProxyError::bad_input(format!("failed to parse url: {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProxyError::bad_input("invalid url scheme"));
        }

        let addrs = match parsed.host() {
            Some(url::Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(url::Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(url::Host::Domain(domain)) => resolve(domain).await?,
            None => return Err(ProxyError::bad_input("url has no host")),
        };

        for ip in &addrs {
            let ip = ip.to_canonical();
            if self.deny.iter().any(|range| range.contains(ip)) {
                debug!(url = remote_url, %ip, "denied resolved address");
                return Err(ProxyError::Forbidden);
            }
        }

        Ok(addrs)
    }
}

async fn resolve(domain: &str) -> Result<Vec<IpAddr>, ProxyError> {
    let addrs: Vec<IpAddr> = tokio::net::lookup_host((domain, 0))
        .await
        .map_err(|e| ProxyError::bad_input(format!("failed to resolve host: {e}")))?
        .map(|sockaddr| sockaddr.ip())
        .collect();
    if addrs.is_empty() {
        return Err(ProxyError::bad_input("host resolved to no addresses"));
    }
    Ok(addrs)
}
