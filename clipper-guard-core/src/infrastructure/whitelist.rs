//! Static IP / CIDR exemptions

use ipnet::IpNet;
use std::net::IpAddr;

use crate::config::WhitelistConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid whitelist entry '{0}': expected an IP address or CIDR block")]
pub struct InvalidEntry(pub String);

/// Parse a single whitelist entry, accepting bare addresses as host routes
pub fn parse_entry(entry: &str) -> Result<IpNet, InvalidEntry> {
    let trimmed = entry.trim();
    if let Ok(net) = trimmed.parse::<IpNet>() {
        return Ok(net);
    }
    trimmed
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| InvalidEntry(entry.to_string()))
}

/// Addresses exempt from rate limiting and abuse detection.
/// Loopback is always included.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    networks: Vec<IpNet>,
}

impl Whitelist {
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    pub fn from_config(config: &WhitelistConfig) -> Result<Self, InvalidEntry> {
        let networks = config
            .ips
            .iter()
            .map(|entry| parse_entry(entry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { networks })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        if is_loopback(ip) {
            return true;
        }
        self.networks.iter().any(|net| net.contains(&ip))
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_loopback_always_whitelisted() {
        let whitelist = Whitelist::default();
        assert!(whitelist.contains(ip("127.0.0.1")));
        assert!(whitelist.contains(ip("127.8.8.8")));
        assert!(whitelist.contains(ip("::1")));
        assert!(whitelist.contains(ip("::ffff:127.0.0.1")));
        assert!(!whitelist.contains(ip("8.8.8.8")));
    }

    #[test]
    fn test_cidr_and_single_address() {
        let config = WhitelistConfig {
            ips: vec!["10.20.0.0/16".to_string(), "192.0.2.5".to_string()],
        };
        let whitelist = Whitelist::from_config(&config).unwrap();
        assert_eq!(whitelist.len(), 2);
        assert!(whitelist.contains(ip("10.20.3.4")));
        assert!(!whitelist.contains(ip("10.21.0.1")));
        assert!(whitelist.contains(ip("192.0.2.5")));
        assert!(!whitelist.contains(ip("192.0.2.6")));
    }

    #[test]
    fn test_invalid_entry() {
        assert!(parse_entry("10.0.0.0/33").is_err());
        assert!(parse_entry("localhost").is_err());
    }
}
