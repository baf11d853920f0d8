//! IPv4 prefix type for route and user match entries.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network prefix in CIDR notation.
///
/// A bare address (`"10.0.0.1"`) parses as a host route (`/32`). The stored
/// address is not masked, so [`Ipv4Prefix::network`] must be used when the
/// canonical network address is needed.
///
/// ```
/// use tipsy_types::Ipv4Prefix;
///
/// let prefix: Ipv4Prefix = "192.168.1.0/24".parse().unwrap();
/// assert_eq!(prefix.len(), 24);
/// assert!(prefix.contains("192.168.1.77".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Prefix {
    addr: Ipv4Addr,
    len: u8,
}

impl Ipv4Prefix {
    pub const MAX_LEN: u8 = 32;

    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Self, ParseError> {
        if len > Self::MAX_LEN {
            return Err(ParseError::InvalidIpPrefix(format!("{}/{}", addr, len)));
        }
        Ok(Self { addr, len })
    }

    /// A `/32` host prefix.
    pub const fn host(addr: Ipv4Addr) -> Self {
        Self { addr, len: 32 }
    }

    pub const fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> u8 {
        self.len
    }

    /// Netmask for this prefix length.
    pub fn mask(&self) -> Ipv4Addr {
        let bits = if self.len == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.len))
        };
        Ipv4Addr::from(bits)
    }

    /// Address with the host bits cleared.
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.addr) & u32::from(self.mask()))
    }

    pub fn is_host(&self) -> bool {
        self.len == 32
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & u32::from(self.mask()) == u32::from(self.network())
    }
}

impl fmt::Display for Ipv4Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len) = match s.split_once('/') {
            Some((addr, len)) => {
                let len: u8 = len
                    .parse()
                    .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
                (addr, len)
            }
            None => (s, 32),
        };

        let addr: Ipv4Addr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpAddress(addr_str.to_string()))?;

        Ipv4Prefix::new(addr, len).map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))
    }
}

impl TryFrom<String> for Ipv4Prefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ipv4Prefix> for String {
    fn from(prefix: Ipv4Prefix) -> String {
        prefix.to_string()
    }
}

impl From<Ipv4Addr> for Ipv4Prefix {
    fn from(addr: Ipv4Addr) -> Self {
        Ipv4Prefix::host(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_cidr() {
        let prefix: Ipv4Prefix = "10.1.2.3/16".parse().unwrap();
        assert_eq!(prefix.addr(), Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(prefix.network(), Ipv4Addr::new(10, 1, 0, 0));
        assert_eq!(prefix.mask(), Ipv4Addr::new(255, 255, 0, 0));
    }

    #[test]
    fn test_bare_address_is_host_route() {
        let prefix: Ipv4Prefix = "10.0.0.1".parse().unwrap();
        assert!(prefix.is_host());
        assert_eq!(prefix.mask(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_default_route() {
        let prefix: Ipv4Prefix = "0.0.0.0/0".parse().unwrap();
        assert_eq!(prefix.mask(), Ipv4Addr::UNSPECIFIED);
        assert!(prefix.contains(Ipv4Addr::new(8, 8, 8, 8)));
    }

    #[test]
    fn test_contains() {
        let prefix: Ipv4Prefix = "192.168.0.0/23".parse().unwrap();
        assert!(prefix.contains(Ipv4Addr::new(192, 168, 1, 255)));
        assert!(!prefix.contains(Ipv4Addr::new(192, 168, 2, 0)));
    }

    #[test]
    fn test_invalid() {
        assert!("10.0.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0/8".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/x".parse::<Ipv4Prefix>().is_err());
    }
}
