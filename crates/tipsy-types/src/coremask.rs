//! CPU core mask as written in benchmark configurations (`"0xF"`).

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A bitmask of usable CPU cores; bit `i` set means core `i` may host a
/// dataplane worker.
///
/// ```
/// use tipsy_types::CoreMask;
///
/// let mask: CoreMask = "0x16".parse().unwrap();
/// assert_eq!(mask.active_cores(), vec![1, 2, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CoreMask(u64);

impl CoreMask {
    pub const fn new(bits: u64) -> Self {
        CoreMask(bits)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Indices of the set bits in ascending order.
    pub fn active_cores(&self) -> Vec<u32> {
        (0..u64::BITS).filter(|i| (self.0 >> i) & 1 == 1).collect()
    }
}

impl fmt::Display for CoreMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl FromStr for CoreMask {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() {
            return Err(ParseError::InvalidCoreMask(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(CoreMask)
            .map_err(|_| ParseError::InvalidCoreMask(s.to_string()))
    }
}

impl TryFrom<String> for CoreMask {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CoreMask> for String {
    fn from(mask: CoreMask) -> String {
        mask.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_with_and_without_prefix() {
        assert_eq!("0xF".parse::<CoreMask>().unwrap().bits(), 0xf);
        assert_eq!("ff".parse::<CoreMask>().unwrap().bits(), 0xff);
        assert_eq!("0X10".parse::<CoreMask>().unwrap().bits(), 0x10);
    }

    #[test]
    fn test_active_cores_ascending() {
        let mask = CoreMask::new(0b1010_0101);
        assert_eq!(mask.active_cores(), vec![0, 2, 5, 7]);
        assert_eq!(mask.count(), 4);
    }

    #[test]
    fn test_high_cores() {
        let mask = CoreMask::new(1 << 40 | 1);
        assert_eq!(mask.active_cores(), vec![0, 40]);
    }

    #[test]
    fn test_invalid() {
        assert!("".parse::<CoreMask>().is_err());
        assert!("0x".parse::<CoreMask>().is_err());
        assert!("0xZZ".parse::<CoreMask>().is_err());
    }

    #[test]
    fn test_display_roundtrip_form() {
        let mask: CoreMask = "0x0F".parse().unwrap();
        assert_eq!(mask.to_string(), "0xf");
        assert!(!mask.is_empty());
    }
}
