//! Common types for the TIPSY switch controller.
//!
//! This crate provides type-safe representations of the primitives that
//! appear in pipeline and benchmark configurations:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`Ipv4Prefix`]: IPv4 network prefixes (CIDR notation)
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers
//! - [`CoreMask`]: hexadecimal CPU core masks handed to the dataplane

mod coremask;
mod ip;
mod mac;
mod vlan;

pub use coremask::CoreMask;
pub use ip::Ipv4Prefix;
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),

    #[error("invalid core mask: {0}")]
    InvalidCoreMask(String),
}
