//! Interface descriptor consumed by the packet filter.
//!
//! The descriptor is owned by whoever enumerates interfaces; the filter only
//! borrows it for the duration of a call.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::frame::ETHERNET_HEADER_LEN;

pub const DEFAULT_MTU: u32 = 1500;

/// Ethernet hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HwAddr(pub [u8; 6]);

impl HwAddr {
    pub const BROADCAST: HwAddr = HwAddr([0xff; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl From<[u8; 6]> for HwAddr {
    fn from(octets: [u8; 6]) -> Self {
        HwAddr(octets)
    }
}

impl fmt::Display for HwAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid MAC address format: {address}. Expected format: AA:BB:CC:DD:EE:FF")]
pub struct ParseHwAddrError {
    pub address: String,
}

impl FromStr for HwAddr {
    type Err = ParseHwAddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseHwAddrError {
            address: s.to_string(),
        };

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            mac[i] = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(HwAddr(mac))
    }
}

/// Link flags reported by the interface enumeration layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IfaceFlags {
    pub up: bool,
    pub running: bool,
    pub loopback: bool,
    pub broadcast: bool,
    pub multicast: bool,
}

impl IfaceFlags {
    /// Flags of a typical Ethernet link that is up.
    pub fn ethernet() -> Self {
        Self {
            up: true,
            running: true,
            loopback: false,
            broadcast: true,
            multicast: true,
        }
    }

    pub fn loopback() -> Self {
        Self {
            up: true,
            running: true,
            loopback: true,
            broadcast: false,
            multicast: true,
        }
    }
}

/// Read-only facts about one interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iface {
    name: String,
    index: u32,
    mac: Option<HwAddr>,
    mtu: u32,
    flags: IfaceFlags,
}

impl Iface {
    /// Describe an Ethernet interface that is up.
    pub fn new(name: impl Into<String>, index: u32, mac: HwAddr) -> Self {
        Self {
            name: name.into(),
            index,
            mac: Some(mac),
            mtu: DEFAULT_MTU,
            flags: IfaceFlags::ethernet(),
        }
    }

    /// Describe a loopback interface; it has no link-layer address.
    pub fn loopback(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
            mac: None,
            mtu: 16384,
            flags: IfaceFlags::loopback(),
        }
    }

    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn with_flags(mut self, flags: IfaceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn mac(&self) -> Option<HwAddr> {
        self.mac
    }

    pub fn mtu(&self) -> u32 {
        self.mtu
    }

    pub fn flags(&self) -> IfaceFlags {
        self.flags
    }

    pub fn is_loopback(&self) -> bool {
        self.flags.loopback
    }

    pub fn is_up(&self) -> bool {
        self.flags.up
    }

    pub fn supports_broadcast(&self) -> bool {
        self.flags.broadcast
    }

    /// Bytes needed to read one full frame: MTU plus the largest link header.
    pub fn read_buffer_len(&self) -> usize {
        self.mtu as usize + ETHERNET_HEADER_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hw_addr() {
        let mac: HwAddr = "AA:bb:CC:dd:EE:ff".parse().unwrap();
        assert_eq!(mac.octets(), [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_parse_hw_addr_invalid() {
        assert!("AA:BB:CC:DD:EE".parse::<HwAddr>().is_err());
        assert!("ZZ:BB:CC:DD:EE:FF".parse::<HwAddr>().is_err());
        assert!("AAA:BB:CC:DD:EE:F".parse::<HwAddr>().is_err());
    }

    #[test]
    fn test_format_hw_addr() {
        let mac = HwAddr([0x00, 0x1b, 0x21, 0x0a, 0xbc, 0xde]);
        assert_eq!(mac.to_string(), "00:1B:21:0A:BC:DE");
        assert!(HwAddr::BROADCAST.is_broadcast());
    }

    #[test]
    fn test_loopback_descriptor() {
        let lo = Iface::loopback("lo0", 1);
        assert!(lo.is_loopback());
        assert!(lo.mac().is_none());
        assert!(!lo.supports_broadcast());
    }

    #[test]
    fn test_read_buffer_len_covers_link_header() {
        let eth = Iface::new("em0", 2, HwAddr([2, 0, 0, 0, 0, 1])).with_mtu(1500);
        assert_eq!(eth.read_buffer_len(), 1514);
    }
}
