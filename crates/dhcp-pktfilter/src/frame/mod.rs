//! Link/IPv4/UDP framing for DHCPv4 traffic that bypasses the kernel IP stack.

mod assemble;
pub mod checksum;
mod parse;

pub use assemble::{
    assemble_frame, write_af_pseudo_header, write_ethernet_header, write_ipv4_udp_headers,
};
pub use parse::{parse_frame, Discard};

use crate::iface::Iface;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const AF_PSEUDO_HEADER_LEN: usize = 4;
pub const IPV4_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const IPPROTO_UDP: u8 = 17;

pub(crate) const IPV4_FLAG_DF: u16 = 0x4000;
pub(crate) const IPV4_FLAG_MF: u16 = 0x2000;
pub(crate) const IPV4_FRAG_OFFSET_MASK: u16 = 0x1fff;
pub(crate) const DEFAULT_TTL: u8 = 128;

/// Largest DHCP payload that still fits an IPv4 total length field.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - IPV4_HEADER_LEN - UDP_HEADER_LEN;

/// Link-layer framing of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// No link header; a 4-byte address family precedes the IPv4 header.
    Null,
    Ethernet,
}

impl LinkType {
    /// Framing BPF uses on this interface: loopback devices carry the
    /// address-family pseudo-header, everything else Ethernet.
    pub fn for_iface(iface: &Iface) -> Self {
        if iface.is_loopback() {
            LinkType::Null
        } else {
            LinkType::Ethernet
        }
    }

    pub fn header_len(self) -> usize {
        match self {
            LinkType::Null => AF_PSEUDO_HEADER_LEN,
            LinkType::Ethernet => ETHERNET_HEADER_LEN,
        }
    }

    /// Shortest frame that can carry an IPv4 header and a UDP header.
    pub fn min_frame_len(self) -> usize {
        self.header_len() + IPV4_HEADER_LEN + UDP_HEADER_LEN
    }
}
