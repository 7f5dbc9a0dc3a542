//! The DHCPv4 packet as seen by the packet filter.
//!
//! The message itself is opaque here: the filter reads the addressing fields
//! when it assembles a frame and fills them in when it parses one. Encoding and
//! decoding of the DHCP body belongs to the message codec.

use std::net::Ipv4Addr;

use crate::iface::HwAddr;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Low-delay type of service, used for DHCP traffic by default.
pub const IPTOS_LOWDELAY: u8 = 0x10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkt4 {
    payload: Vec<u8>,
    local_addr: Ipv4Addr,
    local_port: u16,
    remote_addr: Ipv4Addr,
    remote_port: u16,
    local_hw_addr: Option<HwAddr>,
    remote_hw_addr: Option<HwAddr>,
    iface: String,
    ifindex: u32,
    tos: u8,
}

impl Pkt4 {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            local_addr: Ipv4Addr::UNSPECIFIED,
            local_port: DHCP_SERVER_PORT,
            remote_addr: Ipv4Addr::BROADCAST,
            remote_port: DHCP_CLIENT_PORT,
            local_hw_addr: None,
            remote_hw_addr: None,
            iface: String::new(),
            ifindex: 0,
            tos: IPTOS_LOWDELAY,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    pub fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    pub fn set_local_addr(&mut self, addr: Ipv4Addr) {
        self.local_addr = addr;
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn set_local_port(&mut self, port: u16) {
        self.local_port = port;
    }

    pub fn remote_addr(&self) -> Ipv4Addr {
        self.remote_addr
    }

    pub fn set_remote_addr(&mut self, addr: Ipv4Addr) {
        self.remote_addr = addr;
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    pub fn set_remote_port(&mut self, port: u16) {
        self.remote_port = port;
    }

    pub fn local_hw_addr(&self) -> Option<HwAddr> {
        self.local_hw_addr
    }

    pub fn set_local_hw_addr(&mut self, mac: HwAddr) {
        self.local_hw_addr = Some(mac);
    }

    /// Hardware address of the peer, when the caller knows it.
    ///
    /// Frames for a packet without one go to the Ethernet broadcast address.
    pub fn remote_hw_addr(&self) -> Option<HwAddr> {
        self.remote_hw_addr
    }

    pub fn set_remote_hw_addr(&mut self, mac: HwAddr) {
        self.remote_hw_addr = Some(mac);
    }

    pub fn iface(&self) -> &str {
        &self.iface
    }

    pub fn ifindex(&self) -> u32 {
        self.ifindex
    }

    pub fn set_iface(&mut self, name: impl Into<String>, index: u32) {
        self.iface = name.into();
        self.ifindex = index;
    }

    pub fn tos(&self) -> u8 {
        self.tos
    }

    pub fn set_tos(&mut self, tos: u8) {
        self.tos = tos;
    }
}
