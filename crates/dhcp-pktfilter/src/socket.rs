use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use tracing::{debug, trace, warn};

use crate::config::FallbackMode;
use crate::error::{PktFilterError, Result};
use crate::frame::LinkType;
use crate::iface::Iface;

/// Descriptors opened for one interface/address/port.
///
/// Both descriptors are owned and closed when the value is dropped.
#[derive(Debug)]
pub struct SocketInfo {
    addr: Ipv4Addr,
    port: u16,
    primary: OwnedFd,
    fallback: Option<OwnedFd>,
    read_buffer_len: usize,
    link: LinkType,
}

impl SocketInfo {
    pub fn new(
        addr: Ipv4Addr,
        port: u16,
        primary: OwnedFd,
        fallback: Option<OwnedFd>,
        read_buffer_len: usize,
        link: LinkType,
    ) -> Self {
        Self {
            addr,
            port,
            primary,
            fallback,
            read_buffer_len,
            link,
        }
    }

    pub fn addr(&self) -> Ipv4Addr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The capture descriptor; pass it to `send`.
    pub fn primary(&self) -> BorrowedFd<'_> {
        self.primary.as_fd()
    }

    pub fn fallback(&self) -> Option<BorrowedFd<'_>> {
        self.fallback.as_ref().map(|fd| fd.as_fd())
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Size of the buffer one read on the primary descriptor needs.
    pub fn read_buffer_len(&self) -> usize {
        self.read_buffer_len
    }

    pub fn link(&self) -> LinkType {
        self.link
    }
}

/// Datagrams discarded from the fallback socket per `drain_fallback` call.
const MAX_DRAIN_PER_CALL: usize = 64;

/// Whether `open_socket` pairs the capture descriptor with a fallback socket.
///
/// Under `Auto` the fallback is opened for broadcast receive on links that
/// carry broadcast traffic. Loopback and point-to-point links never see a
/// broadcast DHCP query.
pub fn fallback_required(mode: FallbackMode, iface: &Iface, receive_bcast: bool) -> bool {
    match mode {
        FallbackMode::Always => true,
        FallbackMode::Never => false,
        FallbackMode::Auto => {
            receive_bcast && iface.supports_broadcast() && !iface.is_loopback()
        }
    }
}

/// Open the non-blocking UDP socket that holds `port` for broadcast DHCP
/// traffic.
///
/// The capture descriptor already delivers every frame this socket would
/// see, so its datagrams are only drained, never returned. Holding the port
/// keeps the IP stack from answering client broadcasts with ICMP port
/// unreachable.
///
/// It is bound to the limited broadcast address. Stacks that refuse a
/// broadcast bind get the wildcard address instead.
pub fn open_fallback_socket(iface: &Iface, port: u16) -> Result<OwnedFd> {
    let fallback_error = |addr: Ipv4Addr, source: io::Error| PktFilterError::FallbackSocket {
        interface: iface.name().to_string(),
        addr,
        port,
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| fallback_error(Ipv4Addr::BROADCAST, e))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| fallback_error(Ipv4Addr::BROADCAST, e))?;
    socket
        .set_broadcast(true)
        .map_err(|e| fallback_error(Ipv4Addr::BROADCAST, e))?;

    let mut bound = Ipv4Addr::BROADCAST;
    if let Err(err) = socket.bind(&SockAddr::from(SocketAddrV4::new(bound, port))) {
        if err.kind() != io::ErrorKind::AddrNotAvailable {
            return Err(fallback_error(bound, err));
        }
        warn!(
            interface = iface.name(),
            port, "broadcast bind refused, binding fallback socket to the wildcard address"
        );
        bound = Ipv4Addr::UNSPECIFIED;
        socket
            .bind(&SockAddr::from(SocketAddrV4::new(bound, port)))
            .map_err(|e| fallback_error(bound, e))?;
    }

    socket
        .set_nonblocking(true)
        .map_err(|e| fallback_error(bound, e))?;

    debug!(
        interface = iface.name(),
        local = ?socket.local_addr().ok().and_then(|a| a.as_socket()),
        "fallback socket ready"
    );
    Ok(socket.into())
}

/// Local address of a fallback descriptor, for logging and tests.
pub fn fallback_local_addr(fd: BorrowedFd<'_>) -> io::Result<Option<SocketAddr>> {
    let socket = SockRef::from(&fd);
    Ok(socket.local_addr()?.as_socket())
}

/// Read and discard datagrams queued on the fallback socket so its buffer
/// never fills. Returns how many were dropped.
pub fn drain_fallback(iface: &Iface, fd: BorrowedFd<'_>) -> Result<usize> {
    let socket = SockRef::from(&fd);
    let mut buf = [0u8; 2048];
    let mut drained = 0;
    while drained < MAX_DRAIN_PER_CALL {
        match (&*socket).read(&mut buf) {
            Ok(_) => drained += 1,
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                break
            }
            Err(source) => {
                return Err(PktFilterError::Receive {
                    interface: iface.name().to_string(),
                    fd: fd.as_raw_fd(),
                    source,
                })
            }
        }
    }
    if drained > 0 {
        trace!(interface = iface.name(), drained, "discarded fallback datagrams");
    }
    Ok(drained)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::{HwAddr, IfaceFlags};
    use std::net::UdpSocket;

    fn ethernet() -> Iface {
        Iface::new("em0", 2, HwAddr([2, 0, 0, 0, 0, 1]))
    }

    #[test]
    fn test_socket_info_accessors() {
        let primary: OwnedFd = UdpSocket::bind("127.0.0.1:0").unwrap().into();
        let fallback: OwnedFd = UdpSocket::bind("127.0.0.1:0").unwrap().into();
        let info = SocketInfo::new(
            Ipv4Addr::new(192, 0, 2, 1),
            67,
            primary,
            Some(fallback),
            4096,
            LinkType::Ethernet,
        );
        assert_eq!(info.addr(), Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(info.port(), 67);
        assert!(info.has_fallback());
        assert!(info.fallback().is_some());
        assert_eq!(info.read_buffer_len(), 4096);
        assert_eq!(info.link(), LinkType::Ethernet);
    }

    #[test]
    fn test_open_fallback_socket_on_ephemeral_port() {
        let iface = Iface::loopback("lo", 1);
        let fd = open_fallback_socket(&iface, 0).unwrap();
        let local = fallback_local_addr(fd.as_fd()).unwrap().unwrap();
        assert!(local.port() != 0);
        match local.ip() {
            std::net::IpAddr::V4(ip) => {
                assert!(ip == Ipv4Addr::BROADCAST || ip == Ipv4Addr::UNSPECIFIED)
            }
            other => panic!("unexpected fallback address {other}"),
        }
    }

    #[test]
    fn test_fallback_required_auto_follows_link_and_request() {
        let eth = ethernet();
        assert!(fallback_required(FallbackMode::Auto, &eth, true));
        assert!(!fallback_required(FallbackMode::Auto, &eth, false));
        assert!(!fallback_required(FallbackMode::Auto, &Iface::loopback("lo0", 1), true));

        let ptp = ethernet().with_flags(IfaceFlags {
            broadcast: false,
            ..IfaceFlags::ethernet()
        });
        assert!(!fallback_required(FallbackMode::Auto, &ptp, true));
    }

    #[test]
    fn test_fallback_required_explicit_modes() {
        let lo = Iface::loopback("lo0", 1);
        assert!(fallback_required(FallbackMode::Always, &lo, false));
        assert!(!fallback_required(FallbackMode::Never, &ethernet(), true));
    }

    #[test]
    fn test_drain_fallback_empties_queue() {
        let fallback = UdpSocket::bind("127.0.0.1:0").unwrap();
        fallback.set_nonblocking(true).unwrap();
        let addr = fallback.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        for _ in 0..3 {
            client.send_to(b"DISCOVER", addr).unwrap();
        }
        std::thread::sleep(std::time::Duration::from_millis(20));

        let iface = Iface::loopback("lo", 1);
        assert_eq!(drain_fallback(&iface, fallback.as_fd()).unwrap(), 3);
        assert_eq!(drain_fallback(&iface, fallback.as_fd()).unwrap(), 0);
    }
}
