use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, BorrowedFd};

use tracing::{debug, trace};

use crate::capture::{self, CaptureRequest};
use crate::config::BpfConfig;
use crate::error::{PktFilterError, Result};
use crate::frame::{assemble_frame, parse_frame};
use crate::iface::Iface;
use crate::packet::Pkt4;
use crate::socket::{drain_fallback, fallback_required, open_fallback_socket, SocketInfo};

/// How DHCPv4 packets reach and leave the wire for one interface.
///
/// The interface manager picks one implementation at startup and keeps it
/// as `Box<dyn PktFilter>`.
pub trait PktFilter: Send + Sync {
    /// Whether replies can go straight to a client that has no address yet.
    fn is_direct_response_supported(&self) -> bool;

    /// Open the descriptors used to receive on `addr:port` over `iface`.
    fn open_socket(
        &self,
        iface: &Iface,
        addr: Ipv4Addr,
        port: u16,
        receive_bcast: bool,
        send_bcast: bool,
    ) -> Result<SocketInfo>;

    /// Read one pending packet. `Ok(None)` means nothing usable was pending:
    /// no data, or a frame that is not DHCP traffic for this socket.
    fn receive(&self, iface: &Iface, socket_info: &SocketInfo) -> Result<Option<Pkt4>>;

    /// Frame `pkt` and write it to `sockfd` in a single call.
    fn send(&self, iface: &Iface, sockfd: BorrowedFd<'_>, pkt: &Pkt4) -> Result<()>;
}

/// Packet filter over BPF capture devices.
#[derive(Debug, Clone, Default)]
pub struct PktFilterBpf {
    config: BpfConfig,
}

impl PktFilterBpf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BpfConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::with_config(BpfConfig::from_env())
    }

    pub fn config(&self) -> &BpfConfig {
        &self.config
    }
}

impl PktFilter for PktFilterBpf {
    fn is_direct_response_supported(&self) -> bool {
        true
    }

    fn open_socket(
        &self,
        iface: &Iface,
        addr: Ipv4Addr,
        port: u16,
        receive_bcast: bool,
        send_bcast: bool,
    ) -> Result<SocketInfo> {
        if !iface.is_up() {
            return Err(PktFilterError::InterfaceDown {
                interface: iface.name().to_string(),
            });
        }

        let capture = capture::open_capture(
            iface,
            CaptureRequest {
                addr,
                port,
                config: &self.config,
            },
        )?;

        // On error the capture descriptor is closed when `capture` drops.
        let fallback = if fallback_required(self.config.fallback, iface, receive_bcast) {
            Some(open_fallback_socket(iface, port)?)
        } else {
            None
        };

        debug!(
            interface = iface.name(),
            %addr,
            port,
            receive_bcast,
            send_bcast,
            fd = capture.fd.as_raw_fd(),
            fallback = fallback.is_some(),
            "opened BPF socket"
        );

        Ok(SocketInfo::new(
            addr,
            port,
            capture.fd,
            fallback,
            capture.read_buffer_len,
            capture.link,
        ))
    }

    fn receive(&self, iface: &Iface, socket_info: &SocketInfo) -> Result<Option<Pkt4>> {
        // Every broadcast the fallback holds also arrives on the capture
        // descriptor, which carries the hardware addresses.
        if let Some(fallback) = socket_info.fallback() {
            drain_fallback(iface, fallback)?;
        }

        let primary = socket_info.primary();
        let mut buf = vec![0u8; socket_info.read_buffer_len()];
        let frame = match capture::read_frame(primary, &mut buf) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                trace!(interface = iface.name(), "no complete frame in read");
                return Ok(None);
            }
            Err(err) if is_no_data(&err) => return Ok(None),
            Err(source) => {
                return Err(PktFilterError::Receive {
                    interface: iface.name().to_string(),
                    fd: primary.as_raw_fd(),
                    source,
                })
            }
        };

        let mut pkt = match parse_frame(socket_info.link(), frame, self.config.verify_udp_checksum)
        {
            Ok(pkt) => pkt,
            Err(reason) => {
                trace!(interface = iface.name(), len = frame.len(), %reason, "discarded frame");
                return Ok(None);
            }
        };

        if pkt.local_port() != socket_info.port() {
            trace!(
                interface = iface.name(),
                port = pkt.local_port(),
                "discarded frame for another port"
            );
            return Ok(None);
        }

        pkt.set_iface(iface.name(), iface.index());
        Ok(Some(pkt))
    }

    fn send(&self, iface: &Iface, sockfd: BorrowedFd<'_>, pkt: &Pkt4) -> Result<()> {
        let link = capture::link_type(iface);
        let frame = assemble_frame(link, iface, pkt)?;

        let limit = iface.mtu() as usize + link.header_len();
        if frame.len() > limit {
            return Err(PktFilterError::FrameTooLarge {
                interface: iface.name().to_string(),
                len: frame.len(),
                limit,
            });
        }

        let fd = sockfd.as_raw_fd();
        let written =
            unsafe { libc::write(fd, frame.as_ptr() as *const libc::c_void, frame.len()) };
        if written < 0 {
            return Err(PktFilterError::send_error(
                iface.name(),
                fd,
                io::Error::last_os_error(),
            ));
        }
        if written as usize != frame.len() {
            return Err(PktFilterError::ShortWrite {
                interface: iface.name().to_string(),
                fd,
                written: written as usize,
                expected: frame.len(),
            });
        }

        trace!(
            interface = iface.name(),
            len = frame.len(),
            dst = %pkt.remote_addr(),
            "sent frame"
        );
        Ok(())
    }
}

fn is_no_data(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
