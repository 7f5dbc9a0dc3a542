//! Platform capture devices: BSD `/dev/bpf*` and Linux packet sockets.
//!
//! Both backends install the program from [`crate::bpf::dhcp_program`] and
//! hand back one owned descriptor plus the read buffer length it needs.

use std::net::Ipv4Addr;
use std::os::fd::OwnedFd;

use crate::config::BpfConfig;
use crate::frame::LinkType;

#[cfg(any(
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
mod bsd;
#[cfg(any(
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
pub(crate) use bsd::{link_type, open_capture, read_frame};

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::{link_type, open_capture, read_frame};

#[cfg(any(
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly",
    test
))]
#[cfg_attr(target_os = "linux", allow(dead_code))]
pub(crate) mod ioctl;

/// An open, filtered capture descriptor.
#[derive(Debug)]
pub(crate) struct Capture {
    pub fd: OwnedFd,
    pub read_buffer_len: usize,
    pub link: LinkType,
}

/// Arguments shared by every backend's `open_capture`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CaptureRequest<'a> {
    pub addr: Ipv4Addr,
    pub port: u16,
    pub config: &'a BpfConfig,
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
mod unsupported {
    use std::io;
    use std::os::fd::BorrowedFd;

    use super::{Capture, CaptureRequest};
    use crate::error::{PktFilterError, Result};
    use crate::frame::LinkType;
    use crate::iface::Iface;

    pub(crate) fn link_type(iface: &Iface) -> LinkType {
        LinkType::for_iface(iface)
    }

    pub(crate) fn open_capture(iface: &Iface, _req: CaptureRequest<'_>) -> Result<Capture> {
        Err(PktFilterError::Unsupported {
            interface: iface.name().to_string(),
            reason: "no BPF capture facility on this platform".to_string(),
        })
    }

    pub(crate) fn read_frame<'a>(
        _fd: BorrowedFd<'_>,
        _buf: &'a mut [u8],
    ) -> io::Result<Option<&'a [u8]>> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "freebsd",
    target_os = "macos",
    target_os = "ios",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
pub(crate) use unsupported::{link_type, open_capture, read_frame};
