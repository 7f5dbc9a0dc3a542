use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use tracing::debug;

use super::{Capture, CaptureRequest};
use crate::bpf::dhcp_program;
use crate::error::{PktFilterError, Result};
use crate::frame::LinkType;
use crate::iface::Iface;

/// Packet sockets hand every device, loopback included, an Ethernet header.
pub(crate) fn link_type(_iface: &Iface) -> LinkType {
    LinkType::Ethernet
}

pub(crate) fn open_capture(iface: &Iface, req: CaptureRequest<'_>) -> Result<Capture> {
    let name = iface.name();
    let mut sock_type = libc::SOCK_RAW | libc::SOCK_CLOEXEC;
    if req.config.nonblocking {
        sock_type |= libc::SOCK_NONBLOCK;
    }

    // Protocol 0: nothing is queued until the bind below, after the filter
    // is in place.
    let raw = unsafe { libc::socket(libc::AF_PACKET, sock_type, 0) };
    if raw < 0 {
        return Err(PktFilterError::open_error(
            name,
            "create packet socket",
            io::Error::last_os_error(),
        ));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let link = link_type(iface);
    let mut insns = dhcp_program(link, req.addr, req.port);
    let prog = libc::sock_fprog {
        len: insns.len() as u16,
        filter: insns.as_mut_ptr() as *mut libc::sock_filter,
    };
    setsockopt(raw, libc::SO_ATTACH_FILTER, &prog)
        .map_err(|e| PktFilterError::open_error(name, "attach socket filter", e))?;

    if let Some(size) = req.config.buffer_size {
        let size = size as libc::c_int;
        setsockopt(raw, libc::SO_RCVBUF, &size)
            .map_err(|e| PktFilterError::open_error(name, "set SO_RCVBUF", e))?;
    }

    let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
    sll.sll_family = libc::AF_PACKET as u16;
    sll.sll_protocol = (libc::ETH_P_IP as u16).to_be();
    sll.sll_ifindex = iface.index() as i32;
    let res = unsafe {
        libc::bind(
            raw,
            &sll as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
        )
    };
    if res < 0 {
        return Err(PktFilterError::open_error(
            name,
            "bind packet socket",
            io::Error::last_os_error(),
        ));
    }

    let read_buffer_len = iface.read_buffer_len();
    debug!(
        interface = name,
        ifindex = iface.index(),
        fd = raw,
        read_buffer_len,
        "packet socket ready"
    );

    Ok(Capture {
        fd,
        read_buffer_len,
        link,
    })
}

fn setsockopt<T>(fd: libc::c_int, opt: libc::c_int, value: &T) -> io::Result<()> {
    let res = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            opt,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Receive one frame. Frames this host sent and frames larger than `buf`
/// are dropped (`Ok(None)`).
pub(crate) fn read_frame<'a>(fd: BorrowedFd<'_>, buf: &'a mut [u8]) -> io::Result<Option<&'a [u8]>> {
    let mut sll: libc::sockaddr_ll = unsafe { mem::zeroed() };
    let mut sll_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
    let n = unsafe {
        libc::recvfrom(
            fd.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            libc::MSG_TRUNC,
            &mut sll as *mut _ as *mut libc::sockaddr,
            &mut sll_len,
        )
    };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let n = n as usize;
    if n > buf.len() || sll.sll_pkttype == libc::PACKET_OUTGOING as u8 {
        return Ok(None);
    }
    let frame: &'a [u8] = &buf[..n];
    Ok(Some(frame))
}
