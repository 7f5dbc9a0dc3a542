use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use tracing::{debug, trace};

use super::ioctl::{
    BpfProgram, BpfVersion, IfReq, BIOCGBLEN, BIOCGDLT, BIOCIMMEDIATE, BIOCSBLEN, BIOCSETF,
    BIOCSETIF, BIOCVERSION, BPF_MAJOR_VERSION, BPF_MINOR_VERSION, DLT_EN10MB, DLT_NULL,
};
use super::{Capture, CaptureRequest};
use crate::bpf::{dhcp_program, record};
use crate::config::BpfConfig;
use crate::error::{PktFilterError, Result};
use crate::frame::LinkType;
use crate::iface::Iface;

/// BPF devices frame loopback traffic with the null-link family word.
pub(crate) fn link_type(iface: &Iface) -> LinkType {
    LinkType::for_iface(iface)
}

pub(crate) fn open_capture(iface: &Iface, req: CaptureRequest<'_>) -> Result<Capture> {
    let fd = open_bpf_device(iface, req.config)?;
    let raw = fd.as_raw_fd();
    let name = iface.name();

    let mut version = BpfVersion::default();
    bpf_ioctl(raw, BIOCVERSION, &mut version)
        .map_err(|e| PktFilterError::open_error(name, "query BPF version", e))?;
    if version.major != BPF_MAJOR_VERSION || version.minor < BPF_MINOR_VERSION {
        return Err(PktFilterError::Unsupported {
            interface: name.to_string(),
            reason: format!(
                "kernel BPF version {}.{} is incompatible with {}.{}",
                version.major, version.minor, BPF_MAJOR_VERSION, BPF_MINOR_VERSION
            ),
        });
    }

    // The buffer size only takes effect before the device is attached.
    if let Some(size) = req.config.buffer_size {
        let mut size = size as libc::c_uint;
        bpf_ioctl(raw, BIOCSBLEN, &mut size)
            .map_err(|e| PktFilterError::open_error(name, "set BPF buffer length", e))?;
    }

    let mut ifr = IfReq::with_name(name).ok_or_else(|| PktFilterError::Unsupported {
        interface: name.to_string(),
        reason: "interface name does not fit IFNAMSIZ".to_string(),
    })?;
    bpf_ioctl(raw, BIOCSETIF, &mut ifr)
        .map_err(|e| PktFilterError::open_error(name, "attach BPF device to interface", e))?;

    let mut buffer_len: libc::c_uint = 0;
    bpf_ioctl(raw, BIOCGBLEN, &mut buffer_len)
        .map_err(|e| PktFilterError::open_error(name, "query BPF buffer length", e))?;

    let mut dlt: libc::c_uint = 0;
    bpf_ioctl(raw, BIOCGDLT, &mut dlt)
        .map_err(|e| PktFilterError::open_error(name, "query BPF data link type", e))?;
    let link = match dlt {
        DLT_NULL => LinkType::Null,
        DLT_EN10MB => LinkType::Ethernet,
        other => {
            return Err(PktFilterError::Unsupported {
                interface: name.to_string(),
                reason: format!("data link type {other} is not Ethernet or null"),
            })
        }
    };

    let mut insns = dhcp_program(link, req.addr, req.port);
    let mut program = BpfProgram {
        len: insns.len() as libc::c_uint,
        insns: insns.as_mut_ptr(),
    };
    bpf_ioctl(raw, BIOCSETF, &mut program)
        .map_err(|e| PktFilterError::open_error(name, "install BPF filter", e))?;

    if req.config.immediate {
        let mut on: libc::c_uint = 1;
        bpf_ioctl(raw, BIOCIMMEDIATE, &mut on)
            .map_err(|e| PktFilterError::open_error(name, "enable BPF immediate mode", e))?;
    }

    if req.config.nonblocking {
        set_nonblocking(raw)
            .map_err(|e| PktFilterError::open_error(name, "set O_NONBLOCK", e))?;
    }

    debug!(
        interface = name,
        fd = raw,
        buffer_len,
        link = ?link,
        "BPF capture device ready"
    );

    Ok(Capture {
        fd,
        read_buffer_len: buffer_len as usize,
        link,
    })
}

/// Open the first free `<prefix>N` device.
fn open_bpf_device(iface: &Iface, config: &BpfConfig) -> Result<OwnedFd> {
    for unit in 0..config.max_devices {
        let path = format!("{}{}", config.device_prefix, unit);
        let c_path = CString::new(path.clone()).map_err(|_| PktFilterError::Unsupported {
            interface: iface.name().to_string(),
            reason: format!("invalid BPF device path {path:?}"),
        })?;

        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDWR | libc::O_CLOEXEC) };
        if fd >= 0 {
            trace!(interface = iface.name(), device = %path, "opened BPF device");
            return Ok(unsafe { OwnedFd::from_raw_fd(fd) });
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EBUSY) => continue,
            Some(libc::ENOENT) => break,
            _ => {
                return Err(PktFilterError::open_error(
                    iface.name(),
                    format!("open {path}"),
                    err,
                ))
            }
        }
    }

    Err(PktFilterError::DeviceUnavailable {
        interface: iface.name().to_string(),
        prefix: config.device_prefix.clone(),
        tried: config.max_devices,
    })
}

fn bpf_ioctl<T>(fd: libc::c_int, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
    let res = unsafe { libc::ioctl(fd, request, arg as *mut T as *mut libc::c_void) };
    if res < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: libc::c_int) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Read one device buffer and return the first complete frame in it.
///
/// `buf` must be at least the device's `BIOCGBLEN` length or the read fails
/// with `EINVAL`.
pub(crate) fn read_frame<'a>(fd: BorrowedFd<'_>, buf: &'a mut [u8]) -> io::Result<Option<&'a [u8]>> {
    let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    let filled: &'a [u8] = &buf[..n as usize];
    Ok(record::first_complete_frame(filled))
}
