//! BSD `ioctl(2)` request numbers and argument structures for BPF devices.

use std::mem::size_of;

use crate::bpf::BpfInsn;

const IOCPARM_MASK: u32 = 0x1fff;
const IOC_OUT: u32 = 0x4000_0000;
const IOC_IN: u32 = 0x8000_0000;
const IOC_INOUT: u32 = IOC_IN | IOC_OUT;

const fn ioc(dir: u32, group: u8, num: u8, len: usize) -> libc::c_ulong {
    (dir | ((len as u32 & IOCPARM_MASK) << 16) | ((group as u32) << 8) | num as u32)
        as libc::c_ulong
}

const fn ior(num: u8, len: usize) -> libc::c_ulong {
    ioc(IOC_OUT, b'B', num, len)
}

const fn iow(num: u8, len: usize) -> libc::c_ulong {
    ioc(IOC_IN, b'B', num, len)
}

const fn iowr(num: u8, len: usize) -> libc::c_ulong {
    ioc(IOC_INOUT, b'B', num, len)
}

pub const IFNAMSIZ: usize = 16;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct BpfVersion {
    pub major: u16,
    pub minor: u16,
}

pub const BPF_MAJOR_VERSION: u16 = 1;
pub const BPF_MINOR_VERSION: u16 = 1;

#[repr(C)]
#[derive(Debug)]
pub struct BpfProgram {
    pub len: libc::c_uint,
    pub insns: *mut BpfInsn,
}

/// `struct ifreq` as far as `BIOCSETIF` reads it: the name, then a 16-byte union.
#[repr(C)]
#[derive(Debug, Default)]
pub struct IfReq {
    pub name: [u8; IFNAMSIZ],
    pub data: [u8; 16],
}

impl IfReq {
    /// `None` when the name does not fit with its NUL terminator.
    pub fn with_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= IFNAMSIZ || bytes.contains(&0) {
            return None;
        }
        let mut req = IfReq::default();
        req.name[..bytes.len()].copy_from_slice(bytes);
        Some(req)
    }
}

pub const BIOCGBLEN: libc::c_ulong = ior(102, size_of::<libc::c_uint>());
pub const BIOCSBLEN: libc::c_ulong = iowr(102, size_of::<libc::c_uint>());
pub const BIOCSETF: libc::c_ulong = iow(103, size_of::<BpfProgram>());
pub const BIOCGDLT: libc::c_ulong = ior(106, size_of::<libc::c_uint>());
pub const BIOCSETIF: libc::c_ulong = iow(108, size_of::<IfReq>());
pub const BIOCIMMEDIATE: libc::c_ulong = iow(112, size_of::<libc::c_uint>());
pub const BIOCVERSION: libc::c_ulong = ior(113, size_of::<BpfVersion>());

pub const DLT_NULL: libc::c_uint = 0;
pub const DLT_EN10MB: libc::c_uint = 1;
