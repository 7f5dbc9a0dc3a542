//! Classic BPF program selecting inbound DHCP traffic for one socket.
//!
//! Equivalent pseudo-assembly, `L` being the link header length (14 for
//! Ethernet, 4 for the null-link family word):
//! ```text
//!   [0]  ldh  [12] / ld [0]         ; EtherType, or address family
//!   [1]  jeq  #IPv4, +0, drop
//!   [2]  ldb  [L+9]                 ; IP protocol
//!   [3]  jeq  #17, +0, drop         ; UDP
//!   [4]  ldh  [L+6]                 ; flags + fragment offset
//!   [5]  jset #0x3fff, drop, +0     ; any fragment
//!   [6]  ld   [L+16]                ; destination address
//!   [7]  jeq  #255.255.255.255, ports, +0
//!   [8]  jeq  #local, +0, drop
//!   [9]  ldx  4*([L]&0xf)           ; IP header length
//!   [10] ldh  [x+L+2]               ; UDP destination port
//!   [11] jeq  #port, +0, drop
//!   [12] ret  #-1                   ; whole packet
//!   [13] ret  #0
//! ```

use std::net::Ipv4Addr;

use crate::frame::{LinkType, ETHERTYPE_IPV4, IPPROTO_UDP};

/// One classic BPF instruction, laid out like the kernel's `struct bpf_insn`
/// (`struct sock_filter` on Linux).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BpfInsn {
    pub code: u16,
    pub jt: u8,
    pub jf: u8,
    pub k: u32,
}

const _: () = assert!(std::mem::size_of::<BpfInsn>() == 8);

// Instruction classes
pub(crate) const BPF_LD: u16 = 0x00;
pub(crate) const BPF_LDX: u16 = 0x01;
pub(crate) const BPF_JMP: u16 = 0x05;
pub(crate) const BPF_RET: u16 = 0x06;

// Sizes
pub(crate) const BPF_W: u16 = 0x00;
pub(crate) const BPF_H: u16 = 0x08;
pub(crate) const BPF_B: u16 = 0x10;

// Modes
pub(crate) const BPF_ABS: u16 = 0x20;
pub(crate) const BPF_IND: u16 = 0x40;
pub(crate) const BPF_MSH: u16 = 0xa0;

// Jumps
pub(crate) const BPF_JEQ: u16 = 0x10;
pub(crate) const BPF_JSET: u16 = 0x40;
pub(crate) const BPF_K: u16 = 0x00;

/// Snap length asking the kernel for the whole packet.
pub const ACCEPT_WHOLE_PACKET: u32 = u32::MAX;

// IPv4 header field offsets
const IP_FLAGS_OFFSET: u32 = 6;
const IP_PROTO_OFFSET: u32 = 9;
const IP_DST_OFFSET: u32 = 16;
const UDP_DST_PORT_OFFSET: u32 = 2;
const IP_FRAGMENT_BITS: u32 = 0x3fff;

fn stmt(code: u16, k: u32) -> BpfInsn {
    BpfInsn {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

fn jump(code: u16, k: u32, jt: u8, jf: u8) -> BpfInsn {
    BpfInsn { code, jt, jf, k }
}

/// The null-link family word as a `ld [0]` sees it: the kernel loads it in
/// network order while the device wrote it in host order.
pub fn af_inet_as_loaded() -> u32 {
    u32::from_be_bytes((libc::AF_INET as u32).to_ne_bytes())
}

/// Build the receive filter for a socket bound to `local_addr:port`.
///
/// Matches IPv4/UDP, non-fragmented, to `port`, addressed either to the
/// limited broadcast address or to `local_addr`.
pub fn dhcp_program(link: LinkType, local_addr: Ipv4Addr, port: u16) -> Vec<BpfInsn> {
    let l = link.header_len() as u32;
    let (load_type, ipv4_type) = match link {
        LinkType::Ethernet => (
            stmt(BPF_LD | BPF_H | BPF_ABS, 12),
            ETHERTYPE_IPV4 as u32,
        ),
        LinkType::Null => (stmt(BPF_LD | BPF_W | BPF_ABS, 0), af_inet_as_loaded()),
    };

    vec![
        // [0]
        load_type,
        // [1] IPv4? else [13]
        jump(BPF_JMP | BPF_JEQ | BPF_K, ipv4_type, 0, 11),
        // [2]
        stmt(BPF_LD | BPF_B | BPF_ABS, l + IP_PROTO_OFFSET),
        // [3] UDP? else [13]
        jump(BPF_JMP | BPF_JEQ | BPF_K, IPPROTO_UDP as u32, 0, 9),
        // [4]
        stmt(BPF_LD | BPF_H | BPF_ABS, l + IP_FLAGS_OFFSET),
        // [5] fragment -> [13]
        jump(BPF_JMP | BPF_JSET | BPF_K, IP_FRAGMENT_BITS, 7, 0),
        // [6]
        stmt(BPF_LD | BPF_W | BPF_ABS, l + IP_DST_OFFSET),
        // [7] broadcast -> [9]
        jump(BPF_JMP | BPF_JEQ | BPF_K, u32::from(Ipv4Addr::BROADCAST), 1, 0),
        // [8] ours? else [13]
        jump(BPF_JMP | BPF_JEQ | BPF_K, u32::from(local_addr), 0, 4),
        // [9]
        stmt(BPF_LDX | BPF_B | BPF_MSH, l),
        // [10]
        stmt(BPF_LD | BPF_H | BPF_IND, l + UDP_DST_PORT_OFFSET),
        // [11] port? else [13]
        jump(BPF_JMP | BPF_JEQ | BPF_K, port as u32, 0, 1),
        // [12]
        stmt(BPF_RET | BPF_K, ACCEPT_WHOLE_PACKET),
        // [13]
        stmt(BPF_RET | BPF_K, 0),
    ]
}

#[cfg(test)]
pub(crate) mod vm {
    use super::*;

    /// Run `program` over `packet` with the instruction subset the DHCP
    /// program uses. Returns the accepted snap length, 0 for a drop.
    pub(crate) fn run(program: &[BpfInsn], packet: &[u8]) -> u32 {
        let mut a: u32 = 0;
        let mut x: u32 = 0;
        let mut pc = 0usize;

        let load = |off: usize, size: u16| -> Option<u32> {
            match size {
                BPF_W => packet
                    .get(off..off + 4)
                    .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]])),
                BPF_H => packet
                    .get(off..off + 2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]) as u32),
                BPF_B => packet.get(off).map(|b| *b as u32),
                _ => None,
            }
        };

        while pc < program.len() {
            let insn = program[pc];
            let class = insn.code & 0x07;
            let size = insn.code & 0x18;
            let mode = insn.code & 0xe0;
            pc += 1;

            match class {
                c if c == BPF_LD => {
                    let off = match mode {
                        m if m == BPF_ABS => insn.k as usize,
                        m if m == BPF_IND => (x + insn.k) as usize,
                        _ => return 0,
                    };
                    a = match load(off, size) {
                        Some(v) => v,
                        None => return 0,
                    };
                }
                c if c == BPF_LDX => {
                    if mode != BPF_MSH {
                        return 0;
                    }
                    x = match packet.get(insn.k as usize) {
                        Some(b) => ((b & 0x0f) as u32) * 4,
                        None => return 0,
                    };
                }
                c if c == BPF_JMP => {
                    let taken = match insn.code & 0xf0 {
                        op if op == BPF_JEQ => a == insn.k,
                        op if op == BPF_JSET => a & insn.k != 0,
                        _ => return 0,
                    };
                    pc += if taken { insn.jt } else { insn.jf } as usize;
                }
                c if c == BPF_RET => return insn.k,
                _ => return 0,
            }
        }
        0
    }
}
