//! Internet checksum (RFC 1071) helpers for IPv4 and UDP headers.

use std::net::Ipv4Addr;

use super::IPPROTO_UDP;

/// Add `data` as big-endian 16-bit words to `sum`. An odd trailing byte is
/// padded with zero on the right.
pub fn ones_complement_add(mut sum: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        let word = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(word);
    }
    if let Some(&byte) = chunks.remainder().first() {
        sum = sum.wrapping_add((byte as u32) << 8);
    }
    sum
}

/// Fold carries back into the low 16 bits.
pub fn fold(mut sum: u32) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    sum as u16
}

/// Complemented ones'-complement sum of `data`.
///
/// Over a header whose checksum field is already filled in, a valid header
/// yields zero.
pub fn checksum16(data: &[u8]) -> u16 {
    !fold(ones_complement_add(0, data))
}

fn pseudo_header_sum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, udp_len: usize) -> u32 {
    let mut sum = ones_complement_add(0, &src_ip.octets());
    sum = ones_complement_add(sum, &dst_ip.octets());
    sum = sum.wrapping_add(IPPROTO_UDP as u32);
    sum.wrapping_add(udp_len as u32)
}

/// UDP checksum over the IPv4 pseudo-header and `segment` (UDP header with a
/// zeroed checksum field, followed by the payload).
///
/// A computed zero is returned as `0xffff`; zero on the wire means "no checksum".
pub fn udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> u16 {
    let sum = ones_complement_add(pseudo_header_sum(src_ip, dst_ip, segment.len()), segment);
    let checksum = !fold(sum);
    if checksum == 0 {
        0xffff
    } else {
        checksum
    }
}

/// Check a received UDP segment, checksum field included.
pub fn verify_udp_checksum(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, segment: &[u8]) -> bool {
    let sum = ones_complement_add(pseudo_header_sum(src_ip, dst_ip, segment.len()), segment);
    !fold(sum) == 0
}
