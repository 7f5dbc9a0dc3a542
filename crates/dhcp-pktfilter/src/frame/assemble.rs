use crate::error::{PktFilterError, Result};
use crate::iface::{HwAddr, Iface};
use crate::packet::Pkt4;

use super::checksum::{checksum16, udp_checksum};
use super::{
    LinkType, DEFAULT_TTL, ETHERTYPE_IPV4, IPPROTO_UDP, IPV4_FLAG_DF, IPV4_HEADER_LEN,
    MAX_PAYLOAD_LEN, UDP_HEADER_LEN,
};

/// Write the 4-byte address-family pseudo-header used on null-link (loopback)
/// BPF devices. The family is stored in host byte order.
pub fn write_af_pseudo_header(address_family: u32, out: &mut Vec<u8>) {
    out.extend_from_slice(&address_family.to_ne_bytes());
}

pub fn write_ethernet_header(dst: HwAddr, src: HwAddr, out: &mut Vec<u8>) {
    out.extend_from_slice(&dst.octets());
    out.extend_from_slice(&src.octets());
    out.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
}

/// Append the IPv4 and UDP headers for `pkt`, followed by its payload.
///
/// Both checksums are computed once every other header field is in place.
pub fn write_ipv4_udp_headers(pkt: &Pkt4, identification: u16, out: &mut Vec<u8>) {
    let payload = pkt.payload();
    let udp_len = UDP_HEADER_LEN + payload.len();
    let total_len = IPV4_HEADER_LEN + udp_len;
    let src_ip = pkt.local_addr();
    let dst_ip = pkt.remote_addr();

    let mut ip_header = [0u8; IPV4_HEADER_LEN];
    ip_header[0] = 0x45;
    ip_header[1] = pkt.tos();
    ip_header[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    ip_header[4..6].copy_from_slice(&identification.to_be_bytes());
    ip_header[6..8].copy_from_slice(&IPV4_FLAG_DF.to_be_bytes());
    ip_header[8] = DEFAULT_TTL;
    ip_header[9] = IPPROTO_UDP;
    ip_header[12..16].copy_from_slice(&src_ip.octets());
    ip_header[16..20].copy_from_slice(&dst_ip.octets());
    let ip_checksum = checksum16(&ip_header);
    ip_header[10..12].copy_from_slice(&ip_checksum.to_be_bytes());
    out.extend_from_slice(&ip_header);

    let udp_start = out.len();
    out.extend_from_slice(&pkt.local_port().to_be_bytes());
    out.extend_from_slice(&pkt.remote_port().to_be_bytes());
    out.extend_from_slice(&(udp_len as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(payload);
    let udp_sum = udp_checksum(src_ip, dst_ip, &out[udp_start..]);
    out[udp_start + 6..udp_start + 8].copy_from_slice(&udp_sum.to_be_bytes());
}

/// Build the complete outbound frame for `pkt` on `iface`.
///
/// Ethernet frames go to the packet's remote hardware address, or to the
/// broadcast address when the caller does not know it. The source is the
/// packet's local hardware address, falling back to the interface's; an
/// all-zero address counts as unset.
pub fn assemble_frame(link: LinkType, iface: &Iface, pkt: &Pkt4) -> Result<Vec<u8>> {
    if pkt.payload().len() > MAX_PAYLOAD_LEN {
        return Err(PktFilterError::FrameTooLarge {
            interface: iface.name().to_string(),
            len: link.min_frame_len() + pkt.payload().len(),
            limit: link.min_frame_len() + MAX_PAYLOAD_LEN,
        });
    }

    let mut frame = Vec::with_capacity(link.min_frame_len() + pkt.payload().len());
    match link {
        LinkType::Null => write_af_pseudo_header(libc::AF_INET as u32, &mut frame),
        LinkType::Ethernet => {
            let dst = pkt.remote_hw_addr().unwrap_or(HwAddr::BROADCAST);
            let src = pkt
                .local_hw_addr()
                .filter(|mac| !mac.is_zero())
                .or_else(|| iface.mac())
                .unwrap_or_default();
            write_ethernet_header(dst, src, &mut frame);
        }
    }
    write_ipv4_udp_headers(pkt, rand::random::<u16>(), &mut frame);
    Ok(frame)
}
