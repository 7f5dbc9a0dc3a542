use std::fmt;
use std::net::Ipv4Addr;

use crate::iface::HwAddr;
use crate::packet::Pkt4;

use super::checksum::{checksum16, verify_udp_checksum};
use super::{
    LinkType, ETHERTYPE_IPV4, IPPROTO_UDP, IPV4_FLAG_MF, IPV4_FRAG_OFFSET_MASK, IPV4_HEADER_LEN,
    UDP_HEADER_LEN,
};

/// Why an inbound frame was dropped. Discards are expected noise on a shared
/// capture channel, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discard {
    Truncated,
    NotIpv4,
    BadIpHeader,
    IpChecksum,
    Fragment,
    NotUdp,
    BadUdpLength,
    UdpChecksum,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Discard::Truncated => "frame shorter than link, IPv4 and UDP headers",
            Discard::NotIpv4 => "not an IPv4 frame",
            Discard::BadIpHeader => "malformed IPv4 header",
            Discard::IpChecksum => "IPv4 header checksum mismatch",
            Discard::Fragment => "IPv4 fragment",
            Discard::NotUdp => "not UDP",
            Discard::BadUdpLength => "UDP length inconsistent with IPv4 length",
            Discard::UdpChecksum => "UDP checksum mismatch",
        };
        f.write_str(reason)
    }
}

fn ipv4_at(bytes: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    )
}

fn be16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Strip link, IPv4 and UDP headers from `frame` and rebuild the DHCP packet.
///
/// The sender becomes the packet's remote end, the destination its local end.
/// A zero UDP checksum means the sender did not compute one and is accepted.
pub fn parse_frame(
    link: LinkType,
    frame: &[u8],
    verify_udp: bool,
) -> std::result::Result<Pkt4, Discard> {
    if frame.len() < link.min_frame_len() {
        return Err(Discard::Truncated);
    }

    let mut local_hw = None;
    let mut remote_hw = None;
    match link {
        LinkType::Null => {
            let family = u32::from_ne_bytes([frame[0], frame[1], frame[2], frame[3]]);
            if family != libc::AF_INET as u32 {
                return Err(Discard::NotIpv4);
            }
        }
        LinkType::Ethernet => {
            if be16_at(frame, 12) != ETHERTYPE_IPV4 {
                return Err(Discard::NotIpv4);
            }
            let mut dst = [0u8; 6];
            let mut src = [0u8; 6];
            dst.copy_from_slice(&frame[0..6]);
            src.copy_from_slice(&frame[6..12]);
            local_hw = Some(HwAddr(dst));
            remote_hw = Some(HwAddr(src));
        }
    }

    let ip = &frame[link.header_len()..];
    if ip[0] >> 4 != 4 {
        return Err(Discard::NotIpv4);
    }
    let ihl = (ip[0] & 0x0f) as usize * 4;
    if ihl < IPV4_HEADER_LEN || ip.len() < ihl + UDP_HEADER_LEN {
        return Err(Discard::BadIpHeader);
    }
    let total_len = be16_at(ip, 2) as usize;
    // Short Ethernet frames are padded, so the IP length bounds the packet.
    if total_len < ihl + UDP_HEADER_LEN || total_len > ip.len() {
        return Err(Discard::BadIpHeader);
    }
    if checksum16(&ip[..ihl]) != 0 {
        return Err(Discard::IpChecksum);
    }
    let frag = be16_at(ip, 6);
    if frag & (IPV4_FLAG_MF | IPV4_FRAG_OFFSET_MASK) != 0 {
        return Err(Discard::Fragment);
    }
    if ip[9] != IPPROTO_UDP {
        return Err(Discard::NotUdp);
    }
    let src_ip = ipv4_at(ip, 12);
    let dst_ip = ipv4_at(ip, 16);

    let udp = &ip[ihl..total_len];
    let udp_len = be16_at(udp, 4) as usize;
    if udp_len < UDP_HEADER_LEN || udp_len > udp.len() {
        return Err(Discard::BadUdpLength);
    }
    let udp = &udp[..udp_len];
    if verify_udp && be16_at(udp, 6) != 0 && !verify_udp_checksum(src_ip, dst_ip, udp) {
        return Err(Discard::UdpChecksum);
    }

    let mut pkt = Pkt4::new(udp[UDP_HEADER_LEN..].to_vec());
    pkt.set_remote_addr(src_ip);
    pkt.set_remote_port(be16_at(udp, 0));
    pkt.set_local_addr(dst_ip);
    pkt.set_local_port(be16_at(udp, 2));
    pkt.set_tos(ip[1]);
    if let Some(mac) = local_hw {
        pkt.set_local_hw_addr(mac);
    }
    if let Some(mac) = remote_hw {
        pkt.set_remote_hw_addr(mac);
    }
    Ok(pkt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::assemble::assemble_frame;
    use crate::frame::checksum::udp_checksum;
    use crate::frame::ETHERNET_HEADER_LEN;
    use crate::iface::Iface;

    fn client_request(payload: Vec<u8>) -> Pkt4 {
        // What a client sends before it has an address.
        let mut pkt = Pkt4::new(payload);
        pkt.set_local_addr(Ipv4Addr::UNSPECIFIED);
        pkt.set_local_port(68);
        pkt.set_remote_addr(Ipv4Addr::BROADCAST);
        pkt.set_remote_port(67);
        pkt
    }

    fn client_iface() -> Iface {
        Iface::new("eth0", 3, HwAddr([0x00, 0x1b, 0x21, 0x01, 0x02, 0x03]))
    }

    #[test]
    fn test_parse_ethernet_frame_fills_addressing() {
        let payload: Vec<u8> = (0..280).map(|i| (i * 3) as u8).collect();
        let frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(payload.clone()))
                .unwrap();

        let pkt = parse_frame(LinkType::Ethernet, &frame, true).unwrap();
        assert_eq!(pkt.payload(), payload.as_slice());
        assert_eq!(pkt.remote_addr(), Ipv4Addr::UNSPECIFIED);
        assert_eq!(pkt.remote_port(), 68);
        assert_eq!(pkt.local_addr(), Ipv4Addr::BROADCAST);
        assert_eq!(pkt.local_port(), 67);
        assert_eq!(pkt.remote_hw_addr(), client_iface().mac());
        assert_eq!(pkt.local_hw_addr(), Some(HwAddr::BROADCAST));
    }

    #[test]
    fn test_parse_null_link_frame() {
        let lo = Iface::loopback("lo0", 1);
        let mut pkt = client_request(vec![9; 33]);
        pkt.set_local_addr(Ipv4Addr::LOCALHOST);
        pkt.set_remote_addr(Ipv4Addr::LOCALHOST);
        let frame = assemble_frame(LinkType::Null, &lo, &pkt).unwrap();

        let parsed = parse_frame(LinkType::Null, &frame, true).unwrap();
        assert_eq!(parsed.payload(), &[9; 33][..]);
        assert!(parsed.remote_hw_addr().is_none());
    }

    #[test]
    fn test_truncated_frames_discarded() {
        let frame = assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![1; 8]))
            .unwrap();
        for len in [0, 13, 14, 33, 41] {
            assert_eq!(
                parse_frame(LinkType::Ethernet, &frame[..len], true).unwrap_err(),
                Discard::Truncated,
                "len {len}"
            );
        }
        assert_eq!(
            parse_frame(LinkType::Null, &[2, 0, 0], true).unwrap_err(),
            Discard::Truncated
        );
    }

    #[test]
    fn test_cut_inside_payload_is_bad_length() {
        let frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![1; 64]))
                .unwrap();
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame[..frame.len() - 1], true).unwrap_err(),
            Discard::BadIpHeader
        );
    }

    #[test]
    fn test_ethernet_padding_ignored() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![7; 4]))
                .unwrap();
        frame.resize(60, 0);
        let pkt = parse_frame(LinkType::Ethernet, &frame, true).unwrap();
        assert_eq!(pkt.payload(), &[7; 4][..]);
    }

    #[test]
    fn test_wrong_ethertype_discarded() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![0; 8]))
                .unwrap();
        frame[12..14].copy_from_slice(&0x0806u16.to_be_bytes());
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::NotIpv4
        );
    }

    #[test]
    fn test_ip_checksum_mismatch_discarded() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![0; 8]))
                .unwrap();
        frame[ETHERNET_HEADER_LEN + 8] = 1; // TTL, checksum now stale
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::IpChecksum
        );
    }

    fn rewrite_ip_checksum(frame: &mut [u8]) {
        let ip = &mut frame[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + IPV4_HEADER_LEN];
        ip[10] = 0;
        ip[11] = 0;
        let sum = checksum16(ip);
        ip[10..12].copy_from_slice(&sum.to_be_bytes());
    }

    #[test]
    fn test_non_udp_discarded() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![0; 8]))
                .unwrap();
        frame[ETHERNET_HEADER_LEN + 9] = 6;
        rewrite_ip_checksum(&mut frame);
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::NotUdp
        );
    }

    #[test]
    fn test_fragment_discarded() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![0; 8]))
                .unwrap();
        frame[ETHERNET_HEADER_LEN + 6..ETHERNET_HEADER_LEN + 8]
            .copy_from_slice(&IPV4_FLAG_MF.to_be_bytes());
        rewrite_ip_checksum(&mut frame);
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::Fragment
        );
    }

    #[test]
    fn test_udp_checksum_mismatch_discarded_only_when_verifying() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![5; 20]))
                .unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::UdpChecksum
        );
        assert!(parse_frame(LinkType::Ethernet, &frame, false).is_ok());
    }

    #[test]
    fn test_zero_udp_checksum_accepted() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![5; 20]))
                .unwrap();
        let csum = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + 6;
        frame[csum] = 0;
        frame[csum + 1] = 0;
        let last = frame.len() - 1;
        frame[last] ^= 0xff;
        let pkt = parse_frame(LinkType::Ethernet, &frame, true).unwrap();
        assert_eq!(pkt.payload().len(), 20);
    }

    #[test]
    fn test_udp_length_larger_than_ip_payload_discarded() {
        let mut frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![5; 20]))
                .unwrap();
        let len_at = ETHERNET_HEADER_LEN + IPV4_HEADER_LEN + 4;
        frame[len_at..len_at + 2].copy_from_slice(&200u16.to_be_bytes());
        assert_eq!(
            parse_frame(LinkType::Ethernet, &frame, true).unwrap_err(),
            Discard::BadUdpLength
        );
    }

    #[test]
    fn test_udp_checksum_helper_agrees_with_parser() {
        let frame =
            assemble_frame(LinkType::Ethernet, &client_iface(), &client_request(vec![1, 2, 3]))
                .unwrap();
        let mut udp = frame[ETHERNET_HEADER_LEN + IPV4_HEADER_LEN..].to_vec();
        let sent = u16::from_be_bytes([udp[6], udp[7]]);
        udp[6] = 0;
        udp[7] = 0;
        assert_eq!(
            udp_checksum(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST, &udp),
            sent
        );
    }
}
