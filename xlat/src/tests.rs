// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Translator tests: the end-to-end wire scenarios, the boundary cases, and
//! the round-trip invariant.

use crate::{ChecksumHint, ReplyPolicy, Translated, TranslateError, Translator, proto};
use etherparse::{IpNumber, Ipv4Header, Ipv6FlowLabel, Ipv6Header};
use net::checksum;
use std::net::{Ipv4Addr, Ipv6Addr};

const IPV4MTU: u16 = 1252;

fn v4(s: &str) -> Ipv4Addr {
    s.parse().unwrap()
}

fn v6(s: &str) -> Ipv6Addr {
    s.parse().unwrap()
}

fn translator() -> Translator {
    Translator::new(
        "64:ff9b::/96".parse().unwrap(),
        v6("2001:db8::1"),
        v4("192.0.0.4"),
        IPV4MTU,
    )
}

fn scratch() -> Vec<u8> {
    vec![0u8; 4096]
}

#[allow(clippy::too_many_arguments)]
fn build_v4(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    protocol: u8,
    ttl: u8,
    df: bool,
    mf: bool,
    frag_offset: u16,
    id: u16,
    l4: &[u8],
) -> Vec<u8> {
    let mut ip4 = Ipv4Header::new(
        u16::try_from(l4.len()).unwrap(),
        ttl,
        IpNumber(protocol),
        src.octets(),
        dst.octets(),
    )
    .unwrap();
    ip4.identification = id;
    ip4.dont_fragment = df;
    ip4.more_fragments = mf;
    ip4.fragment_offset = etherparse::IpFragOffset::try_new(frag_offset).unwrap();
    ip4.header_checksum = ip4.calc_header_checksum();
    let mut out = ip4.to_bytes().to_vec();
    out.extend_from_slice(l4);
    out
}

fn build_v6(src: Ipv6Addr, dst: Ipv6Addr, hop: u8, next: u8, ext: &[u8], l4: &[u8]) -> Vec<u8> {
    let ip6 = Ipv6Header {
        traffic_class: 0,
        flow_label: Ipv6FlowLabel::ZERO,
        payload_length: u16::try_from(ext.len() + l4.len()).unwrap(),
        next_header: IpNumber(next),
        hop_limit: hop,
        source: src.octets(),
        destination: dst.octets(),
    };
    let mut out = ip6.to_bytes().to_vec();
    out.extend_from_slice(ext);
    out.extend_from_slice(l4);
    out
}

fn udp_l4_v4(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let len = 8 + payload.len();
    let mut l4 = vec![0u8; len];
    l4[0..2].copy_from_slice(&sport.to_be_bytes());
    l4[2..4].copy_from_slice(&dport.to_be_bytes());
    l4[4..6].copy_from_slice(&u16::try_from(len).unwrap().to_be_bytes());
    l4[8..].copy_from_slice(payload);
    let acc = checksum::sum(
        checksum::pseudo_v4(src, dst, proto::UDP, u16::try_from(len).unwrap()),
        &l4,
    );
    let cksum = match checksum::finish(acc) {
        0 => 0xffff,
        c => c,
    };
    l4[6..8].copy_from_slice(&cksum.to_be_bytes());
    l4
}

fn udp_l4_v6(src: Ipv6Addr, dst: Ipv6Addr, sport: u16, dport: u16, payload: &[u8]) -> Vec<u8> {
    let len = 8 + payload.len();
    let mut l4 = vec![0u8; len];
    l4[0..2].copy_from_slice(&sport.to_be_bytes());
    l4[2..4].copy_from_slice(&dport.to_be_bytes());
    l4[4..6].copy_from_slice(&u16::try_from(len).unwrap().to_be_bytes());
    l4[8..].copy_from_slice(payload);
    let acc = checksum::sum(
        checksum::pseudo_v6(src, dst, proto::UDP, u32::try_from(len).unwrap()),
        &l4,
    );
    let cksum = match checksum::finish(acc) {
        0 => 0xffff,
        c => c,
    };
    l4[6..8].copy_from_slice(&cksum.to_be_bytes());
    l4
}

fn icmpv4_l4(icmp_type: u8, code: u8, rest: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut l4 = vec![icmp_type, code, 0, 0, rest[0], rest[1], rest[2], rest[3]];
    l4.extend_from_slice(payload);
    let cksum = checksum::finish(checksum::sum(0, &l4));
    l4[2..4].copy_from_slice(&cksum.to_be_bytes());
    l4
}

fn icmpv6_l4(
    src: Ipv6Addr,
    dst: Ipv6Addr,
    icmp_type: u8,
    code: u8,
    rest: [u8; 4],
    payload: &[u8],
) -> Vec<u8> {
    let mut l4 = vec![icmp_type, code, 0, 0, rest[0], rest[1], rest[2], rest[3]];
    l4.extend_from_slice(payload);
    let acc = checksum::sum(
        checksum::pseudo_v6(src, dst, proto::ICMPV6, u32::try_from(l4.len()).unwrap()),
        &l4,
    );
    let cksum = checksum::finish(acc);
    l4[2..4].copy_from_slice(&cksum.to_be_bytes());
    l4
}

fn echo_rest(id: u16, seq: u16) -> [u8; 4] {
    [
        (id >> 8) as u8,
        (id & 0xff) as u8,
        (seq >> 8) as u8,
        (seq & 0xff) as u8,
    ]
}

fn assert_icmpv6_checksum_valid(packet: &[u8]) {
    let (ip6, _) = Ipv6Header::from_slice(packet).unwrap();
    let l4 = &packet[Ipv6Header::LEN..];
    let acc = checksum::sum(
        checksum::pseudo_v6(
            Ipv6Addr::from(ip6.source),
            Ipv6Addr::from(ip6.destination),
            proto::ICMPV6,
            u32::try_from(l4.len()).unwrap(),
        ),
        l4,
    );
    assert_eq!(checksum::fold(acc), 0xffff, "icmpv6 checksum invalid");
}

fn assert_ipv4_header_checksum_valid(packet: &[u8]) {
    let (ip4, _) = Ipv4Header::from_slice(packet).unwrap();
    assert_eq!(
        ip4.calc_header_checksum(),
        ip4.header_checksum,
        "ipv4 header checksum invalid"
    );
}

// --- end-to-end scenarios ---------------------------------------------------

#[test]
fn echo_request_outbound() {
    let tr = translator();
    let payload = [0x42u8; 56];
    let l4 = icmpv4_l4(8, 0, echo_rest(0x1234, 1), &payload);
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::ICMP,
        64,
        false,
        false,
        0,
        0,
        &l4,
    );

    let mut out = scratch();
    let result = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };
    assert_eq!(len, Ipv6Header::LEN + 8 + 56);

    let (ip6, _) = Ipv6Header::from_slice(&out[..len]).unwrap();
    assert_eq!(Ipv6Addr::from(ip6.source), v6("2001:db8::1"));
    assert_eq!(Ipv6Addr::from(ip6.destination), v6("64:ff9b::808:808"));
    assert_eq!(ip6.hop_limit, 63);
    assert_eq!(ip6.next_header.0, proto::ICMPV6);
    assert_eq!(ip6.payload_length, 64);

    let icmp = &out[Ipv6Header::LEN..len];
    assert_eq!(icmp[0], 128);
    assert_eq!(icmp[1], 0);
    assert_eq!(&icmp[4..8], &echo_rest(0x1234, 1));
    assert_eq!(&icmp[8..], &payload);
    assert_icmpv6_checksum_valid(&out[..len]);
}

#[test]
fn echo_reply_inbound() {
    let tr = translator();
    let payload = [0x42u8; 56];
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    let l4 = icmpv6_l4(src, dst, 129, 0, echo_rest(0x1234, 1), &payload);
    let packet = build_v6(src, dst, 64, proto::ICMPV6, &[], &l4);

    let mut out = scratch();
    let result = tr.v6_to_v4(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };

    let (ip4, _) = Ipv4Header::from_slice(&out[..len]).unwrap();
    assert_eq!(Ipv4Addr::from(ip4.source), v4("8.8.8.8"));
    assert_eq!(Ipv4Addr::from(ip4.destination), v4("192.0.0.4"));
    assert_eq!(ip4.time_to_live, 63);
    assert_eq!(ip4.protocol.0, proto::ICMP);
    assert_ipv4_header_checksum_valid(&out[..len]);

    let icmp = &out[20..len];
    assert_eq!(icmp[0], 0, "echo reply");
    assert_eq!(&icmp[4..8], &echo_rest(0x1234, 1));
    assert_eq!(&icmp[8..], &payload);
    assert_eq!(checksum::fold(checksum::sum(0, icmp)), 0xffff);
}

#[test]
fn df_set_too_big_bounces_frag_needed() {
    let tr = translator();
    let l4 = udp_l4_v4(v4("192.0.0.4"), v4("8.8.8.8"), 4000, 53, &[0u8; 1225]);
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        64,
        true,
        false,
        0,
        0x77,
        &l4,
    );
    assert_eq!(packet.len(), 1253);

    let mut out = scratch();
    let result = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Bounce(len) = result else {
        panic!("expected bounce, got {result:?}");
    };

    assert_ipv4_header_checksum_valid(&out[..len]);
    let (ip4, _) = Ipv4Header::from_slice(&out[..len]).unwrap();
    assert_eq!(ip4.protocol.0, proto::ICMP);
    assert_eq!(Ipv4Addr::from(ip4.destination), v4("192.0.0.4"));

    let icmp = &out[20..len];
    assert_eq!(icmp[0], 3);
    assert_eq!(icmp[1], 4);
    assert_eq!(u16::from_be_bytes([icmp[6], icmp[7]]), 1252);
    assert_eq!(checksum::fold(checksum::sum(0, icmp)), 0xffff);
    // the quote is the offending header plus eight bytes
    assert_eq!(&icmp[8..], &packet[..28]);
}

#[test]
fn fragmented_udp_outbound_gets_fragment_header() {
    let tr = translator();
    // first fragment of a larger datagram; the stored checksum covers the
    // whole original datagram so any nonzero value stands in for it here
    let mut l4 = vec![0u8; 1180];
    l4[0..2].copy_from_slice(&4000u16.to_be_bytes());
    l4[2..4].copy_from_slice(&53u16.to_be_bytes());
    l4[4..6].copy_from_slice(&2000u16.to_be_bytes());
    l4[6..8].copy_from_slice(&0xabcdu16.to_be_bytes());
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        64,
        false,
        true,
        0,
        0xBEEF,
        &l4,
    );
    assert_eq!(packet.len(), 1200);

    let mut out = scratch();
    let result = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };
    assert_eq!(len, Ipv6Header::LEN + 8 + 1180);

    let (ip6, _) = Ipv6Header::from_slice(&out[..len]).unwrap();
    assert_eq!(ip6.next_header.0, proto::FRAGMENT);
    assert_eq!(ip6.payload_length, 8 + 1180);

    let frag = &out[Ipv6Header::LEN..Ipv6Header::LEN + 8];
    assert_eq!(frag[0], proto::UDP);
    // offset 0, more-fragments set
    assert_eq!(u16::from_be_bytes([frag[2], frag[3]]), 1);
    assert_eq!(u32::from_be_bytes([frag[4], frag[5], frag[6], frag[7]]), 0xBEEF);

    // transport checksum got the pseudo-header swap
    let expected = checksum::adjust(
        0xabcd,
        checksum::pseudo_v4(v4("192.0.0.4"), v4("8.8.8.8"), proto::UDP, 1180),
        checksum::pseudo_v6(
            v6("2001:db8::1"),
            v6("64:ff9b::808:808"),
            proto::UDP,
            1180,
        ),
    );
    let l4_out = &out[Ipv6Header::LEN + 8..len];
    assert_eq!(u16::from_be_bytes([l4_out[6], l4_out[7]]), expected);
}

#[test]
fn wrong_destination_is_dropped() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::2");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"nope");
    let packet = build_v6(src, dst, 64, proto::UDP, &[], &l4);

    let mut out = scratch();
    assert_eq!(
        tr.v6_to_v4(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::DestinationNotLocal(dst))
    );
}

#[test]
fn source_outside_prefix_is_dropped() {
    let tr = translator();
    let src = v6("2001:db8:bad::5");
    let dst = v6("2001:db8::1");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"nope");
    let packet = build_v6(src, dst, 64, proto::UDP, &[], &l4);

    let mut out = scratch();
    assert_eq!(
        tr.v6_to_v4(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::NotInPlat(src))
    );
}

// --- boundary cases ---------------------------------------------------------

#[test]
fn udp_zero_checksum_is_computed() {
    let tr = translator();
    let mut l4 = udp_l4_v4(v4("192.0.0.4"), v4("8.8.8.8"), 4000, 53, b"dns query");
    l4[6] = 0;
    l4[7] = 0;
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        64,
        false,
        false,
        0,
        1,
        &l4,
    );

    let mut out = scratch();
    let result = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };
    let l4_out = &out[Ipv6Header::LEN..len];
    assert_ne!(u16::from_be_bytes([l4_out[6], l4_out[7]]), 0);

    let acc = checksum::sum(
        checksum::pseudo_v6(
            v6("2001:db8::1"),
            v6("64:ff9b::808:808"),
            proto::UDP,
            u32::try_from(l4_out.len()).unwrap(),
        ),
        l4_out,
    );
    assert_eq!(checksum::fold(acc), 0xffff);
}

#[test]
fn udp_zero_checksum_on_fragment_is_dropped() {
    let tr = translator();
    let mut l4 = vec![0u8; 64];
    l4[0..2].copy_from_slice(&4000u16.to_be_bytes());
    l4[2..4].copy_from_slice(&53u16.to_be_bytes());
    l4[4..6].copy_from_slice(&500u16.to_be_bytes());
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        64,
        false,
        true,
        0,
        9,
        &l4,
    );

    let mut out = scratch();
    assert_eq!(
        tr.v4_to_v6(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::ZeroUdpChecksum)
    );
}

#[test]
fn atomic_fragment_header_is_removed() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"atomic");
    // fragment header with offset 0, M=0, identification 7
    let ext = [proto::UDP, 0, 0, 0, 0, 0, 0, 7];
    let packet = build_v6(src, dst, 64, proto::FRAGMENT, &ext, &l4);

    let mut out = scratch();
    let result = tr.v6_to_v4(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };
    let (ip4, _) = Ipv4Header::from_slice(&out[..len]).unwrap();
    assert!(ip4.dont_fragment, "atomic fragment must translate to DF=1");
    assert!(!ip4.more_fragments);
    assert_eq!(ip4.fragment_offset.value(), 0);
    assert_eq!(ip4.identification, 7);
    assert_eq!(len, 20 + l4.len());
}

#[test]
fn packet_too_big_mtu_is_clamped() {
    let tr = translator();
    let peer = v6("64:ff9b::808:808");
    let local = v6("2001:db8::1");
    // the quoted packet is our original outbound datagram
    let inner_l4 = udp_l4_v6(local, peer, 4000, 53, b"original payload");
    let inner = build_v6(local, peer, 63, proto::UDP, &[], &inner_l4);
    let l4 = icmpv6_l4(peer, local, 2, 0, 1000u32.to_be_bytes(), &inner);
    let packet = build_v6(peer, local, 64, proto::ICMPV6, &[], &l4);

    let mut out = scratch();
    let result = tr.v6_to_v4(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };

    let icmp = &out[20..len];
    assert_eq!(icmp[0], 3);
    assert_eq!(icmp[1], 4);
    // 1000 is below the IPv6 floor: clamp to 1280, minus the 28-byte delta
    assert_eq!(u16::from_be_bytes([icmp[6], icmp[7]]), 1252);
    assert_eq!(checksum::fold(checksum::sum(0, icmp)), 0xffff);

    // the embedded packet was translated too
    let embedded = &icmp[8..];
    let (inner4, _) = Ipv4Header::from_slice(embedded).unwrap();
    assert_eq!(Ipv4Addr::from(inner4.source), v4("192.0.0.4"));
    assert_eq!(Ipv4Addr::from(inner4.destination), v4("8.8.8.8"));
    assert_eq!(inner4.protocol.0, proto::UDP);
    assert_eq!(inner4.time_to_live, 63, "embedded hop limit is preserved");
}

#[test]
fn ttl_one_is_dropped_silently_by_default() {
    let tr = translator();
    let l4 = udp_l4_v4(v4("192.0.0.4"), v4("8.8.8.8"), 4000, 53, b"x");
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        1,
        false,
        false,
        0,
        1,
        &l4,
    );
    let mut out = scratch();
    assert_eq!(
        tr.v4_to_v6(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::HopLimitExpired)
    );
}

#[test]
fn ttl_one_bounces_time_exceeded_with_policy() {
    let tr = translator().with_policy(ReplyPolicy {
        time_exceeded: true,
        parameter_problem: false,
    });
    let l4 = udp_l4_v4(v4("192.0.0.4"), v4("8.8.8.8"), 4000, 53, b"x");
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        1,
        false,
        false,
        0,
        1,
        &l4,
    );
    let mut out = scratch();
    let result = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Bounce(len) = result else {
        panic!("expected bounce, got {result:?}");
    };
    let icmp = &out[20..len];
    assert_eq!(icmp[0], 11);
    assert_eq!(icmp[1], 0);
    assert_eq!(checksum::fold(checksum::sum(0, icmp)), 0xffff);
}

#[test]
fn routing_header_is_rejected() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"via");
    // routing header: next=UDP, len 0 (8 bytes), type 2, segments left 1
    let ext = [proto::UDP, 0, 2, 1, 0, 0, 0, 0];
    let packet = build_v6(src, dst, 64, proto::ROUTING, &ext, &l4);

    let mut out = scratch();
    assert_eq!(
        tr.v6_to_v4(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::RoutingHeader {
            kind: 2,
            segments_left: 1
        })
    );

    let strict = translator().with_policy(ReplyPolicy {
        time_exceeded: false,
        parameter_problem: true,
    });
    let result = strict.v6_to_v4(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Bounce(len) = result else {
        panic!("expected bounce, got {result:?}");
    };
    let icmp = &out[Ipv6Header::LEN..len];
    assert_eq!(icmp[0], 4, "parameter problem");
    assert_eq!(icmp[1], 0);
    // pointer to the segments-left field of the routing header
    assert_eq!(u32::from_be_bytes([icmp[4], icmp[5], icmp[6], icmp[7]]), 43);
    assert_icmpv6_checksum_valid(&out[..len]);
}

#[test]
fn hop_by_hop_options_are_skipped() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"opts");
    // hop-by-hop: next=UDP, len 0, PadN filling the rest
    let ext = [proto::UDP, 0, 1, 4, 0, 0, 0, 0];
    let packet = build_v6(src, dst, 64, proto::HOPOPTS, &ext, &l4);

    let mut out = scratch();
    let result = tr.v6_to_v4(&packet, ChecksumHint::None, &mut out).unwrap();
    let Translated::Forward(len) = result else {
        panic!("expected forward, got {result:?}");
    };
    let (ip4, _) = Ipv4Header::from_slice(&out[..len]).unwrap();
    assert_eq!(ip4.protocol.0, proto::UDP);
    assert_eq!(len, 20 + l4.len());
}

// --- invariants -------------------------------------------------------------

#[test]
fn inbound_roundtrip_is_lossless() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    let l4 = udp_l4_v6(src, dst, 53, 4000, b"some dns answer");
    let packet = build_v6(src, dst, 64, proto::UDP, &[], &l4);

    let mut mid = scratch();
    let Translated::Forward(len4) = tr.v6_to_v4(&packet, ChecksumHint::None, &mut mid).unwrap()
    else {
        panic!("expected forward");
    };
    let mut back = scratch();
    let Translated::Forward(len6) = tr
        .v4_to_v6(&mid[..len4], ChecksumHint::None, &mut back)
        .unwrap()
    else {
        panic!("expected forward");
    };

    assert_eq!(len6, packet.len());
    // identical up to the hop limit (decremented twice) and one's-complement
    // checksum representation
    assert_eq!(&back[..7], &packet[..7]);
    assert_eq!(back[7], packet[7] - 2);
    assert_eq!(&back[8..40], &packet[8..40]);
    assert_eq!(&back[40..46], &packet[40..46]);
    assert_eq!(&back[48..len6], &packet[48..packet.len()]);

    // and the checksum that came back is valid for the original addresses
    let l4_back = &back[Ipv6Header::LEN..len6];
    let acc = checksum::sum(
        checksum::pseudo_v6(src, dst, proto::UDP, u32::try_from(l4_back.len()).unwrap()),
        l4_back,
    );
    assert_eq!(checksum::fold(acc), 0xffff);
}

#[test]
fn roundtrip_property() {
    let tr = translator();
    let src = v6("64:ff9b::808:808");
    let dst = v6("2001:db8::1");
    bolero::check!()
        .with_type()
        .for_each(|(payload, sport, dport): &(Vec<u8>, u16, u16)| {
            let payload = &payload[..payload.len().min(1000)];
            let l4 = udp_l4_v6(src, dst, *sport, *dport, payload);
            let packet = build_v6(src, dst, 64, proto::UDP, &[], &l4);

            let mut mid = scratch();
            let Ok(Translated::Forward(len4)) = tr.v6_to_v4(&packet, ChecksumHint::None, &mut mid)
            else {
                panic!("inbound translation failed");
            };
            let mut back = scratch();
            let Ok(Translated::Forward(len6)) =
                tr.v4_to_v6(&mid[..len4], ChecksumHint::None, &mut back)
            else {
                panic!("outbound translation failed");
            };

            assert_eq!(len6, packet.len());
            // addresses and payload survive the double translation
            assert_eq!(&back[8..40], &packet[8..40]);
            assert_eq!(&back[48..len6], &packet[48..packet.len()]);
        });
}

#[test]
fn valid_tcp_checksum_stays_valid() {
    let tr = translator();
    let src4 = v4("192.0.0.4");
    let dst4 = v4("8.8.8.8");
    // minimal TCP header plus data, checksummed under the v4 pseudo header
    let mut l4 = vec![0u8; 20 + 12];
    l4[0..2].copy_from_slice(&4000u16.to_be_bytes());
    l4[2..4].copy_from_slice(&443u16.to_be_bytes());
    l4[12] = 5 << 4;
    l4[13] = 0x18; // PSH|ACK
    l4[31] = 0x61;
    let acc = checksum::sum(
        checksum::pseudo_v4(src4, dst4, proto::TCP, u16::try_from(l4.len()).unwrap()),
        &l4,
    );
    let cksum = checksum::finish(acc);
    l4[16..18].copy_from_slice(&cksum.to_be_bytes());

    let packet = build_v4(src4, dst4, proto::TCP, 64, false, false, 0, 5, &l4);
    let mut out = scratch();
    let Translated::Forward(len) = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap()
    else {
        panic!("expected forward");
    };

    let l4_out = &out[Ipv6Header::LEN..len];
    let acc = checksum::sum(
        checksum::pseudo_v6(
            v6("2001:db8::1"),
            v6("64:ff9b::808:808"),
            proto::TCP,
            u32::try_from(l4_out.len()).unwrap(),
        ),
        l4_out,
    );
    assert_eq!(checksum::fold(acc), 0xffff);
}

#[test]
fn gre_passes_through_untouched() {
    let tr = translator();
    let l4 = [0x00, 0x00, 0x08, 0x00, 0xde, 0xad, 0xbe, 0xef];
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::GRE,
        64,
        false,
        false,
        0,
        0,
        &l4,
    );
    let mut out = scratch();
    let Translated::Forward(len) = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap()
    else {
        panic!("expected forward");
    };
    let (ip6, _) = Ipv6Header::from_slice(&out[..len]).unwrap();
    assert_eq!(ip6.next_header.0, proto::GRE);
    assert_eq!(&out[Ipv6Header::LEN..len], &l4);
}

#[test]
fn bad_header_checksum_is_dropped() {
    let tr = translator();
    let l4 = udp_l4_v4(v4("192.0.0.4"), v4("8.8.8.8"), 4000, 53, b"x");
    let mut packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::UDP,
        64,
        false,
        false,
        0,
        1,
        &l4,
    );
    packet[10] ^= 0xff;
    let mut out = scratch();
    assert_eq!(
        tr.v4_to_v6(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::HeaderChecksum)
    );
}

// --- icmp errors with embedded packets --------------------------------------

#[test]
fn outbound_port_unreachable_translates_embedded_packet() {
    let tr = translator();
    // the host refuses a datagram that arrived from the PLAT side, so the
    // embedded packet is the inbound one: peer -> local
    let inner_l4 = udp_l4_v4(v4("8.8.8.8"), v4("192.0.0.4"), 53, 4000, b"refused");
    let inner = build_v4(
        v4("8.8.8.8"),
        v4("192.0.0.4"),
        proto::UDP,
        63,
        false,
        false,
        0,
        3,
        &inner_l4,
    );
    let quote = &inner[..28];
    let l4 = icmpv4_l4(3, 3, [0; 4], quote);
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::ICMP,
        64,
        false,
        false,
        0,
        4,
        &l4,
    );

    let mut out = scratch();
    let Translated::Forward(len) = tr.v4_to_v6(&packet, ChecksumHint::None, &mut out).unwrap()
    else {
        panic!("expected forward");
    };

    let (ip6, _) = Ipv6Header::from_slice(&out[..len]).unwrap();
    assert_eq!(ip6.next_header.0, proto::ICMPV6);
    let icmp = &out[Ipv6Header::LEN..len];
    assert_eq!(icmp[0], 1, "destination unreachable");
    assert_eq!(icmp[1], 4, "port unreachable");
    assert_icmpv6_checksum_valid(&out[..len]);

    let embedded = &icmp[8..];
    let (inner6, _) = Ipv6Header::from_slice(embedded).unwrap();
    assert_eq!(Ipv6Addr::from(inner6.source), v6("64:ff9b::808:808"));
    assert_eq!(Ipv6Addr::from(inner6.destination), v6("2001:db8::1"));
    assert_eq!(inner6.next_header.0, proto::UDP);
    assert_eq!(inner6.hop_limit, 63);
    // the declared length reflects the whole original datagram even though
    // only eight transport bytes were quoted
    assert_eq!(usize::from(inner6.payload_length), inner_l4.len());
    assert_eq!(embedded.len(), Ipv6Header::LEN + 8);
}

#[test]
fn nested_icmp_error_is_dropped() {
    let tr = translator();
    let nested = icmpv4_l4(3, 1, [0; 4], &[0u8; 28]);
    let inner = build_v4(
        v4("8.8.8.8"),
        v4("192.0.0.4"),
        proto::ICMP,
        63,
        false,
        false,
        0,
        3,
        &nested,
    );
    let l4 = icmpv4_l4(11, 0, [0; 4], &inner[..28]);
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::ICMP,
        64,
        false,
        false,
        0,
        4,
        &l4,
    );
    let mut out = scratch();
    assert_eq!(
        tr.v4_to_v6(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::NestedIcmpError)
    );
}

#[test]
fn unsupported_icmp_type_is_dropped() {
    let tr = translator();
    // timestamp request has no IPv6 equivalent
    let l4 = icmpv4_l4(13, 0, [0; 4], &[0u8; 12]);
    let packet = build_v4(
        v4("192.0.0.4"),
        v4("8.8.8.8"),
        proto::ICMP,
        64,
        false,
        false,
        0,
        0,
        &l4,
    );
    let mut out = scratch();
    assert_eq!(
        tr.v4_to_v6(&packet, ChecksumHint::None, &mut out),
        Err(TranslateError::UnsupportedIcmp {
            icmp_type: 13,
            code: 0
        })
    );
}
