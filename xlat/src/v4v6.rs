// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IPv4 → IPv6 rewrite.

use crate::{ChecksumHint, Translated, TranslateError, Translator, icmp, proto};
use etherparse::{IpNumber, Ipv4Header, Ipv6FragmentHeader, Ipv6Header};
use net::checksum;
use std::net::Ipv6Addr;

pub(crate) fn translate(
    tr: &Translator,
    packet: &[u8],
    hint: ChecksumHint,
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    if packet.len() < Ipv4Header::MIN_LEN {
        return Err(TranslateError::Truncated(packet.len()));
    }
    let (ip4, _) =
        Ipv4Header::from_slice(packet).map_err(|_| TranslateError::BadHeader("ipv4 header"))?;

    let header_len = ip4.header_len();
    let total_len = usize::from(ip4.total_len);
    if total_len < header_len || total_len > packet.len() {
        return Err(TranslateError::BadHeader("ipv4 total length"));
    }
    if hint == ChecksumHint::None && ip4.calc_header_checksum() != ip4.header_checksum {
        return Err(TranslateError::HeaderChecksum);
    }

    if ip4.time_to_live <= 1 {
        if tr.policy().time_exceeded {
            return icmp::time_exceeded_v4(tr, &packet[..total_len], out);
        }
        return Err(TranslateError::HopLimitExpired);
    }

    let fragmented = ip4.more_fragments || ip4.fragment_offset.value() != 0;
    let first_fragment = ip4.fragment_offset.value() == 0;
    let l4 = &packet[header_len..total_len];

    // DF semantics forbid us from growing the packet past the path MTU; the
    // sender has to shrink instead.
    if ip4.dont_fragment && !fragmented && total_len > usize::from(tr.ipv4mtu()) {
        return icmp::frag_needed(tr, &packet[..total_len], out);
    }
    if total_len > usize::from(tr.ipv4mtu()) {
        return Err(TranslateError::Oversized(total_len));
    }

    let protocol = ip4.protocol.0;
    if protocol == proto::ICMP && fragmented {
        return Err(TranslateError::FragmentedIcmp);
    }

    let with_fragment_header =
        fragmented || (tr.df0_fragment_header() && !ip4.dont_fragment);
    let l4_start = Ipv6Header::LEN + if with_fragment_header { 8 } else { 0 };

    let need = l4_start + l4.len();
    if out.len() < need.max(1280) {
        return Err(TranslateError::Scratch {
            need: need.max(1280),
            have: out.len(),
        });
    }

    let src6 = tr.addr_4to6(ip4.source.into());
    let dst6 = tr.addr_4to6(ip4.destination.into());
    let next = if protocol == proto::ICMP {
        proto::ICMPV6
    } else {
        protocol
    };

    // L4 region first; the ICMP rewrite decides its own length.
    let l4_out_len = if protocol == proto::ICMP {
        icmp::v4_to_v6(tr, src6, dst6, l4, &mut out[l4_start..])?
    } else {
        out[l4_start..l4_start + l4.len()].copy_from_slice(l4);
        fix_l4_checksum(
            &ip4,
            src6,
            dst6,
            hint,
            fragmented,
            first_fragment,
            &mut out[l4_start..l4_start + l4.len()],
        )?;
        l4.len()
    };

    let payload_length = l4_out_len + if with_fragment_header { 8 } else { 0 };
    let ip6 = Ipv6Header {
        traffic_class: (ip4.dscp.value() << 2) | ip4.ecn.value(),
        flow_label: etherparse::Ipv6FlowLabel::ZERO,
        payload_length: u16::try_from(payload_length)
            .map_err(|_| TranslateError::BadHeader("ipv6 payload length"))?,
        next_header: if with_fragment_header {
            IpNumber(proto::FRAGMENT)
        } else {
            IpNumber(next)
        },
        hop_limit: ip4.time_to_live - 1,
        source: src6.octets(),
        destination: dst6.octets(),
    };
    out[..Ipv6Header::LEN].copy_from_slice(&ip6.to_bytes());

    if with_fragment_header {
        let fragment = Ipv6FragmentHeader::new(
            IpNumber(next),
            ip4.fragment_offset,
            ip4.more_fragments,
            u32::from(ip4.identification),
        );
        out[Ipv6Header::LEN..l4_start].copy_from_slice(&fragment.to_bytes());
    }

    Ok(Translated::Forward(l4_start + l4_out_len))
}

/// Rewrite the transport checksum in `l4_out` for the new pseudo header.
fn fix_l4_checksum(
    ip4: &Ipv4Header,
    src6: Ipv6Addr,
    dst6: Ipv6Addr,
    hint: ChecksumHint,
    fragmented: bool,
    first_fragment: bool,
    l4_out: &mut [u8],
) -> Result<(), TranslateError> {
    let protocol = ip4.protocol.0;
    let field = match protocol {
        proto::UDP if first_fragment && l4_out.len() >= 8 => 6,
        proto::TCP if first_fragment && l4_out.len() >= 18 => 16,
        // GRE and everything else passes through untouched, as do non-first
        // fragments (no transport header in sight).
        _ => return Ok(()),
    };

    #[allow(clippy::cast_possible_truncation)] // l4 length bounded by total_len
    let len = l4_out.len() as u16;
    let pseudo4 = checksum::pseudo_v4(ip4.source.into(), ip4.destination.into(), protocol, len);
    let pseudo6 = checksum::pseudo_v6(src6, dst6, protocol, u32::from(len));

    let old = u16::from_be_bytes([l4_out[field], l4_out[field + 1]]);
    let full_recompute = hint == ChecksumHint::PartialL4Valid && !fragmented;

    let new = if protocol == proto::UDP && old == 0 {
        if fragmented {
            // we cannot compute a checksum over bytes we do not have, and
            // IPv6 has no zero-checksum escape hatch
            return Err(TranslateError::ZeroUdpChecksum);
        }
        compute_over(pseudo6, l4_out, field)
    } else if full_recompute {
        compute_over(pseudo6, l4_out, field)
    } else {
        checksum::adjust(old, pseudo4, pseudo6)
    };

    // RFC 768: a computed zero is transmitted as all-ones
    let new = if protocol == proto::UDP && new == 0 {
        0xffff
    } else {
        new
    };
    l4_out[field..field + 2].copy_from_slice(&new.to_be_bytes());
    Ok(())
}

/// Full checksum over `l4` with the checksum field at `field` treated as zero.
fn compute_over(pseudo: u32, l4: &[u8], field: usize) -> u16 {
    let acc = checksum::sum(pseudo, &l4[..field]);
    let acc = checksum::sum(acc, &[0, 0]);
    let acc = checksum::sum(acc, &l4[field + 2..]);
    checksum::finish(acc)
}
