// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The IPv6 → IPv4 rewrite.

use crate::{ChecksumHint, Translated, TranslateError, Translator, icmp, proto};
use etherparse::{IpNumber, Ipv4Header, Ipv6Header};
use net::checksum;
use std::net::{Ipv4Addr, Ipv6Addr};

/// What the extension-header walk learned about a fragment header.
#[derive(Debug, Copy, Clone)]
struct FragmentInfo {
    offset: u16,
    more_fragments: bool,
    identification: u32,
}

pub(crate) fn translate(
    tr: &Translator,
    packet: &[u8],
    hint: ChecksumHint,
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    if packet.len() < Ipv6Header::LEN {
        return Err(TranslateError::Truncated(packet.len()));
    }
    let (ip6, _) =
        Ipv6Header::from_slice(packet).map_err(|_| TranslateError::BadHeader("ipv6 header"))?;

    let dst6 = Ipv6Addr::from(ip6.destination);
    if dst6 != tr.local6() {
        // the classifier should have rejected this frame already
        return Err(TranslateError::DestinationNotLocal(dst6));
    }
    let src6 = Ipv6Addr::from(ip6.source);
    let src4 = tr
        .plat()
        .extract(src6)
        .map_err(|e| TranslateError::NotInPlat(e.0))?;
    let dst4 = tr.local4();

    // the ring hands us whole frames; trailing padding is not payload
    let end = Ipv6Header::LEN + usize::from(ip6.payload_length);
    if end > packet.len() {
        return Err(TranslateError::BadHeader("ipv6 payload length"));
    }

    let (next, l4_start, fragment) =
        match walk_extensions(tr, packet, end, ip6.next_header.0, out)? {
            Walked::Upper(next, offset, fragment) => (next, offset, fragment),
            Walked::Bounced(reply) => return Ok(reply),
        };

    if ip6.hop_limit <= 1 {
        return Err(TranslateError::HopLimitExpired);
    }

    let l4 = &packet[l4_start..end];
    let (fragmented, first_fragment) = match fragment {
        // offset 0 with no more fragments is an atomic fragment: the header
        // is simply removed and the result is a whole packet again
        Some(info) => (info.offset != 0 || info.more_fragments, info.offset == 0),
        None => (false, true),
    };

    let protocol = if next == proto::ICMPV6 {
        proto::ICMP
    } else {
        next
    };
    if protocol == proto::ICMP && fragmented {
        return Err(TranslateError::FragmentedIcmp);
    }

    if Ipv4Header::MIN_LEN + l4.len() > usize::from(u16::MAX) {
        return icmp::packet_too_big_v6(tr, &packet[..end], out);
    }

    let need = Ipv4Header::MIN_LEN + l4.len();
    if out.len() < need.max(1280) {
        return Err(TranslateError::Scratch {
            need: need.max(1280),
            have: out.len(),
        });
    }

    // L4 region first; ICMP decides its own length.
    let l4_out_len = if protocol == proto::ICMP {
        icmp::v6_to_v4(tr, l4, &mut out[Ipv4Header::MIN_LEN..])?
    } else {
        out[Ipv4Header::MIN_LEN..Ipv4Header::MIN_LEN + l4.len()].copy_from_slice(l4);
        fix_l4_checksum(
            src6,
            dst6,
            src4,
            dst4,
            next,
            hint,
            fragmented,
            first_fragment,
            &mut out[Ipv4Header::MIN_LEN..Ipv4Header::MIN_LEN + l4.len()],
        )?;
        l4.len()
    };

    #[allow(clippy::cast_possible_truncation)] // checked against u16::MAX above
    let mut ip4 = Ipv4Header::new(
        l4_out_len as u16,
        ip6.hop_limit - 1,
        IpNumber(protocol),
        src4.octets(),
        dst4.octets(),
    )
    .map_err(|_| TranslateError::TooBigForIpv4)?;

    if let Ok(dscp) = etherparse::Ipv4Dscp::try_new(ip6.traffic_class >> 2) {
        ip4.dscp = dscp;
    }
    if let Ok(ecn) = etherparse::Ipv4Ecn::try_new(ip6.traffic_class & 0x3) {
        ip4.ecn = ecn;
    }
    if let Some(info) = fragment {
        #[allow(clippy::cast_possible_truncation)] // low 16 bits by definition
        {
            ip4.identification = info.identification as u16;
        }
        ip4.more_fragments = info.more_fragments;
        ip4.fragment_offset = etherparse::IpFragOffset::try_new(info.offset)
            .map_err(|_| TranslateError::BadHeader("fragment offset"))?;
    }
    ip4.dont_fragment = !fragmented;
    ip4.header_checksum = ip4.calc_header_checksum();
    out[..Ipv4Header::MIN_LEN].copy_from_slice(&ip4.to_bytes());

    Ok(Translated::Forward(Ipv4Header::MIN_LEN + l4_out_len))
}

enum Walked {
    /// Upper-layer protocol, its offset, and any fragment header seen.
    Upper(u8, usize, Option<FragmentInfo>),
    /// The walk produced an ICMPv6 reply instead.
    Bounced(Translated),
}

/// Walk the extension-header chain per RFC 2460 §4: skip hop-by-hop and
/// destination options, record at most one fragment header, refuse routing
/// headers that still have work to do.
fn walk_extensions(
    tr: &Translator,
    packet: &[u8],
    end: usize,
    first_next: u8,
    out: &mut [u8],
) -> Result<Walked, TranslateError> {
    let mut next = first_next;
    let mut offset = Ipv6Header::LEN;
    let mut fragment: Option<FragmentInfo> = None;

    loop {
        match next {
            proto::HOPOPTS | proto::DSTOPTS => {
                if end < offset + 8 {
                    return Err(TranslateError::Truncated(end));
                }
                let ext_len = (usize::from(packet[offset + 1]) + 1) * 8;
                next = packet[offset];
                offset += ext_len;
            }
            proto::ROUTING => {
                if end < offset + 8 {
                    return Err(TranslateError::Truncated(end));
                }
                let kind = packet[offset + 2];
                let segments_left = packet[offset + 3];
                if kind != 0 || segments_left != 0 {
                    if tr.policy().parameter_problem {
                        // point at the segments-left field
                        #[allow(clippy::cast_possible_truncation)] // offset < 64k
                        let pointer = (offset + 3) as u32;
                        return Ok(Walked::Bounced(icmp::param_problem_v6(
                            tr,
                            &packet[..end],
                            pointer,
                            out,
                        )?));
                    }
                    return Err(TranslateError::RoutingHeader {
                        kind,
                        segments_left,
                    });
                }
                let ext_len = (usize::from(packet[offset + 1]) + 1) * 8;
                next = packet[offset];
                offset += ext_len;
            }
            proto::FRAGMENT => {
                if end < offset + 8 {
                    return Err(TranslateError::Truncated(end));
                }
                if fragment.is_some() {
                    return Err(TranslateError::DuplicateFragmentHeader);
                }
                let raw = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]);
                fragment = Some(FragmentInfo {
                    offset: raw >> 3,
                    more_fragments: raw & 1 == 1,
                    identification: u32::from_be_bytes([
                        packet[offset + 4],
                        packet[offset + 5],
                        packet[offset + 6],
                        packet[offset + 7],
                    ]),
                });
                next = packet[offset];
                offset += 8;
            }
            _ => break,
        }
        if offset > end {
            return Err(TranslateError::Truncated(end));
        }
    }
    Ok(Walked::Upper(next, offset, fragment))
}

/// Rewrite the transport checksum in `l4_out` for the IPv4 pseudo header.
#[allow(clippy::too_many_arguments)]
fn fix_l4_checksum(
    src6: Ipv6Addr,
    dst6: Ipv6Addr,
    src4: Ipv4Addr,
    dst4: Ipv4Addr,
    next: u8,
    hint: ChecksumHint,
    fragmented: bool,
    first_fragment: bool,
    l4_out: &mut [u8],
) -> Result<(), TranslateError> {
    let field = match next {
        proto::UDP if first_fragment && l4_out.len() >= 8 => 6,
        proto::TCP if first_fragment && l4_out.len() >= 18 => 16,
        _ => return Ok(()),
    };

    #[allow(clippy::cast_possible_truncation)] // bounded by the ipv4 total length
    let len = l4_out.len() as u16;
    let pseudo6 = checksum::pseudo_v6(src6, dst6, next, u32::from(len));
    let pseudo4 = checksum::pseudo_v4(src4, dst4, next, len);

    let old = u16::from_be_bytes([l4_out[field], l4_out[field + 1]]);
    let full_recompute = hint == ChecksumHint::PartialL4Valid && !fragmented;

    let new = if next == proto::UDP && old == 0 {
        // illegal on the wire for IPv6; recompute when the whole datagram is
        // in hand, drop otherwise
        if fragmented {
            return Err(TranslateError::ZeroUdpChecksum);
        }
        compute_over(pseudo4, l4_out, field)
    } else if full_recompute {
        compute_over(pseudo4, l4_out, field)
    } else {
        checksum::adjust(old, pseudo6, pseudo4)
    };

    let new = if next == proto::UDP && new == 0 {
        0xffff
    } else {
        new
    };
    l4_out[field..field + 2].copy_from_slice(&new.to_be_bytes());
    Ok(())
}

fn compute_over(pseudo: u32, l4: &[u8], field: usize) -> u16 {
    let acc = checksum::sum(pseudo, &l4[..field]);
    let acc = checksum::sum(acc, &[0, 0]);
    let acc = checksum::sum(acc, &l4[field + 2..]);
    checksum::finish(acc)
}
