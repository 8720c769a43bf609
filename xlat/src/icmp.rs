// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ICMP ↔ ICMPv6 translation: the type/code tables of RFC 7915 §4.2 and
//! §5.2, one level of embedded-packet translation for error messages, and
//! the error replies the translator originates itself.

use crate::{Translated, TranslateError, Translator, proto};
use etherparse::{IpNumber, Ipv4Header, Ipv6FragmentHeader, Ipv6Header};
use net::checksum;
use std::net::{Ipv4Addr, Ipv6Addr};

// ICMPv4 message types
const V4_ECHO_REPLY: u8 = 0;
const V4_DEST_UNREACH: u8 = 3;
const V4_SOURCE_QUENCH: u8 = 4;
const V4_REDIRECT: u8 = 5;
const V4_ECHO_REQUEST: u8 = 8;
const V4_TIME_EXCEEDED: u8 = 11;
const V4_PARAM_PROB: u8 = 12;

// ICMPv4 destination-unreachable codes
const V4_UNREACH_PROTOCOL: u8 = 2;
const V4_UNREACH_PORT: u8 = 3;
const V4_UNREACH_FRAG_NEEDED: u8 = 4;

// ICMPv6 message types
const V6_DEST_UNREACH: u8 = 1;
const V6_PACKET_TOO_BIG: u8 = 2;
const V6_TIME_EXCEEDED: u8 = 3;
const V6_PARAM_PROB: u8 = 4;
const V6_ECHO_REQUEST: u8 = 128;
const V6_ECHO_REPLY: u8 = 129;

/// ICMPv6 error messages must fit in the IPv6 minimum MTU (RFC 4443 §2.4).
const V6_ERROR_MAX: usize = 1280 - Ipv6Header::LEN;
/// ICMPv4 errors keep to the classic 576-byte bound.
const V4_ERROR_MAX: usize = 576 - Ipv4Header::MIN_LEN;

fn v4_is_error(icmp_type: u8) -> bool {
    matches!(
        icmp_type,
        V4_DEST_UNREACH | V4_SOURCE_QUENCH | V4_REDIRECT | V4_TIME_EXCEEDED | V4_PARAM_PROB
    )
}

fn v6_is_error(icmp_type: u8) -> bool {
    // RFC 4443 §2.1: the high-order bit distinguishes errors from queries
    icmp_type < 128
}

/// RFC 7915 §4.2: ICMPv4 parameter-problem pointer → ICMPv6 pointer.
fn map_pointer_4to6(pointer: u8) -> Option<u8> {
    match pointer {
        0 => Some(0),
        1 => Some(1),
        2 | 3 => Some(4),
        8 => Some(7),
        9..=11 => Some(6),
        12..=15 => Some(8),
        16..=19 => Some(24),
        _ => None,
    }
}

/// RFC 7915 §5.2: ICMPv6 parameter-problem pointer → ICMPv4 pointer.
fn map_pointer_6to4(pointer: u32) -> Option<u8> {
    match pointer {
        0 => Some(0),
        1 => Some(1),
        4 => Some(2),
        6 => Some(9),
        7 => Some(8),
        8..=23 => Some(12),
        24..=39 => Some(16),
        _ => None,
    }
}

/// Translate the ICMPv4 message in `l4` into an ICMPv6 message at `out`
/// (the L4 region of the output packet). Returns the bytes written.
pub(crate) fn v4_to_v6(
    tr: &Translator,
    src6: Ipv6Addr,
    dst6: Ipv6Addr,
    l4: &[u8],
    out: &mut [u8],
) -> Result<usize, TranslateError> {
    if l4.len() < 8 {
        return Err(TranslateError::Truncated(l4.len()));
    }
    if out.len() < 8 {
        return Err(TranslateError::Scratch {
            need: 8,
            have: out.len(),
        });
    }
    let icmp_type = l4[0];
    let code = l4[1];
    let mut rest = [l4[4], l4[5], l4[6], l4[7]];

    let (new_type, new_code, query) = match icmp_type {
        V4_ECHO_REQUEST => (V6_ECHO_REQUEST, code, true),
        V4_ECHO_REPLY => (V6_ECHO_REPLY, code, true),
        V4_DEST_UNREACH => {
            rest = [0; 4];
            match code {
                // network/host/source-route flavors all collapse to no-route
                0 | 1 | 5..=8 | 11 | 12 => (V6_DEST_UNREACH, 0, false),
                V4_UNREACH_PROTOCOL => {
                    // parameter problem pointing at the next-header byte
                    rest = [0, 0, 0, 6];
                    (V6_PARAM_PROB, 1, false)
                }
                V4_UNREACH_PORT => (V6_DEST_UNREACH, 4, false),
                V4_UNREACH_FRAG_NEEDED => {
                    let mtu4 = u16::from_be_bytes([l4[6], l4[7]]);
                    let mtu6 = if mtu4 == 0 {
                        // RFC 1191-oblivious router; advertise the floor
                        1280
                    } else {
                        (u32::from(mtu4) + 20).max(1280)
                    };
                    rest = mtu6.to_be_bytes();
                    (V6_PACKET_TOO_BIG, 0, false)
                }
                9 | 10 | 13 | 15 => (V6_DEST_UNREACH, 1, false),
                _ => {
                    return Err(TranslateError::UnsupportedIcmp { icmp_type, code });
                }
            }
        }
        V4_TIME_EXCEEDED => {
            rest = [0; 4];
            (V6_TIME_EXCEEDED, code, false)
        }
        V4_PARAM_PROB if code == 0 || code == 2 => {
            let pointer = map_pointer_4to6(l4[4])
                .ok_or(TranslateError::UnsupportedIcmp { icmp_type, code })?;
            rest = [0, 0, 0, pointer];
            (V6_PARAM_PROB, 0, false)
        }
        _ => return Err(TranslateError::UnsupportedIcmp { icmp_type, code }),
    };

    let payload_len = if query {
        let n = l4.len() - 8;
        if out.len() < 8 + n {
            return Err(TranslateError::Scratch {
                need: 8 + n,
                have: out.len(),
            });
        }
        out[8..8 + n].copy_from_slice(&l4[8..]);
        n
    } else {
        let cap = out.len().min(V6_ERROR_MAX);
        embed_v4_to_v6(tr, &l4[8..], &mut out[8..cap])?
    };
    let len = (8 + payload_len).min(if query { usize::MAX } else { V6_ERROR_MAX });

    out[0] = new_type;
    out[1] = new_code;
    out[2] = 0;
    out[3] = 0;
    out[4..8].copy_from_slice(&rest);

    #[allow(clippy::cast_possible_truncation)] // bounded well below 2^32
    let pseudo = checksum::pseudo_v6(src6, dst6, proto::ICMPV6, len as u32);
    let cksum = checksum::finish(checksum::sum(pseudo, &out[..len]));
    out[2..4].copy_from_slice(&cksum.to_be_bytes());
    Ok(len)
}

/// Translate the ICMPv6 message in `l4` into an ICMPv4 message at `out`.
pub(crate) fn v6_to_v4(
    tr: &Translator,
    l4: &[u8],
    out: &mut [u8],
) -> Result<usize, TranslateError> {
    if l4.len() < 8 {
        return Err(TranslateError::Truncated(l4.len()));
    }
    if out.len() < 8 {
        return Err(TranslateError::Scratch {
            need: 8,
            have: out.len(),
        });
    }
    let icmp_type = l4[0];
    let code = l4[1];
    let mut rest = [l4[4], l4[5], l4[6], l4[7]];

    let (new_type, new_code, query) = match (icmp_type, code) {
        (V6_ECHO_REQUEST, _) => (V4_ECHO_REQUEST, code, true),
        (V6_ECHO_REPLY, _) => (V4_ECHO_REPLY, code, true),
        (V6_DEST_UNREACH, 0 | 2 | 3) => {
            rest = [0; 4];
            (V4_DEST_UNREACH, 1, false)
        }
        (V6_DEST_UNREACH, 1 | 5 | 6) => {
            rest = [0; 4];
            (V4_DEST_UNREACH, 10, false)
        }
        (V6_DEST_UNREACH, 4) => {
            rest = [0; 4];
            (V4_DEST_UNREACH, V4_UNREACH_PORT, false)
        }
        (V6_PACKET_TOO_BIG, _) => {
            let mtu6 = u32::from_be_bytes(rest);
            // an advertised MTU below the IPv6 floor is nonsense; clamp up
            // before shaving off the translation overhead
            let mtu4 = (mtu6.max(1280) - u32::from(crate::MTU_DELTA)).min(0xffff);
            #[allow(clippy::cast_possible_truncation)] // just clamped
            let mtu4 = mtu4 as u16;
            rest = [0, 0, (mtu4 >> 8) as u8, (mtu4 & 0xff) as u8];
            (V4_DEST_UNREACH, V4_UNREACH_FRAG_NEEDED, false)
        }
        (V6_TIME_EXCEEDED, _) => {
            rest = [0; 4];
            (V4_TIME_EXCEEDED, code, false)
        }
        (V6_PARAM_PROB, 0) => {
            let pointer = map_pointer_6to4(u32::from_be_bytes(rest))
                .ok_or(TranslateError::UnsupportedIcmp { icmp_type, code })?;
            rest = [pointer, 0, 0, 0];
            (V4_PARAM_PROB, 0, false)
        }
        (V6_PARAM_PROB, 1) => {
            rest = [0; 4];
            (V4_DEST_UNREACH, V4_UNREACH_PROTOCOL, false)
        }
        _ => return Err(TranslateError::UnsupportedIcmp { icmp_type, code }),
    };

    let payload_len = if query {
        let n = l4.len() - 8;
        if out.len() < 8 + n {
            return Err(TranslateError::Scratch {
                need: 8 + n,
                have: out.len(),
            });
        }
        out[8..8 + n].copy_from_slice(&l4[8..]);
        n
    } else {
        let cap = out.len().min(V4_ERROR_MAX);
        embed_v6_to_v4(tr, &l4[8..], &mut out[8..cap])?
    };
    let len = (8 + payload_len).min(if query { usize::MAX } else { V4_ERROR_MAX });

    out[0] = new_type;
    out[1] = new_code;
    out[2] = 0;
    out[3] = 0;
    out[4..8].copy_from_slice(&rest);

    let cksum = checksum::finish(checksum::sum(0, &out[..len]));
    out[2..4].copy_from_slice(&cksum.to_be_bytes());
    Ok(len)
}

/// Translate the IPv4 packet embedded in an ICMP error into its IPv6 form.
///
/// Hop limits are preserved (the embedded packet already took its decrement
/// on the way out), lengths reflect the original datagram even when the
/// quote is truncated, and the transport checksum is patched incrementally
/// when enough of it was quoted.
fn embed_v4_to_v6(
    tr: &Translator,
    inner: &[u8],
    out: &mut [u8],
) -> Result<usize, TranslateError> {
    if inner.len() < Ipv4Header::MIN_LEN {
        return Err(TranslateError::Truncated(inner.len()));
    }
    let (ip4, _) = Ipv4Header::from_slice(inner)
        .map_err(|_| TranslateError::BadHeader("embedded ipv4 header"))?;
    let header_len = ip4.header_len();
    let declared_l4 = usize::from(ip4.total_len).saturating_sub(header_len);
    let avail = inner.len().saturating_sub(header_len);
    let protocol = ip4.protocol.0;
    let fragmented = ip4.more_fragments || ip4.fragment_offset.value() != 0;
    let first_fragment = ip4.fragment_offset.value() == 0;

    if protocol == proto::ICMP && avail >= 1 && v4_is_error(inner[header_len]) {
        return Err(TranslateError::NestedIcmpError);
    }

    let next = if protocol == proto::ICMP {
        proto::ICMPV6
    } else {
        protocol
    };
    let l4_start = Ipv6Header::LEN + if fragmented { 8 } else { 0 };
    if out.len() < l4_start {
        return Err(TranslateError::Scratch {
            need: l4_start,
            have: out.len(),
        });
    }
    let copy = avail.min(out.len() - l4_start);

    let src6 = tr.addr_4to6(ip4.source.into());
    let dst6 = tr.addr_4to6(ip4.destination.into());

    let ip6 = Ipv6Header {
        traffic_class: (ip4.dscp.value() << 2) | ip4.ecn.value(),
        flow_label: etherparse::Ipv6FlowLabel::ZERO,
        payload_length: u16::try_from(declared_l4 + if fragmented { 8 } else { 0 })
            .map_err(|_| TranslateError::BadHeader("embedded payload length"))?,
        next_header: if fragmented {
            IpNumber(proto::FRAGMENT)
        } else {
            IpNumber(next)
        },
        hop_limit: ip4.time_to_live,
        source: src6.octets(),
        destination: dst6.octets(),
    };
    out[..Ipv6Header::LEN].copy_from_slice(&ip6.to_bytes());
    if fragmented {
        let fragment = Ipv6FragmentHeader::new(
            IpNumber(next),
            ip4.fragment_offset,
            ip4.more_fragments,
            u32::from(ip4.identification),
        );
        out[Ipv6Header::LEN..l4_start].copy_from_slice(&fragment.to_bytes());
    }
    out[l4_start..l4_start + copy].copy_from_slice(&inner[header_len..header_len + copy]);

    #[allow(clippy::cast_possible_truncation)] // checked via payload_length above
    let declared16 = declared_l4 as u16;
    let pseudo4 = checksum::pseudo_v4(
        ip4.source.into(),
        ip4.destination.into(),
        protocol,
        declared16,
    );
    let pseudo6 = checksum::pseudo_v6(src6, dst6, next, u32::from(declared16));

    let l4_out = &mut out[l4_start..l4_start + copy];
    match protocol {
        proto::UDP if first_fragment && copy >= 8 => {
            let old = u16::from_be_bytes([l4_out[6], l4_out[7]]);
            if old != 0 {
                let new = checksum::adjust(old, pseudo4, pseudo6);
                let new = if new == 0 { 0xffff } else { new };
                l4_out[6..8].copy_from_slice(&new.to_be_bytes());
            }
        }
        proto::TCP if first_fragment && copy >= 18 => {
            let old = u16::from_be_bytes([l4_out[16], l4_out[17]]);
            let new = checksum::adjust(old, pseudo4, pseudo6);
            l4_out[16..18].copy_from_slice(&new.to_be_bytes());
        }
        proto::ICMP if first_fragment && copy >= 8 => {
            let inner_type = l4_out[0];
            let inner_code = l4_out[1];
            let new_type = match inner_type {
                V4_ECHO_REQUEST => V6_ECHO_REQUEST,
                V4_ECHO_REPLY => V6_ECHO_REPLY,
                _ => {
                    return Err(TranslateError::UnsupportedIcmp {
                        icmp_type: inner_type,
                        code: inner_code,
                    });
                }
            };
            let old = u16::from_be_bytes([l4_out[2], l4_out[3]]);
            let old_word = u16::from_be_bytes([inner_type, inner_code]);
            let new_word = u16::from_be_bytes([new_type, inner_code]);
            // the embedded message gains a pseudo header in translation
            let new = checksum::adjust(
                old,
                u32::from(old_word),
                u32::from(new_word).wrapping_add(pseudo6),
            );
            l4_out[0] = new_type;
            l4_out[2..4].copy_from_slice(&new.to_be_bytes());
        }
        _ => {}
    }
    Ok(l4_start + copy)
}

/// Translate the IPv6 packet embedded in an ICMPv6 error into its IPv4 form.
fn embed_v6_to_v4(
    tr: &Translator,
    inner: &[u8],
    out: &mut [u8],
) -> Result<usize, TranslateError> {
    if inner.len() < Ipv6Header::LEN {
        return Err(TranslateError::Truncated(inner.len()));
    }
    let (ip6, _) = Ipv6Header::from_slice(inner)
        .map_err(|_| TranslateError::BadHeader("embedded ipv6 header"))?;

    // a lenient extension-header walk: the quote may be truncated, and
    // nothing here is worth an error reply
    let mut next = ip6.next_header.0;
    let mut offset = Ipv6Header::LEN;
    let mut fragment: Option<(u16, bool, u32)> = None;
    loop {
        match next {
            proto::HOPOPTS | proto::DSTOPTS | proto::ROUTING => {
                if inner.len() < offset + 8 {
                    return Err(TranslateError::Truncated(inner.len()));
                }
                let ext_len = (usize::from(inner[offset + 1]) + 1) * 8;
                next = inner[offset];
                offset += ext_len;
            }
            proto::FRAGMENT => {
                if inner.len() < offset + 8 {
                    return Err(TranslateError::Truncated(inner.len()));
                }
                if fragment.is_some() {
                    return Err(TranslateError::DuplicateFragmentHeader);
                }
                let raw = u16::from_be_bytes([inner[offset + 2], inner[offset + 3]]);
                let identification = u32::from_be_bytes([
                    inner[offset + 4],
                    inner[offset + 5],
                    inner[offset + 6],
                    inner[offset + 7],
                ]);
                fragment = Some((raw >> 3, raw & 1 == 1, identification));
                next = inner[offset];
                offset += 8;
            }
            _ => break,
        }
        if offset > inner.len() {
            return Err(TranslateError::Truncated(inner.len()));
        }
    }

    let ext_len = offset - Ipv6Header::LEN;
    let declared_l4 = usize::from(ip6.payload_length).saturating_sub(ext_len);
    let avail = inner.len().saturating_sub(offset);
    let (frag_offset, more_fragments, identification) = fragment.unwrap_or((0, false, 0));
    let fragmented = frag_offset != 0 || more_fragments;
    let first_fragment = frag_offset == 0;

    if next == proto::ICMPV6 && avail >= 1 && v6_is_error(inner[offset]) {
        return Err(TranslateError::NestedIcmpError);
    }
    let protocol = if next == proto::ICMPV6 {
        proto::ICMP
    } else {
        next
    };

    let src6 = Ipv6Addr::from(ip6.source);
    let dst6 = Ipv6Addr::from(ip6.destination);
    let src4 = tr.addr_6to4(src6)?;
    let dst4 = tr.addr_6to4(dst6)?;

    if out.len() < Ipv4Header::MIN_LEN {
        return Err(TranslateError::Scratch {
            need: Ipv4Header::MIN_LEN,
            have: out.len(),
        });
    }
    let copy = avail.min(out.len() - Ipv4Header::MIN_LEN);

    let declared16 =
        u16::try_from(declared_l4).map_err(|_| TranslateError::BadHeader("embedded length"))?;
    let mut ip4 = Ipv4Header::new(
        declared16,
        ip6.hop_limit,
        IpNumber(protocol),
        src4.octets(),
        dst4.octets(),
    )
    .map_err(|_| TranslateError::BadHeader("embedded length"))?;
    set_tos(&mut ip4, ip6.traffic_class);
    #[allow(clippy::cast_possible_truncation)] // low 16 bits by construction
    {
        ip4.identification = identification as u16;
    }
    ip4.dont_fragment = !fragmented;
    ip4.more_fragments = more_fragments;
    ip4.fragment_offset = etherparse::IpFragOffset::try_new(frag_offset)
        .map_err(|_| TranslateError::BadHeader("fragment offset"))?;
    ip4.header_checksum = ip4.calc_header_checksum();
    out[..Ipv4Header::MIN_LEN].copy_from_slice(&ip4.to_bytes());
    out[Ipv4Header::MIN_LEN..Ipv4Header::MIN_LEN + copy]
        .copy_from_slice(&inner[offset..offset + copy]);

    let pseudo6 = checksum::pseudo_v6(src6, dst6, next, u32::from(declared16));
    let pseudo4 = checksum::pseudo_v4(src4, dst4, protocol, declared16);

    let l4_out = &mut out[Ipv4Header::MIN_LEN..Ipv4Header::MIN_LEN + copy];
    match protocol {
        proto::UDP if first_fragment && copy >= 8 => {
            let old = u16::from_be_bytes([l4_out[6], l4_out[7]]);
            if old != 0 {
                let new = checksum::adjust(old, pseudo6, pseudo4);
                let new = if new == 0 { 0xffff } else { new };
                l4_out[6..8].copy_from_slice(&new.to_be_bytes());
            }
        }
        proto::TCP if first_fragment && copy >= 18 => {
            let old = u16::from_be_bytes([l4_out[16], l4_out[17]]);
            let new = checksum::adjust(old, pseudo6, pseudo4);
            l4_out[16..18].copy_from_slice(&new.to_be_bytes());
        }
        proto::ICMP if first_fragment && copy >= 8 => {
            let inner_type = l4_out[0];
            let inner_code = l4_out[1];
            let new_type = match inner_type {
                V6_ECHO_REQUEST => V4_ECHO_REQUEST,
                V6_ECHO_REPLY => V4_ECHO_REPLY,
                _ => {
                    return Err(TranslateError::UnsupportedIcmp {
                        icmp_type: inner_type,
                        code: inner_code,
                    });
                }
            };
            let old = u16::from_be_bytes([l4_out[2], l4_out[3]]);
            let old_word = u16::from_be_bytes([inner_type, inner_code]);
            let new_word = u16::from_be_bytes([new_type, inner_code]);
            // the embedded message loses its pseudo header in translation
            let new = checksum::adjust(
                old,
                u32::from(old_word).wrapping_add(pseudo6),
                u32::from(new_word),
            );
            l4_out[0] = new_type;
            l4_out[2..4].copy_from_slice(&new.to_be_bytes());
        }
        _ => {}
    }
    Ok(Ipv4Header::MIN_LEN + copy)
}

fn set_tos(ip4: &mut Ipv4Header, traffic_class: u8) {
    if let Ok(dscp) = etherparse::Ipv4Dscp::try_new(traffic_class >> 2) {
        ip4.dscp = dscp;
    }
    if let Ok(ecn) = etherparse::Ipv4Ecn::try_new(traffic_class & 0x3) {
        ip4.ecn = ecn;
    }
}

/// ICMPv4 "fragmentation needed and DF set", bounced back through the tun
/// with the IPv4 path MTU.
pub(crate) fn frag_needed(
    tr: &Translator,
    orig: &[u8],
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    let mtu = tr.ipv4mtu();
    build_v4_error(
        tr,
        orig,
        V4_DEST_UNREACH,
        V4_UNREACH_FRAG_NEEDED,
        [0, 0, (mtu >> 8) as u8, (mtu & 0xff) as u8],
        out,
    )
}

/// ICMPv4 time-exceeded for a packet that arrived with TTL ≤ 1.
pub(crate) fn time_exceeded_v4(
    tr: &Translator,
    orig: &[u8],
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    // RFC 1812: never answer an ICMP error with another error
    let header_len = usize::from(orig[0] & 0x0f) * 4;
    if orig.len() > header_len
        && orig[9] == proto::ICMP
        && v4_is_error(orig[header_len])
    {
        return Err(TranslateError::HopLimitExpired);
    }
    build_v4_error(tr, orig, V4_TIME_EXCEEDED, 0, [0; 4], out)
}

fn build_v4_error(
    tr: &Translator,
    orig: &[u8],
    icmp_type: u8,
    code: u8,
    rest: [u8; 4],
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    let header_len = usize::from(orig[0] & 0x0f) * 4;
    let quote = orig.len().min(header_len + 8);
    let total = Ipv4Header::MIN_LEN + 8 + quote;
    if out.len() < total {
        return Err(TranslateError::Scratch {
            need: total,
            have: out.len(),
        });
    }

    let orig_src = Ipv4Addr::new(orig[12], orig[13], orig[14], orig[15]);
    #[allow(clippy::cast_possible_truncation)] // quote is at most 68 bytes
    let mut ip4 = Ipv4Header::new(
        (8 + quote) as u16,
        64,
        IpNumber(proto::ICMP),
        tr.local4().octets(),
        orig_src.octets(),
    )
    .map_err(|_| TranslateError::BadHeader("reply length"))?;
    ip4.header_checksum = ip4.calc_header_checksum();
    out[..Ipv4Header::MIN_LEN].copy_from_slice(&ip4.to_bytes());

    let icmp = &mut out[Ipv4Header::MIN_LEN..total];
    icmp[0] = icmp_type;
    icmp[1] = code;
    icmp[2] = 0;
    icmp[3] = 0;
    icmp[4..8].copy_from_slice(&rest);
    icmp[8..].copy_from_slice(&orig[..quote]);
    let cksum = checksum::finish(checksum::sum(0, icmp));
    icmp[2..4].copy_from_slice(&cksum.to_be_bytes());

    Ok(Translated::Bounce(total))
}

/// ICMPv6 parameter-problem, bounced to the uplink for a rejected extension
/// header.
pub(crate) fn param_problem_v6(
    tr: &Translator,
    orig: &[u8],
    pointer: u32,
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    build_v6_error(tr, orig, V6_PARAM_PROB, 0, pointer.to_be_bytes(), out)
}

/// ICMPv6 packet-too-big for a packet the IPv4 side cannot express.
pub(crate) fn packet_too_big_v6(
    tr: &Translator,
    orig: &[u8],
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    // the cap is the IPv4 total-length field, not a link MTU
    build_v6_error(tr, orig, V6_PACKET_TOO_BIG, 0, 0xffff_u32.to_be_bytes(), out)
}

fn build_v6_error(
    tr: &Translator,
    orig: &[u8],
    icmp_type: u8,
    code: u8,
    rest: [u8; 4],
    out: &mut [u8],
) -> Result<Translated, TranslateError> {
    let quote = orig.len().min(V6_ERROR_MAX - 8);
    let total = Ipv6Header::LEN + 8 + quote;
    if out.len() < total {
        return Err(TranslateError::Scratch {
            need: total,
            have: out.len(),
        });
    }

    let orig_src = {
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&orig[8..24]);
        Ipv6Addr::from(octets)
    };
    #[allow(clippy::cast_possible_truncation)] // bounded by V6_ERROR_MAX
    let ip6 = Ipv6Header {
        traffic_class: 0,
        flow_label: etherparse::Ipv6FlowLabel::ZERO,
        payload_length: (8 + quote) as u16,
        next_header: IpNumber(proto::ICMPV6),
        hop_limit: 64,
        source: tr.local6().octets(),
        destination: orig_src.octets(),
    };
    out[..Ipv6Header::LEN].copy_from_slice(&ip6.to_bytes());

    let icmp = &mut out[Ipv6Header::LEN..total];
    icmp[0] = icmp_type;
    icmp[1] = code;
    icmp[2] = 0;
    icmp[3] = 0;
    icmp[4..8].copy_from_slice(&rest);
    icmp[8..].copy_from_slice(&orig[..quote]);

    #[allow(clippy::cast_possible_truncation)] // bounded by V6_ERROR_MAX
    let pseudo = checksum::pseudo_v6(
        tr.local6(),
        orig_src,
        proto::ICMPV6,
        (8 + quote) as u32,
    );
    let cksum = checksum::finish(checksum::sum(pseudo, icmp));
    icmp[2..4].copy_from_slice(&cksum.to_be_bytes());

    Ok(Translated::Bounce(total))
}
