// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! One's-complement checksum arithmetic.
//!
//! Every routine here works on the partial (unfolded) 32-bit accumulator form
//! of the internet checksum so that pseudo headers, header bytes, and payload
//! bytes can be summed in any order before a single fold at the end.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Add `bytes` to the partial one's-complement sum `acc`.
///
/// Bytes are consumed as big-endian 16-bit words; a trailing odd byte is
/// treated as the high byte of a final word, per RFC 1071.
#[must_use]
pub fn sum(acc: u32, bytes: &[u8]) -> u32 {
    let mut acc = acc;
    let mut chunks = bytes.chunks_exact(2);
    for chunk in &mut chunks {
        acc = acc.wrapping_add(u32::from(u16::from_be_bytes([chunk[0], chunk[1]])));
    }
    if let [last] = chunks.remainder() {
        acc = acc.wrapping_add(u32::from(u16::from_be_bytes([*last, 0])));
    }
    acc
}

/// Fold the carries of a partial sum back into 16 bits.
///
/// The result is the one's-complement sum itself, not the checksum; callers
/// that want the on-the-wire value need [`finish`].
#[must_use]
pub fn fold(acc: u32) -> u16 {
    let mut acc = acc;
    while acc > 0xffff {
        acc = (acc >> 16) + (acc & 0xffff);
    }
    #[allow(clippy::cast_possible_truncation)] // just folded below 2^16
    {
        acc as u16
    }
}

/// Fold a partial sum and complement it into a final checksum.
#[must_use]
pub fn finish(acc: u32) -> u16 {
    !fold(acc)
}

/// Incrementally update `checksum` for data that changed from a portion
/// summing to `old_sum` to a portion summing to `new_sum`.
///
/// This is the subtraction-with-borrow form of RFC 1624 [Eqn. 3]:
///
/// ```text
///     HC' = ~(C + (-m) + m')
///         = ~(~HC + ~m + m')
/// ```
///
/// generalized to whole partial sums rather than single 16-bit fields, so a
/// pseudo-header swap is one call.
#[must_use]
pub fn adjust(checksum: u16, old_sum: u32, new_sum: u32) -> u16 {
    let folded_sum = fold(u32::from(!checksum).wrapping_add(new_sum));
    let folded_old = fold(old_sum);
    if folded_sum > folded_old {
        !(folded_sum - folded_old)
    } else {
        // end-around borrow
        !(folded_sum.wrapping_sub(folded_old).wrapping_sub(1))
    }
}

/// Partial sum of the IPv4 pseudo header for an upper-layer packet of
/// `len` bytes carried as protocol `proto`.
#[must_use]
pub fn pseudo_v4(src: Ipv4Addr, dst: Ipv4Addr, proto: u8, len: u16) -> u32 {
    let acc = sum(0, &src.octets());
    let acc = sum(acc, &dst.octets());
    acc.wrapping_add(u32::from(proto)).wrapping_add(u32::from(len))
}

/// Partial sum of the IPv6 pseudo header for an upper-layer packet of
/// `len` bytes carried as next header `proto`.
#[must_use]
pub fn pseudo_v6(src: Ipv6Addr, dst: Ipv6Addr, proto: u8, len: u32) -> u32 {
    let acc = sum(0, &src.octets());
    let acc = sum(acc, &dst.octets());
    acc.wrapping_add(len >> 16)
        .wrapping_add(len & 0xffff)
        .wrapping_add(u32::from(proto))
}
