// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Stateless IP/ICMP translation between IPv4 and IPv6, per RFC 7915.
//!
//! The [`Translator`] rewrites one packet at a time into a caller-provided
//! scratch buffer. It holds only configuration (the translation prefix, the
//! two local addresses, and the IPv4 path MTU); there is no per-flow state
//! and nothing is allocated on the per-packet path.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use net::plat::PlatPrefix;
use std::net::{Ipv4Addr, Ipv6Addr};

mod icmp;
mod v4v6;
mod v6v4;

#[cfg(test)]
mod tests;

/// IP protocol numbers the translator treats specially.
pub(crate) mod proto {
    pub const HOPOPTS: u8 = 0;
    pub const ICMP: u8 = 1;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ROUTING: u8 = 43;
    pub const FRAGMENT: u8 = 44;
    pub const GRE: u8 = 47;
    pub const ICMPV6: u8 = 58;
    pub const DSTOPTS: u8 = 60;
}

/// Growth of a maximally unlucky IPv4 packet under translation: the 40-byte
/// IPv6 header replaces the 20-byte IPv4 header and a fragment header may be
/// added.
pub const MTU_DELTA: u16 = 28;

/// Extra room the scratch buffer needs beyond the input packet size.
pub const SCRATCH_HEADROOM: usize = 48;

/// What the receive path already knows about the packet's L4 checksum.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumHint {
    /// Nothing; validate and adjust normally.
    None,
    /// The checksum field only covers the pseudo header (checksum offload on
    /// a local sender). Header validation is skipped and L4 checksums are
    /// recomputed in full instead of adjusted.
    PartialL4Valid,
}

/// Which locally generated ICMP error replies are enabled.
///
/// Both default to off: the translator's normal answer to an untranslatable
/// packet is a silent drop.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ReplyPolicy {
    /// Answer an expired TTL on the IPv4 side with ICMPv4 time-exceeded.
    pub time_exceeded: bool,
    /// Answer a rejected IPv6 routing header with ICMPv6 parameter-problem.
    pub parameter_problem: bool,
}

/// A successful translation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Translated {
    /// `out[..len]` holds the translated packet; emit it on the opposite
    /// side (raw socket for IPv4→IPv6, tunnel for IPv6→IPv4).
    Forward(usize),
    /// `out[..len]` holds a locally generated ICMP error; emit it back on
    /// the side the packet arrived from.
    Bounce(usize),
}

impl Translated {
    /// Bytes of output, whichever way they are headed.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Translated::Forward(len) | Translated::Bounce(len) => *len,
        }
    }

    /// True iff no bytes were produced (never the case today).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Why a packet was dropped instead of translated.
///
/// None of these are process failures; the caller logs and moves on.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    /// Fewer bytes than a complete header.
    #[error("packet too short: {0} bytes")]
    Truncated(usize),
    /// A header failed to parse.
    #[error("bad {0}")]
    BadHeader(&'static str),
    /// The IPv4 header checksum did not verify.
    #[error("ipv4 header checksum mismatch")]
    HeaderChecksum,
    /// TTL or hop limit would reach zero in translation.
    #[error("hop limit expired")]
    HopLimitExpired,
    /// An IPv6 address that should carry an embedded IPv4 address does not.
    #[error("address {0} is outside the translation prefix")]
    NotInPlat(Ipv6Addr),
    /// An inbound IPv6 packet not addressed to the CLAT.
    #[error("destination {0} is not the local translation address")]
    DestinationNotLocal(Ipv6Addr),
    /// A routing header we refuse to forward.
    #[error("routing header (type {kind}, {segments_left} segments left)")]
    RoutingHeader {
        /// Routing type field.
        kind: u8,
        /// Segments-left field.
        segments_left: u8,
    },
    /// More than one fragment header in the extension chain.
    #[error("more than one fragment header")]
    DuplicateFragmentHeader,
    /// ICMP spanning fragments cannot be checksummed, hence not translated.
    #[error("fragmented icmp message")]
    FragmentedIcmp,
    /// A zero UDP checksum that cannot be recomputed.
    #[error("udp zero checksum on a fragmented packet")]
    ZeroUdpChecksum,
    /// An ICMP type/code with no mapping; dropped per RFC 7915.
    #[error("icmp type {icmp_type} code {code} has no translation")]
    UnsupportedIcmp {
        /// Original type.
        icmp_type: u8,
        /// Original code.
        code: u8,
    },
    /// An ICMP error whose payload is itself an ICMP error.
    #[error("icmp error embeds another icmp error")]
    NestedIcmpError,
    /// Too large for the outbound side and DF forbids fragmenting.
    #[error("packet of {0} bytes exceeds the ipv4 path mtu")]
    Oversized(usize),
    /// Larger than an IPv4 length field can express.
    #[error("translated packet would not fit an ipv4 total length")]
    TooBigForIpv4,
    /// The caller's scratch buffer cannot hold the result.
    #[error("scratch buffer too small: need {need}, have {have}")]
    Scratch {
        /// Bytes required.
        need: usize,
        /// Bytes available.
        have: usize,
    },
}

/// The stateless translator.
#[derive(Debug, Clone)]
pub struct Translator {
    plat: PlatPrefix,
    local6: Ipv6Addr,
    local4: Ipv4Addr,
    ipv4mtu: u16,
    policy: ReplyPolicy,
    df0_fragment_header: bool,
}

impl Translator {
    /// Create a translator for the given prefix, local addresses, and
    /// IPv4-side path MTU.
    #[must_use]
    pub fn new(
        plat: PlatPrefix,
        local6: Ipv6Addr,
        local4: Ipv4Addr,
        ipv4mtu: u16,
    ) -> Translator {
        Translator {
            plat,
            local6,
            local4,
            ipv4mtu,
            policy: ReplyPolicy::default(),
            df0_fragment_header: false,
        }
    }

    /// Enable locally generated ICMP error replies.
    #[must_use]
    pub fn with_policy(mut self, policy: ReplyPolicy) -> Translator {
        self.policy = policy;
        self
    }

    /// Emit a fragment header for every DF=0 packet, fragmented or not
    /// (the RFC 6145 behavior; off by default per RFC 7915).
    #[must_use]
    pub fn with_df0_fragment_header(mut self, enabled: bool) -> Translator {
        self.df0_fragment_header = enabled;
        self
    }

    /// The CLAT's IPv6 address.
    #[must_use]
    pub fn local6(&self) -> Ipv6Addr {
        self.local6
    }

    /// The CLAT's IPv4 address.
    #[must_use]
    pub fn local4(&self) -> Ipv4Addr {
        self.local4
    }

    /// Translate one IPv4 packet into an IPv6 packet in `out`.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] naming the reason the packet was dropped;
    /// the caller logs it and continues.
    pub fn v4_to_v6(
        &self,
        packet: &[u8],
        hint: ChecksumHint,
        out: &mut [u8],
    ) -> Result<Translated, TranslateError> {
        v4v6::translate(self, packet, hint, out)
    }

    /// Translate one IPv6 packet into an IPv4 packet in `out`.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslateError`] naming the reason the packet was dropped;
    /// the caller logs it and continues.
    pub fn v6_to_v4(
        &self,
        packet: &[u8],
        hint: ChecksumHint,
        out: &mut [u8],
    ) -> Result<Translated, TranslateError> {
        v6v4::translate(self, packet, hint, out)
    }

    /// Map an IPv4 address to its IPv6 representation: the CLAT's own
    /// address maps to the CLAT IPv6 address, everything else embeds into
    /// the translation prefix.
    pub(crate) fn addr_4to6(&self, addr: Ipv4Addr) -> Ipv6Addr {
        if addr == self.local4 {
            self.local6
        } else {
            self.plat.embed(addr)
        }
    }

    /// Inverse of [`Translator::addr_4to6`].
    pub(crate) fn addr_6to4(&self, addr: Ipv6Addr) -> Result<Ipv4Addr, TranslateError> {
        if addr == self.local6 {
            Ok(self.local4)
        } else {
            self.plat
                .extract(addr)
                .map_err(|e| TranslateError::NotInPlat(e.0))
        }
    }

    pub(crate) fn plat(&self) -> &PlatPrefix {
        &self.plat
    }

    pub(crate) fn ipv4mtu(&self) -> u16 {
        self.ipv4mtu
    }

    pub(crate) fn policy(&self) -> ReplyPolicy {
        self.policy
    }

    pub(crate) fn df0_fragment_header(&self) -> bool {
        self.df0_fragment_header
    }
}
