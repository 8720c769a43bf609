// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! RFC 6052 address algebra: embedding IPv4 addresses into (and extracting
//! them back out of) an IPv6 translation prefix.

use ipnet::Ipv6Net;
use std::fmt::{Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// The prefix lengths RFC 6052 §2.2 defines an embedding layout for.
pub const LEGAL_PREFIX_LENGTHS: [u8; 6] = [32, 40, 48, 56, 64, 96];

/// A validated IPv6 translation prefix.
///
/// The address is stored normalized: bits past the prefix length are zero, so
/// embedding can start from the stored octets directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PlatPrefix {
    subnet: Ipv6Addr,
    prefix_len: u8,
}

/// Errors which can occur when creating a [`PlatPrefix`].
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlatPrefixError {
    /// The prefix length has no RFC 6052 embedding layout.
    #[error("prefix length /{0} is not one of /32, /40, /48, /56, /64, /96")]
    BadLength(u8),
    /// The prefix could not be parsed as an IPv6 network.
    #[error("not a valid IPv6 prefix: {0}")]
    BadPrefix(String),
}

/// Error returned by [`PlatPrefix::extract`] for addresses outside the prefix.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("address {0} is not within the translation prefix")]
pub struct NotInPlat(pub Ipv6Addr);

impl PlatPrefix {
    /// Create a new [`PlatPrefix`] from an address and a prefix length.
    ///
    /// Bits of `subnet` past `prefix_len` are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`PlatPrefixError::BadLength`] if the length is not one of the
    /// RFC 6052 layouts.
    pub fn new(subnet: Ipv6Addr, prefix_len: u8) -> Result<PlatPrefix, PlatPrefixError> {
        if !LEGAL_PREFIX_LENGTHS.contains(&prefix_len) {
            return Err(PlatPrefixError::BadLength(prefix_len));
        }
        Ok(PlatPrefix {
            subnet: mask(subnet, prefix_len),
            prefix_len,
        })
    }

    /// The prefix length.
    #[must_use]
    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The (normalized) prefix address.
    #[must_use]
    pub fn subnet(&self) -> Ipv6Addr {
        self.subnet
    }

    /// Embed an IPv4 address into this prefix per RFC 6052 §2.2.
    ///
    /// For /96 the address occupies the final four octets; for shorter
    /// prefixes it is split around octet 8, which is held at zero.
    #[must_use]
    pub fn embed(&self, addr: Ipv4Addr) -> Ipv6Addr {
        let mut o = self.subnet.octets();
        let v4 = addr.octets();
        match self.prefix_len {
            32 => o[4..8].copy_from_slice(&v4),
            40 => {
                o[5..8].copy_from_slice(&v4[..3]);
                o[9] = v4[3];
            }
            48 => {
                o[6..8].copy_from_slice(&v4[..2]);
                o[9..11].copy_from_slice(&v4[2..]);
            }
            56 => {
                o[7] = v4[0];
                o[9..12].copy_from_slice(&v4[1..]);
            }
            64 => o[9..13].copy_from_slice(&v4),
            _ => o[12..16].copy_from_slice(&v4), // 96; lengths are validated at construction
        }
        Ipv6Addr::from(o)
    }

    /// Recover the IPv4 address embedded in `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`NotInPlat`] if `addr` does not lie inside this prefix.
    pub fn extract(&self, addr: Ipv6Addr) -> Result<Ipv4Addr, NotInPlat> {
        if !self.contains(addr) {
            return Err(NotInPlat(addr));
        }
        let o = addr.octets();
        let v4 = match self.prefix_len {
            32 => [o[4], o[5], o[6], o[7]],
            40 => [o[5], o[6], o[7], o[9]],
            48 => [o[6], o[7], o[9], o[10]],
            56 => [o[7], o[9], o[10], o[11]],
            64 => [o[9], o[10], o[11], o[12]],
            _ => [o[12], o[13], o[14], o[15]], // 96
        };
        Ok(Ipv4Addr::from(v4))
    }

    /// True iff `addr` lies inside this prefix.
    #[must_use]
    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        mask(addr, self.prefix_len) == self.subnet
    }
}

impl TryFrom<Ipv6Net> for PlatPrefix {
    type Error = PlatPrefixError;

    fn try_from(net: Ipv6Net) -> Result<PlatPrefix, PlatPrefixError> {
        PlatPrefix::new(net.addr(), net.prefix_len())
    }
}

impl FromStr for PlatPrefix {
    type Err = PlatPrefixError;

    fn from_str(input: &str) -> Result<PlatPrefix, PlatPrefixError> {
        // Accept both "64:ff9b::/96" and a bare "64:ff9b::" (implied /96, the
        // well-known prefix length).
        if let Ok(net) = Ipv6Net::from_str(input) {
            return PlatPrefix::try_from(net);
        }
        match Ipv6Addr::from_str(input) {
            Ok(addr) => PlatPrefix::new(addr, 96),
            Err(_) => Err(PlatPrefixError::BadPrefix(input.to_string())),
        }
    }
}

impl Display for PlatPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.subnet, self.prefix_len)
    }
}

fn mask(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let bits = u128::from_be_bytes(addr.octets());
    let masked = match prefix_len {
        0 => 0,
        len if len >= 128 => bits,
        len => bits & (u128::MAX << (128 - u32::from(len))),
    };
    Ipv6Addr::from(masked.to_be_bytes())
}

/// True iff `a` and `b` agree in their upper 64 bits.
#[must_use]
pub fn same_slash64(a: Ipv6Addr, b: Ipv6Addr) -> bool {
    a.octets()[..8] == b.octets()[..8]
}

/// Derive the CLAT's own IPv6 address from an address assigned on the uplink.
///
/// The upper 64 bits are kept; the interface identifier is replaced with a
/// value computed deterministically from the prefix, so repeated derivations
/// within one daemon lifetime agree. The universal/local bit is cleared to
/// mark the identifier as locally generated.
#[must_use]
pub fn local_address_for_prefix(uplink: Ipv6Addr) -> Ipv6Addr {
    let mut o = uplink.octets();

    // FNV-1a over the /64, wide enough to fill the interface identifier.
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in &o[..8] {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }

    let iid = hash.to_be_bytes();
    o[8..16].copy_from_slice(&iid);
    o[8] &= !0x02;
    // never collide with the subnet-router anycast address
    if o[8..16] == [0; 8] {
        o[15] = 1;
    }
    Ipv6Addr::from(o)
}
