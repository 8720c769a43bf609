// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The raw IPv6 send socket. The translator writes complete IPv6 packets
//! including final checksums; the kernel only routes them.

use std::net::Ipv6Addr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum SockError {
    #[error("raw socket failed: {0}")]
    Socket(nix::errno::Errno),
}

/// Disable kernel checksum handling on a raw IPv6 socket.
const IPV6_CHECKSUM: libc::c_int = 7;

pub struct RawSock {
    fd: OwnedFd,
}

impl RawSock {
    /// Open the non-blocking raw socket and apply the socket options. A
    /// failure to disable checksumming or to set the mark is logged and
    /// tolerated; failing to open the socket is not.
    #[allow(unsafe_code)]
    pub fn open(mark: Option<u32>) -> Result<RawSock, SockError> {
        let raw = unsafe {
            libc::socket(
                libc::AF_INET6,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::IPPROTO_RAW,
            )
        };
        if raw < 0 {
            return Err(SockError::Socket(nix::errno::Errno::last()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let off: libc::c_int = -1;
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::IPPROTO_IPV6,
                IPV6_CHECKSUM,
                (&raw const off).cast(),
                socklen::<libc::c_int>(),
            )
        };
        if rc < 0 {
            warn!(
                "could not disable checksum on raw socket: {}",
                nix::errno::Errno::last()
            );
        }

        if let Some(mark) = mark {
            let rc = unsafe {
                libc::setsockopt(
                    fd.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_MARK,
                    (&raw const mark).cast(),
                    socklen::<u32>(),
                )
            };
            if rc < 0 {
                error!(
                    "could not set mark on raw socket: {}",
                    nix::errno::Errno::last()
                );
            }
        }

        Ok(RawSock { fd })
    }

    /// Send one translated packet. The kernel takes the route from a
    /// `sendto` destination, which is simply the packet's own destination
    /// field.
    ///
    /// # Errors
    ///
    /// `EAGAIN` here is packet loss; the caller logs it and moves on.
    #[allow(unsafe_code)]
    pub fn send(&self, packet: &[u8]) -> Result<usize, nix::errno::Errno> {
        debug_assert!(packet.len() >= 40);
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&packet[24..40]);
        let dst = Ipv6Addr::from(octets);

        let mut sin6: libc::sockaddr_in6 = unsafe { std::mem::zeroed() };
        #[allow(clippy::cast_possible_truncation)]
        {
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        }
        sin6.sin6_addr = libc::in6_addr {
            s6_addr: dst.octets(),
        };

        let rc = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                packet.as_ptr().cast(),
                packet.len(),
                0,
                (&raw const sin6).cast(),
                socklen::<libc::sockaddr_in6>(),
            )
        };
        if rc < 0 {
            return Err(nix::errno::Errno::last());
        }
        #[allow(clippy::cast_sign_loss)]
        Ok(rc as usize)
    }
}

impl AsFd for RawSock {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn socklen<T>() -> libc::socklen_t {
    std::mem::size_of::<T>() as libc::socklen_t
}
