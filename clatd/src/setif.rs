// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Host-OS interface administration primitives: install an address, bring an
//! interface up, query an MTU, join an anycast group. Everything here is a
//! classic `SIOCSIF*` ioctl on a throwaway datagram socket.

use net::interface::InterfaceName;
use nix::sys::socket::{AddressFamily, SockFlag, SockType, socket};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SetifError {
    #[error("{op} on {interface} failed: {errno}")]
    Ioctl {
        op: &'static str,
        interface: InterfaceName,
        errno: nix::errno::Errno,
    },
    #[error("control socket: {0}")]
    Socket(nix::errno::Errno),
    #[error("IPV6_JOIN_ANYCAST failed: {0}")]
    JoinAnycast(nix::errno::Errno),
    #[error("no interface named {0}")]
    NoSuchInterface(InterfaceName),
}

nix::ioctl_write_ptr_bad!(ioctl_set_if_addr, libc::SIOCSIFADDR, libc::ifreq);
nix::ioctl_write_ptr_bad!(ioctl_set_if_netmask, libc::SIOCSIFNETMASK, libc::ifreq);
nix::ioctl_write_ptr_bad!(ioctl_set_if_dstaddr, libc::SIOCSIFDSTADDR, libc::ifreq);
nix::ioctl_write_ptr_bad!(ioctl_set_if_mtu, libc::SIOCSIFMTU, libc::ifreq);
nix::ioctl_write_ptr_bad!(ioctl_set_if_flags, libc::SIOCSIFFLAGS, libc::ifreq);
nix::ioctl_read_bad!(ioctl_get_if_mtu, libc::SIOCGIFMTU, libc::ifreq);
nix::ioctl_read_bad!(ioctl_get_if_flags, libc::SIOCGIFFLAGS, libc::ifreq);

/// The linux kernel joins anycast groups through a multicast-shaped request.
const IPV6_JOIN_ANYCAST: libc::c_int = 27;

#[allow(unsafe_code)]
fn ifreq_named(name: &InterfaceName) -> libc::ifreq {
    // zero-filled so the name is implicitly NUL terminated
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    for (slot, byte) in req.ifr_name.iter_mut().zip(name.to_ifname_bytes()) {
        #[allow(clippy::cast_possible_wrap)] // validated ASCII
        {
            *slot = byte as libc::c_char;
        }
    }
    req
}

#[allow(unsafe_code)]
fn ifreq_with_addr(name: &InterfaceName, addr: Ipv4Addr) -> libc::ifreq {
    let mut req = ifreq_named(name);
    let sin = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: 0,
        sin_addr: libc::in_addr {
            s_addr: u32::from(addr).to_be(),
        },
        sin_zero: [0; 8],
    };
    unsafe {
        std::ptr::write((&raw mut req.ifr_ifru).cast::<libc::sockaddr_in>(), sin);
    }
    req
}

fn control_socket() -> Result<OwnedFd, SetifError> {
    socket(
        AddressFamily::Inet,
        SockType::Datagram,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(SetifError::Socket)
}

fn ioctl_error(op: &'static str, interface: &InterfaceName, errno: nix::errno::Errno) -> SetifError {
    SetifError::Ioctl {
        op,
        interface: interface.clone(),
        errno,
    }
}

/// Install `addr/prefix_len` on `interface`, with the address itself as the
/// point-to-point peer (the tunnel is a /32 island).
#[allow(unsafe_code)]
pub fn add_address(
    interface: &InterfaceName,
    addr: Ipv4Addr,
    prefix_len: u8,
) -> Result<(), SetifError> {
    let fd = control_socket()?;
    let req = ifreq_with_addr(interface, addr);
    unsafe { ioctl_set_if_addr(fd.as_raw_fd(), &req) }
        .map_err(|e| ioctl_error("SIOCSIFADDR", interface, e))?;

    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    };
    let req = ifreq_with_addr(interface, Ipv4Addr::from(mask));
    unsafe { ioctl_set_if_netmask(fd.as_raw_fd(), &req) }
        .map_err(|e| ioctl_error("SIOCSIFNETMASK", interface, e))?;

    let req = ifreq_with_addr(interface, addr);
    unsafe { ioctl_set_if_dstaddr(fd.as_raw_fd(), &req) }
        .map_err(|e| ioctl_error("SIOCSIFDSTADDR", interface, e))?;

    debug!("installed {addr}/{prefix_len} on {interface}");
    Ok(())
}

/// Set the interface MTU and raise IFF_UP | IFF_RUNNING.
#[allow(unsafe_code)]
pub fn bring_up(interface: &InterfaceName, mtu: u16) -> Result<(), SetifError> {
    let fd = control_socket()?;

    let mut req = ifreq_named(interface);
    req.ifr_ifru.ifru_mtu = libc::c_int::from(mtu);
    unsafe { ioctl_set_if_mtu(fd.as_raw_fd(), &req) }
        .map_err(|e| ioctl_error("SIOCSIFMTU", interface, e))?;

    let mut req = ifreq_named(interface);
    unsafe { ioctl_get_if_flags(fd.as_raw_fd(), &mut req) }
        .map_err(|e| ioctl_error("SIOCGIFFLAGS", interface, e))?;
    unsafe {
        req.ifr_ifru.ifru_flags |= (libc::IFF_UP | libc::IFF_RUNNING) as libc::c_short;
    }
    unsafe { ioctl_set_if_flags(fd.as_raw_fd(), &req) }
        .map_err(|e| ioctl_error("SIOCSIFFLAGS", interface, e))?;

    debug!("{interface} up, mtu {mtu}");
    Ok(())
}

/// Read the interface MTU.
#[allow(unsafe_code)]
pub fn interface_mtu(interface: &InterfaceName) -> Result<u16, SetifError> {
    let fd = control_socket()?;
    let mut req = ifreq_named(interface);
    unsafe { ioctl_get_if_mtu(fd.as_raw_fd(), &mut req) }
        .map_err(|e| ioctl_error("SIOCGIFMTU", interface, e))?;
    let mtu = unsafe { req.ifr_ifru.ifru_mtu };
    u16::try_from(mtu).map_err(|_| ioctl_error("SIOCGIFMTU", interface, nix::errno::Errno::EINVAL))
}

/// The kernel index of `interface`.
pub fn ifindex(interface: &InterfaceName) -> Result<u32, SetifError> {
    nix::net::if_::if_nametoindex(interface.as_str())
        .map_err(|_| SetifError::NoSuchInterface(interface.clone()))
}

/// Join `addr` as an anycast address on the interface with index `ifindex`,
/// so the kernel answers neighbor solicitations for it without the address
/// being assigned anywhere.
#[allow(unsafe_code)]
pub fn join_anycast(fd: BorrowedFd<'_>, addr: Ipv6Addr, ifindex: u32) -> Result<(), SetifError> {
    let mreq = libc::ipv6_mreq {
        ipv6mr_multiaddr: libc::in6_addr {
            s6_addr: addr.octets(),
        },
        ipv6mr_interface: ifindex,
    };
    #[allow(clippy::cast_possible_truncation)]
    let len = std::mem::size_of::<libc::ipv6_mreq>() as libc::socklen_t;
    let rc = unsafe {
        libc::setsockopt(
            fd.as_fd().as_raw_fd(),
            libc::IPPROTO_IPV6,
            IPV6_JOIN_ANYCAST,
            (&raw const mreq).cast(),
            len,
        )
    };
    if rc < 0 {
        return Err(SetifError::JoinAnycast(nix::errno::Errno::last()));
    }
    debug!("joined anycast group {addr} on ifindex {ifindex}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ifreq_name_is_nul_terminated() {
        let name = InterfaceName::try_from("clat4").unwrap();
        let req = ifreq_named(&name);
        assert_eq!(req.ifr_name[4], b'4' as libc::c_char);
        assert_eq!(req.ifr_name[5], 0);
        assert_eq!(req.ifr_name[libc::IF_NAMESIZE - 1], 0);
    }

    #[test]
    fn ifreq_addr_is_network_order() {
        let name = InterfaceName::try_from("clat4").unwrap();
        let req = ifreq_with_addr(&name, Ipv4Addr::new(192, 0, 0, 4));
        #[allow(unsafe_code)]
        let sin = unsafe { *(&raw const req.ifr_ifru).cast::<libc::sockaddr_in>() };
        assert_eq!(sin.sin_family, libc::AF_INET as libc::sa_family_t);
        assert_eq!(sin.sin_addr.s_addr, u32::from_be_bytes([192, 0, 0, 4]).to_be());
    }
}
