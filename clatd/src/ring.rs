// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The memory-mapped packet ring: the IPv6 receive side.
//!
//! An `AF_PACKET` socket in cooked mode with a TPACKET_V2 receive ring. The
//! kernel writes classifier-matched frames into fixed-size slots; the event
//! loop drains ready slots and hands each network-layer payload to the
//! translator, then releases the slot. The ring pages are locked into
//! memory, which is why the daemon keeps `CAP_IPC_LOCK`.

use crate::filter;
use std::net::Ipv6Addr;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{Ordering, fence};
use tracing::{debug, warn};
use xlat::ChecksumHint;

const FRAME_SIZE: usize = 2048;
const BLOCK_SIZE: usize = 1 << 16;
const BLOCK_COUNT: usize = 16;
const FRAME_COUNT: usize = BLOCK_SIZE / FRAME_SIZE * BLOCK_COUNT;
const RING_SIZE: usize = BLOCK_SIZE * BLOCK_COUNT;

const TPACKET_V2: libc::c_int = 1;

// tp_status bits, linux/if_packet.h
const TP_STATUS_KERNEL: u32 = 0;
const TP_STATUS_USER: u32 = 1;
/// The sender left the checksum to hardware; only the pseudo header is
/// summed so far.
const TP_STATUS_CSUM_NOT_READY: u32 = 1 << 3;

#[repr(C)]
struct TpacketReq {
    tp_block_size: u32,
    tp_block_nr: u32,
    tp_frame_size: u32,
    tp_frame_nr: u32,
}

#[repr(C)]
struct Tpacket2Hdr {
    tp_status: u32,
    tp_len: u32,
    tp_snaplen: u32,
    tp_mac: u16,
    tp_net: u16,
    tp_sec: u32,
    tp_nsec: u32,
    tp_vlan_tci: u16,
    tp_vlan_tpid: u16,
    tp_padding: [u8; 4],
}

#[derive(Debug, thiserror::Error)]
pub enum RingError {
    #[error("packet socket: {0}")]
    Socket(nix::errno::Errno),
    #[error("PACKET_VERSION: {0}")]
    Version(nix::errno::Errno),
    #[error("PACKET_RX_RING: {0}")]
    RxRing(nix::errno::Errno),
    #[error("mmap of the ring failed: {0}")]
    Mmap(nix::errno::Errno),
    #[error("attach packet filter failed: {0}")]
    Filter(nix::errno::Errno),
    #[error("binding packet socket: {0}")]
    Bind(nix::errno::Errno),
}

pub struct Ring {
    fd: OwnedFd,
    map: *mut u8,
    next_frame: usize,
}

impl Ring {
    /// Open the packet socket and map the receive ring. The socket receives
    /// nothing until [`Ring::arm`] attaches the classifier and binds it to
    /// the uplink.
    #[allow(unsafe_code)]
    pub fn create() -> Result<Ring, RingError> {
        let raw = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_DGRAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                0,
            )
        };
        if raw < 0 {
            return Err(RingError::Socket(nix::errno::Errno::last()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let version = TPACKET_V2;
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_VERSION,
                (&raw const version).cast(),
                socklen::<libc::c_int>(),
            )
        };
        if rc < 0 {
            return Err(RingError::Version(nix::errno::Errno::last()));
        }

        #[allow(clippy::cast_possible_truncation)]
        let req = TpacketReq {
            tp_block_size: BLOCK_SIZE as u32,
            tp_block_nr: BLOCK_COUNT as u32,
            tp_frame_size: FRAME_SIZE as u32,
            tp_frame_nr: FRAME_COUNT as u32,
        };
        let rc = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_RX_RING,
                (&raw const req).cast(),
                socklen::<TpacketReq>(),
            )
        };
        if rc < 0 {
            return Err(RingError::RxRing(nix::errno::Errno::last()));
        }

        // MAP_LOCKED pins the slots; a page fault in the fast path would be
        // worse than failing here without CAP_IPC_LOCK
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                RING_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_LOCKED | libc::MAP_POPULATE,
                fd.as_raw_fd(),
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(RingError::Mmap(nix::errno::Errno::last()));
        }

        debug!("mapped packet ring: {FRAME_COUNT} frames of {FRAME_SIZE} bytes");
        Ok(Ring {
            fd,
            map: map.cast(),
            next_frame: 0,
        })
    }

    /// Attach the classifier for `local` and bind to the uplink. The filter
    /// goes on first so no foreign frame is ever queued; `PACKET_OTHERHOST`
    /// because the CLAT address is not assigned to the kernel.
    #[allow(unsafe_code)]
    pub fn arm(&self, ifindex: u32, local: Ipv6Addr) -> Result<(), RingError> {
        filter::attach(self.fd.as_raw_fd(), local).map_err(RingError::Filter)?;

        let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        #[allow(clippy::cast_possible_truncation)]
        {
            sll.sll_family = libc::AF_PACKET as libc::sa_family_t;
            sll.sll_protocol = (libc::ETH_P_IPV6 as u16).to_be();
            sll.sll_ifindex = ifindex as libc::c_int;
        }
        sll.sll_pkttype = libc::PACKET_OTHERHOST;
        let rc = unsafe {
            libc::bind(
                self.fd.as_raw_fd(),
                (&raw const sll).cast(),
                socklen::<libc::sockaddr_ll>(),
            )
        };
        if rc < 0 {
            return Err(RingError::Bind(nix::errno::Errno::last()));
        }
        Ok(())
    }

    /// Drain every ready slot, handing each frame's network payload to
    /// `handler`, then hand the slot back to the kernel.
    #[allow(unsafe_code)]
    pub fn drain(&mut self, mut handler: impl FnMut(&[u8], ChecksumHint)) {
        loop {
            let frame = unsafe { self.map.add(self.next_frame * FRAME_SIZE) };
            let status_ptr = frame.cast::<u32>();
            let status = unsafe { std::ptr::read_volatile(status_ptr) };
            if status & TP_STATUS_USER == 0 {
                break;
            }
            fence(Ordering::Acquire);

            let header = unsafe { &*frame.cast::<Tpacket2Hdr>() };
            let offset = usize::from(header.tp_net);
            let snaplen = header.tp_snaplen as usize;
            if offset + snaplen <= FRAME_SIZE {
                let payload = unsafe { std::slice::from_raw_parts(frame.add(offset), snaplen) };
                let hint = if status & TP_STATUS_CSUM_NOT_READY == 0 {
                    ChecksumHint::None
                } else {
                    ChecksumHint::PartialL4Valid
                };
                handler(payload, hint);
            } else {
                warn!("ring slot with impossible geometry: net={offset} snap={snaplen}");
            }

            fence(Ordering::Release);
            unsafe { std::ptr::write_volatile(status_ptr, TP_STATUS_KERNEL) };
            self.next_frame = (self.next_frame + 1) % FRAME_COUNT;
        }
    }

    /// Clear a pending socket error with a zero-length peek; without this,
    /// readiness keeps firing and the loop spins.
    #[allow(unsafe_code)]
    pub fn clear_error(&self) -> nix::errno::Errno {
        let rc = unsafe {
            libc::recv(
                self.fd.as_raw_fd(),
                std::ptr::null_mut(),
                0,
                libc::MSG_PEEK,
            )
        };
        if rc < 0 {
            nix::errno::Errno::last()
        } else {
            nix::errno::Errno::UnknownErrno
        }
    }
}

impl Drop for Ring {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map.cast(), RING_SIZE);
        }
    }
}

impl AsRawFd for Ring {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn socklen<T>() -> libc::socklen_t {
    std::mem::size_of::<T>() as libc::socklen_t
}
