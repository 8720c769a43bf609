// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The tunnel device: the IPv4 side of the translator.
//!
//! The device is opened with packet information enabled, so every read and
//! write is framed by the 4-byte `tun_pi` header carrying the ethertype.

use net::interface::InterfaceName;
use nix::sys::uio::writev;
use std::fs::File;
use std::io::{ErrorKind, IoSlice, Read};
use std::os::fd::{AsFd, AsRawFd, RawFd};
use tracing::info;

/// `tun_pi`: 16 bits of flags, 16 bits of big-endian protocol.
pub const TUN_HEADER_LEN: usize = 4;

#[allow(clippy::cast_possible_truncation)]
pub const ETH_P_IP: u16 = libc::ETH_P_IP as u16;
#[allow(clippy::cast_possible_truncation)]
pub const ETH_P_IPV6: u16 = libc::ETH_P_IPV6 as u16;

#[derive(Debug, thiserror::Error)]
pub enum TunError {
    #[error("cannot open /dev/net/tun: {0}")]
    Open(std::io::Error),
    #[error("TUNSETIFF for {0} failed: {1}")]
    Create(InterfaceName, nix::errno::Errno),
}

/// One read from the device.
#[derive(Debug, PartialEq, Eq)]
pub enum TunRead {
    /// A framed packet of this many bytes (including the `tun_pi` header).
    Packet(usize),
    /// Nothing buffered.
    WouldBlock,
    /// End of file: the device was torn down underneath us.
    Removed,
}

nix::ioctl_write_ptr_bad!(tun_set_iff, libc::TUNSETIFF, libc::ifreq);

#[derive(Debug)]
pub struct Tun {
    file: File,
    name: InterfaceName,
}

impl Tun {
    /// Create (and own) the tun device. No TAP, no persistence: the device
    /// disappears with the process.
    #[allow(unsafe_code)]
    pub fn create(name: &InterfaceName) -> Result<Tun, TunError> {
        use std::os::unix::fs::OpenOptionsExt;
        let file = File::options()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open("/dev/net/tun")
            .map_err(TunError::Open)?;

        let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
        for (slot, byte) in req.ifr_name.iter_mut().zip(name.to_ifname_bytes()) {
            #[allow(clippy::cast_possible_wrap)] // validated ASCII
            {
                *slot = byte as libc::c_char;
            }
        }
        // IFF_TUN without IFF_NO_PI: keep the packet-information framing
        req.ifr_ifru.ifru_flags = libc::IFF_TUN as libc::c_short;
        unsafe { tun_set_iff(file.as_raw_fd(), &req) }
            .map_err(|e| TunError::Create(name.clone(), e))?;

        info!("created tun device {name}");
        Ok(Tun {
            file,
            name: name.clone(),
        })
    }

    pub fn name(&self) -> &InterfaceName {
        &self.name
    }

    /// Read one framed packet into `buf`.
    pub fn read_packet(&self, buf: &mut [u8]) -> TunRead {
        match (&self.file).read(buf) {
            Ok(0) => TunRead::Removed,
            Ok(n) => TunRead::Packet(n),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                TunRead::WouldBlock
            }
            Err(e) => {
                tracing::warn!("tun read error: {e}");
                TunRead::WouldBlock
            }
        }
    }

    /// Write one packet with its `tun_pi` framing in a single gathered
    /// write.
    pub fn write_packet(&self, proto: u16, packet: &[u8]) -> nix::Result<usize> {
        let pi = tun_pi(proto);
        writev(
            self.file.as_fd(),
            &[IoSlice::new(&pi), IoSlice::new(packet)],
        )
    }
}

impl AsRawFd for Tun {
    fn as_raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}

/// The framing header for an outgoing packet.
fn tun_pi(proto: u16) -> [u8; TUN_HEADER_LEN] {
    let proto = proto.to_be_bytes();
    [0, 0, proto[0], proto[1]]
}

/// The ethertype of an incoming framed packet, if the frame is long enough
/// to carry one.
pub fn frame_proto(frame: &[u8]) -> Option<(u16, u16)> {
    if frame.len() < TUN_HEADER_LEN {
        return None;
    }
    let flags = u16::from_ne_bytes([frame[0], frame[1]]);
    let proto = u16::from_be_bytes([frame[2], frame[3]]);
    Some((flags, proto))
}
